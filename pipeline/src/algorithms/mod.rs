//! Numerical search algorithms.

pub mod bls;

pub use bls::{detect, SearchGrid};
