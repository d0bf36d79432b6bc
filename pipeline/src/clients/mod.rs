//! Catalog and light-curve providers.
//!
//! [`mast`] talks to the MAST archive over HTTP; [`local`] serves fixed
//! identifier lists and FITS files from a directory, for offline runs and
//! tests.

pub mod local;
pub mod mast;

pub use local::{DirectoryProvider, StaticCatalog};
pub use mast::{MastCatalogClient, MastLightCurveProvider, DEFAULT_MAST_API_URL};
