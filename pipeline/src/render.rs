//! PNG rendering for the preview and metrics artifacts.
//!
//! Plots are drawn directly into an RGB buffer: axes, data and bars only, no
//! text. The values themselves live in the results JSON.

use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::io::Cursor;
use std::path::Path;

use crate::api::{ProcessedSeries, TransitCandidate};
use crate::artifacts::write_atomic;

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 500;
const MARGIN: u32 = 50;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([0, 0, 0]);
const SERIES: Rgb<u8> = Rgb([31, 119, 180]);
const BAR: Rgb<u8> = Rgb([135, 206, 235]);

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Failed to write '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Plot area in pixel coordinates.
struct Frame {
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
}

impl Frame {
    fn new() -> Self {
        Self {
            left: MARGIN as f32,
            right: (WIDTH - MARGIN) as f32,
            top: MARGIN as f32,
            bottom: (HEIGHT - MARGIN) as f32,
        }
    }

    fn draw_axes(&self, canvas: &mut RgbImage) {
        draw_line_segment_mut(canvas, (self.left, self.bottom), (self.right, self.bottom), AXIS);
        draw_line_segment_mut(canvas, (self.left, self.top), (self.left, self.bottom), AXIS);
    }
}

/// Map `value` in `[lo, hi]` onto `[a, b]`; a degenerate range maps to the midpoint.
fn scale(value: f64, lo: f64, hi: f64, a: f32, b: f32) -> f32 {
    if hi > lo {
        a + ((value - lo) / (hi - lo)) as f32 * (b - a)
    } else {
        (a + b) / 2.0
    }
}

fn finite_bounds(values: &[f64]) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    (lo <= hi).then_some((lo, hi))
}

fn blank_canvas() -> RgbImage {
    RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND)
}

/// Brightness against time, drawn as connected points.
pub fn render_light_curve(series: &ProcessedSeries) -> RgbImage {
    let mut canvas = blank_canvas();
    let frame = Frame::new();
    frame.draw_axes(&mut canvas);

    let (Some((t_lo, t_hi)), Some((f_lo, f_hi))) =
        (finite_bounds(&series.time), finite_bounds(&series.flux))
    else {
        return canvas;
    };

    let points: Vec<(f32, f32)> = series
        .time
        .iter()
        .zip(&series.flux)
        .filter(|(t, f)| t.is_finite() && f.is_finite())
        .map(|(&t, &f)| {
            (
                scale(t, t_lo, t_hi, frame.left, frame.right),
                scale(f, f_lo, f_hi, frame.bottom, frame.top),
            )
        })
        .collect();

    for pair in points.windows(2) {
        draw_line_segment_mut(&mut canvas, pair[0], pair[1], SERIES);
    }
    for &(x, y) in &points {
        draw_filled_circle_mut(&mut canvas, (x as i32, y as i32), 1, SERIES);
    }
    canvas
}

/// Four bars: period, duration, depth, power.
///
/// Absent values are drawn as 0. Bars share one linear scale with the zero
/// line placed so that negative values hang below it.
pub fn render_metrics_chart(candidate: &TransitCandidate) -> RgbImage {
    let mut canvas = blank_canvas();
    let frame = Frame::new();
    frame.draw_axes(&mut canvas);

    let values = candidate.display_values();
    let hi = values.iter().copied().fold(0.0_f64, f64::max);
    let lo = values.iter().copied().fold(0.0_f64, f64::min);
    if !(hi > lo) || !hi.is_finite() || !lo.is_finite() {
        return canvas;
    }

    let zero = scale(0.0, lo, hi, frame.bottom, frame.top);
    draw_line_segment_mut(&mut canvas, (frame.left, zero), (frame.right, zero), AXIS);

    let slot = (frame.right - frame.left) / values.len() as f32;
    let bar_width = (slot * 0.6).max(1.0);
    for (i, &value) in values.iter().enumerate() {
        let top = scale(value, lo, hi, frame.bottom, frame.top);
        let (y0, y1) = if top < zero { (top, zero) } else { (zero, top) };
        let height = (y1 - y0).round() as u32;
        if height == 0 {
            continue;
        }
        let x = frame.left + slot * i as f32 + (slot - bar_width) / 2.0;
        let rect = Rect::at(x as i32, y0 as i32).of_size(bar_width as u32, height);
        draw_filled_rect_mut(&mut canvas, rect, BAR);
    }
    canvas
}

/// Encode as PNG and write atomically.
pub fn save_png(image: &RgbImage, path: &Path) -> Result<(), RenderError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    write_atomic(path, &bytes).map_err(|source| RenderError::Io {
        path: path.display().to_string(),
        source,
    })
}
