//! RGB frames, grid videos, and value-function heatmaps
//!
//! Evaluation rollouts produce `Frame`s; captured episodes are tiled
//! into a single grid `Video` with one column per task. Video encoding
//! itself is outside this crate; a video is a frame sequence handed to
//! the metric sinks, and still images are written as binary PPM.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// One RGB image, row-major, 3 bytes per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub rgb: Vec<u8>,
}

impl Frame {
    pub fn filled(width: usize, height: usize, color: [u8; 3]) -> Self {
        let mut rgb = Vec::with_capacity(width * height * 3);
        for _ in 0..width * height {
            rgb.extend_from_slice(&color);
        }
        Self { width, height, rgb }
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, color: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = (y * self.width + x) * 3;
        self.rgb[i..i + 3].copy_from_slice(&color);
    }

    pub fn fill_rect(&mut self, x0: usize, y0: usize, w: usize, h: usize, color: [u8; 3]) {
        for y in y0..(y0 + h).min(self.height) {
            for x in x0..(x0 + w).min(self.width) {
                self.set_pixel(x, y, color);
            }
        }
    }

    /// Copy another frame into this one with its top-left at (x0, y0);
    /// out-of-bounds pixels are dropped
    pub fn blit(&mut self, src: &Frame, x0: usize, y0: usize) {
        for y in 0..src.height {
            for x in 0..src.width {
                let i = (y * src.width + x) * 3;
                self.set_pixel(x0 + x, y0 + y, [src.rgb[i], src.rgb[i + 1], src.rgb[i + 2]]);
            }
        }
    }
}

/// A frame sequence ready for an external encoder
#[derive(Debug, Clone)]
pub struct Video {
    pub frames: Vec<Frame>,
    pub width: usize,
    pub height: usize,
}

/// Tile captured episodes into one grid video
///
/// Episodes fill the grid row-major with `n_cols` columns (one column
/// per task when the caller captures the tasks in order). Shorter
/// episodes are padded with their last frame. Returns `None` when no
/// frames were captured.
pub fn compose_grid_video(renders: &[Vec<Frame>], n_cols: usize) -> Option<Video> {
    let episodes: Vec<&Vec<Frame>> = renders.iter().filter(|ep| !ep.is_empty()).collect();
    if episodes.is_empty() || n_cols == 0 {
        return None;
    }

    let cell_width = episodes[0][0].width;
    let cell_height = episodes[0][0].height;
    let n_rows = episodes.len().div_ceil(n_cols);
    let length = episodes.iter().map(|ep| ep.len()).max().unwrap_or(0);

    let width = cell_width * n_cols;
    let height = cell_height * n_rows;
    let mut frames = Vec::with_capacity(length);
    for t in 0..length {
        let mut frame = Frame::filled(width, height, [0, 0, 0]);
        for (slot, episode) in episodes.iter().enumerate() {
            let cell = episode.get(t).unwrap_or_else(|| {
                episode.last().expect("episodes are filtered non-empty")
            });
            frame.blit(cell, (slot % n_cols) * cell_width, (slot / n_cols) * cell_height);
        }
        frames.push(frame);
    }
    Some(Video {
        frames,
        width,
        height,
    })
}

/// Render a square value grid as a heatmap
///
/// Values are min-max normalized over the grid; `walls`, when given,
/// marks cells drawn as solid black overlay (same length as `values`,
/// row-major).
pub fn render_value_heatmap(values: &[f32], grid_size: usize, walls: Option<&[bool]>) -> Frame {
    let scale = 2;
    let mut frame = Frame::filled(grid_size * scale, grid_size * scale, [0, 0, 0]);

    let (mut min, mut max) = (f32::INFINITY, f32::NEG_INFINITY);
    for &v in values {
        min = min.min(v);
        max = max.max(v);
    }
    let range = (max - min).max(1e-8);

    for gy in 0..grid_size {
        for gx in 0..grid_size {
            let i = gy * grid_size + gx;
            let color = if walls.is_some_and(|w| w[i]) {
                [0, 0, 0]
            } else {
                heat_color((values[i] - min) / range)
            };
            frame.fill_rect(gx * scale, gy * scale, scale, scale, color);
        }
    }
    frame
}

/// Three-stop gradient: dark blue → yellow → red
fn heat_color(t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let lerp = |a: u8, b: u8, s: f32| (a as f32 + (b as f32 - a as f32) * s) as u8;
    if t < 0.5 {
        let s = t * 2.0;
        [lerp(20, 250, s), lerp(40, 210, s), lerp(120, 40, s)]
    } else {
        let s = (t - 0.5) * 2.0;
        [lerp(250, 220, s), lerp(210, 40, s), lerp(40, 30, s)]
    }
}

/// Write a frame as binary PPM (P6)
pub fn write_ppm(frame: &Frame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create image file: {:?}", path))?;
    write!(file, "P6\n{} {}\n255\n", frame.width, frame.height)?;
    file.write_all(&frame.rgb)
        .with_context(|| format!("Failed to write image data to {:?}", path))?;
    Ok(())
}
