use std::path::{Path, PathBuf};

use glam::Vec2;
use image::{Rgba, RgbaImage};

use crate::render::canvas::{unpack_rgba, Canvas};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("nothing has been drawn yet")]
    EmptyCanvas,
    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),
}

/// File name for the `index`-th capture of a session.
pub fn capture_file_name(session: u32, index: u32) -> String {
    format!("walker_{session}_{index}.png")
}

/// Rasterize the canvas triangles into an image of `width` x `height` pixels.
///
/// Triangles are filled in draw order, a pixel being covered when its centre
/// lies inside the triangle (edges inclusive). Later triangles overwrite.
pub fn rasterize(canvas: &Canvas, width: u32, height: u32) -> RgbaImage {
    let [r, g, b] = canvas.background();
    let mut img = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]));

    let (canvas_w, canvas_h) = canvas.size();
    if width == 0 || height == 0 || canvas_w <= 0.0 || canvas_h <= 0.0 {
        return img;
    }
    let scale = Vec2::new(width as f32 / canvas_w, height as f32 / canvas_h);

    for tri in canvas.vertices().chunks_exact(3) {
        let a = Vec2::from(tri[0].position) * scale;
        let b = Vec2::from(tri[1].position) * scale;
        let c = Vec2::from(tri[2].position) * scale;
        let area = edge(a, b, c);
        if area == 0.0 {
            continue;
        }
        let color = Rgba(unpack_rgba(tri[0].color));

        let min = a.min(b).min(c);
        let max = a.max(b).max(c);
        let x0 = (min.x.floor().max(0.0)) as u32;
        let y0 = (min.y.floor().max(0.0)) as u32;
        let x1 = (max.x.ceil().min(width as f32)) as u32;
        let y1 = (max.y.ceil().min(height as f32)) as u32;

        for y in y0..y1 {
            for x in x0..x1 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(b, c, p);
                let w1 = edge(c, a, p);
                let w2 = edge(a, b, p);
                // Either winding counts as inside.
                let inside = if area > 0.0 {
                    w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0
                } else {
                    w0 <= 0.0 && w1 <= 0.0 && w2 <= 0.0
                };
                if inside {
                    img.put_pixel(x, y, color);
                }
            }
        }
    }
    img
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b - a).perp_dot(p - a)
}

/// Rasterize at the canvas' logical size and write it as a PNG in `dir`.
pub fn save_capture(
    canvas: &Canvas,
    dir: &Path,
    session: u32,
    index: u32,
) -> Result<PathBuf, ExportError> {
    if canvas.is_empty() {
        return Err(ExportError::EmptyCanvas);
    }
    let (w, h) = canvas.size();
    let width = (w.round() as u32).max(1);
    let height = (h.round() as u32).max(1);

    let img = rasterize(canvas, width, height);
    let path = dir.join(capture_file_name(session, index));
    img.save(&path)?;
    log::info!("Saved capture {} ({}x{})", path.display(), width, height);
    Ok(path)
}
