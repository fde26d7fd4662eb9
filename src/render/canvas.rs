use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::playback::Surface;

/// Per-vertex data for canvas triangles.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CanvasVertex {
    /// Logical pixels, origin top-left.
    pub position: [f32; 2],
    /// sRGB RGBA packed as u32 (R in the high byte).
    pub color: u32,
}

/// Triangles per full circle. Start markers are small, so this is plenty.
const CIRCLE_SEGMENTS: usize = 32;
/// Grid lines are always one logical pixel wide.
const GRID_LINE_WIDTH: f32 = 1.0;

pub fn pack_rgb(color: [u8; 3]) -> u32 {
    let [r, g, b] = color;
    (r as u32) << 24 | (g as u32) << 16 | (b as u32) << 8 | 0xFF
}

pub fn unpack_rgba(color: u32) -> [u8; 4] {
    color.to_be_bytes()
}

/// One open polyline and how many of its segments are already on the canvas.
struct Subpath {
    points: Vec<Vec2>,
    stroked: usize,
}

/// Retained drawing surface: everything painted so far, as triangles.
///
/// Nothing is ever erased except by [`Surface::fill_background`], which
/// starts over. The renderer uploads [`Canvas::vertices`] when
/// [`Canvas::revision`] changes.
pub struct Canvas {
    width: f32,
    height: f32,
    vertices: Vec<CanvasVertex>,
    subpaths: Vec<Subpath>,
    fill_color: u32,
    stroke_color: u32,
    line_width: f32,
    background: [u8; 3],
    revision: u64,
}

impl Canvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            vertices: Vec::new(),
            subpaths: Vec::new(),
            fill_color: pack_rgb([255, 255, 255]),
            stroke_color: pack_rgb([255, 255, 255]),
            line_width: 1.0,
            background: [0, 0, 0],
            revision: 0,
        }
    }

    /// Change the logical size. Contents are cleared.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
        self.vertices.clear();
        self.subpaths.clear();
        self.revision += 1;
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    pub fn vertices(&self) -> &[CanvasVertex] {
        &self.vertices
    }

    pub fn background(&self) -> [u8; 3] {
        self.background
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    fn push_triangle(&mut self, a: Vec2, b: Vec2, c: Vec2, color: u32) {
        for p in [a, b, c] {
            self.vertices.push(CanvasVertex {
                position: p.into(),
                color,
            });
        }
    }

    fn push_rect(&mut self, min: Vec2, max: Vec2, color: u32) {
        let tr = Vec2::new(max.x, min.y);
        let bl = Vec2::new(min.x, max.y);
        self.push_triangle(min, tr, max, color);
        self.push_triangle(min, max, bl, color);
    }

    /// Thick line as a quad. Ends are extended by half the width so
    /// consecutive segments meet without a notch at the corner.
    fn push_segment(&mut self, a: Vec2, b: Vec2, width: f32, color: u32) {
        let dir = (b - a).normalize_or_zero();
        if dir == Vec2::ZERO {
            return;
        }
        let half = width * 0.5;
        let normal = dir.perp() * half;
        let a = a - dir * half;
        let b = b + dir * half;
        self.push_triangle(a + normal, b + normal, b - normal, color);
        self.push_triangle(a + normal, b - normal, a - normal, color);
    }
}

impl Surface for Canvas {
    fn fill_background(&mut self, color: [u8; 3]) {
        self.vertices.clear();
        self.subpaths.clear();
        self.background = color;
        self.push_rect(Vec2::ZERO, Vec2::new(self.width, self.height), pack_rgb(color));
        self.revision += 1;
    }

    fn stroke_grid(&mut self, rows: u32, columns: u32, square: f32, color: [u8; 3]) {
        let color = pack_rgb(color);
        let width = columns as f32 * square;
        let height = rows as f32 * square;
        let half = GRID_LINE_WIDTH * 0.5;
        for r in 0..=rows {
            let y = r as f32 * square;
            self.push_rect(Vec2::new(0.0, y - half), Vec2::new(width, y + half), color);
        }
        for c in 0..=columns {
            let x = c as f32 * square;
            self.push_rect(Vec2::new(x - half, 0.0), Vec2::new(x + half, height), color);
        }
        self.revision += 1;
    }

    fn set_fill_color(&mut self, color: [u8; 3]) {
        self.fill_color = pack_rgb(color);
    }

    fn set_stroke(&mut self, color: [u8; 3], width: f32) {
        self.stroke_color = pack_rgb(color);
        self.line_width = width;
    }

    fn fill_circle(&mut self, center: Vec2, radius: f32) {
        if radius <= 0.0 {
            return;
        }
        let color = self.fill_color;
        let step = std::f32::consts::TAU / CIRCLE_SEGMENTS as f32;
        for i in 0..CIRCLE_SEGMENTS {
            let a0 = i as f32 * step;
            let a1 = (i + 1) as f32 * step;
            let p0 = center + Vec2::new(a0.cos(), a0.sin()) * radius;
            let p1 = center + Vec2::new(a1.cos(), a1.sin()) * radius;
            self.push_triangle(center, p0, p1, color);
        }
        self.revision += 1;
    }

    fn begin_path(&mut self) {
        self.subpaths.clear();
    }

    fn move_to(&mut self, point: Vec2) {
        self.subpaths.push(Subpath {
            points: vec![point],
            stroked: 0,
        });
    }

    fn line_to(&mut self, point: Vec2) {
        match self.subpaths.last_mut() {
            Some(sub) => sub.points.push(point),
            // No current point: behaves like move_to.
            None => self.move_to(point),
        }
    }

    fn stroke(&mut self) {
        let color = self.stroke_color;
        let width = self.line_width;
        let mut segments = Vec::new();
        for sub in &mut self.subpaths {
            let total = sub.points.len().saturating_sub(1);
            // Opaque strokes are idempotent, so only new segments need geometry.
            for i in sub.stroked..total {
                segments.push((sub.points[i], sub.points[i + 1]));
            }
            sub.stroked = total;
        }
        if segments.is_empty() {
            return;
        }
        for (a, b) in segments {
            self.push_segment(a, b, width, color);
        }
        self.revision += 1;
    }
}
