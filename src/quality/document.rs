//! ID document detection on a single candidate frame
//!
//! 1. Gaussian smoothing and Canny edges (Sobel L1 magnitude, non-maximum
//!    suppression, hysteresis), then one 3x3 dilation to close corner gaps
//! 2. Outer contours of 8-connected edge components (Moore tracing),
//!    dropping contours nested inside another
//! 3. Douglas-Peucker simplification; 4-vertex polygons are card candidates
//! 4. The largest candidate must have ID-card proportions and a dark
//!    bottom third (machine-readable zone heuristic)

use crate::config::DocumentConfig;
use crate::types::CaptureFrame;
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Pixel-aligned bounds, inclusive of both edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Outcome of a document check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDetection {
    pub detected: bool,
    /// Bounds of the largest quadrilateral, if any was found
    pub bounds: Option<Rect>,
    pub aspect_ratio: Option<f64>,
    pub mrz_mean_luma: Option<f64>,
    pub aspect_pass: bool,
    pub mrz_pass: bool,
}

impl DocumentDetection {
    fn none() -> Self {
        Self {
            detected: false,
            bounds: None,
            aspect_ratio: None,
            mrz_mean_luma: None,
            aspect_pass: false,
            mrz_pass: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentDetector {
    config: DocumentConfig,
}

type Contour = Vec<(i32, i32)>;

impl DocumentDetector {
    pub fn new(config: DocumentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn detect(&self, frame: &CaptureFrame) -> DocumentDetection {
        if let Err(e) = frame.validate() {
            log::warn!("Document check skipped: {}", e);
            return DocumentDetection::none();
        }

        let gray = frame.to_gray();
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        let smoothed = gaussian_blur5(&gray);
        let edges = canny(&smoothed, w, h, self.config.canny_low, self.config.canny_high);
        let edges = dilate3(&edges, w, h);
        let contours = external_contours(&edges, w, h);

        let best = contours
            .iter()
            .filter(|c| c.len() >= 4)
            .filter(|c| {
                let epsilon = self.config.approx_epsilon_ratio * closed_perimeter(c);
                approximate_closed(c, epsilon).len() == 4
            })
            .max_by(|a, b| polygon_area(a).total_cmp(&polygon_area(b)));

        let Some(quad) = best else {
            log::debug!("No quadrilateral among {} contours", contours.len());
            return DocumentDetection::none();
        };

        let rect = bounding_rect(quad);
        let long = rect.width.max(rect.height) as f64;
        let short = rect.width.min(rect.height).max(1) as f64;
        let aspect = long / short;
        let aspect_pass = (self.config.aspect_min..=self.config.aspect_max).contains(&aspect);

        let mrz_mean = mrz_band_mean(&gray, &rect);
        let mrz_pass = mrz_mean.map_or(false, |m| m < self.config.mrz_luma_max);

        log::debug!(
            "Document candidate {:?}: aspect {:.3} ({}), mrz luma {:?} ({})",
            rect,
            aspect,
            aspect_pass,
            mrz_mean,
            mrz_pass
        );

        DocumentDetection {
            detected: aspect_pass && mrz_pass,
            bounds: Some(rect),
            aspect_ratio: Some(aspect),
            mrz_mean_luma: mrz_mean,
            aspect_pass,
            mrz_pass,
        }
    }
}

/// Mean luma of the bottom third of `rect`
fn mrz_band_mean(gray: &GrayImage, rect: &Rect) -> Option<f64> {
    let band = rect.height / 3;
    if band == 0 || rect.width == 0 {
        return None;
    }
    let y0 = rect.y + rect.height - band;
    let mut sum = 0u64;
    for y in y0..y0 + band {
        for x in rect.x..rect.x + rect.width {
            sum += gray.get_pixel(x, y).0[0] as u64;
        }
    }
    Some(sum as f64 / (band as u64 * rect.width as u64) as f64)
}

/// Separable 5-tap binomial blur with clamped borders
fn gaussian_blur5(gray: &GrayImage) -> Vec<f32> {
    const K: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let src = gray.as_raw();

    let mut tmp = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in K.iter().enumerate() {
                let sx = (x as isize + k as isize - 2).clamp(0, w as isize - 1) as usize;
                acc += weight * src[y * w + sx] as f32;
            }
            tmp[y * w + x] = acc;
        }
    }

    let mut out = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in K.iter().enumerate() {
                let sy = (y as isize + k as isize - 2).clamp(0, h as isize - 1) as usize;
                acc += weight * tmp[sy * w + x];
            }
            out[y * w + x] = acc;
        }
    }
    out
}

fn canny(img: &[f32], w: usize, h: usize, low: f64, high: f64) -> Vec<bool> {
    let mut magnitude = vec![0.0f32; w * h];
    let mut direction = vec![0u8; w * h];

    if w < 3 || h < 3 {
        return vec![false; w * h];
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let at = |dx: isize, dy: isize| {
                img[(y as isize + dy) as usize * w + (x as isize + dx) as usize]
            };
            let gx = (at(1, -1) + 2.0 * at(1, 0) + at(1, 1)) - (at(-1, -1) + 2.0 * at(-1, 0) + at(-1, 1));
            let gy = (at(-1, 1) + 2.0 * at(0, 1) + at(1, 1)) - (at(-1, -1) + 2.0 * at(0, -1) + at(1, -1));
            let i = y * w + x;
            magnitude[i] = gx.abs() + gy.abs();

            let mut angle = gy.atan2(gx).to_degrees();
            if angle < 0.0 {
                angle += 180.0;
            }
            direction[i] = if !(22.5..157.5).contains(&angle) {
                0
            } else if angle < 67.5 {
                1
            } else if angle < 112.5 {
                2
            } else {
                3
            };
        }
    }

    // Non-maximum suppression along the quantized gradient direction
    let mut thin = vec![0.0f32; w * h];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            let m = magnitude[i];
            if m < low as f32 {
                continue;
            }
            let (a, b) = match direction[i] {
                0 => (magnitude[i - 1], magnitude[i + 1]),
                1 => (magnitude[i - w - 1], magnitude[i + w + 1]),
                2 => (magnitude[i - w], magnitude[i + w]),
                _ => (magnitude[i - w + 1], magnitude[i + w - 1]),
            };
            if m >= a && m >= b {
                thin[i] = m;
            }
        }
    }

    // Hysteresis: weak pixels survive only when 8-connected to a strong one
    let mut edges = vec![false; w * h];
    let mut stack: Vec<usize> = thin
        .iter()
        .enumerate()
        .filter(|(_, m)| **m >= high as f32)
        .map(|(i, _)| i)
        .collect();
    for &i in &stack {
        edges[i] = true;
    }
    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for (dx, dy) in NEIGHBOURS {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                continue;
            }
            let n = ny as usize * w + nx as usize;
            if !edges[n] && thin[n] >= low as f32 {
                edges[n] = true;
                stack.push(n);
            }
        }
    }
    edges
}

fn dilate3(mask: &[bool], w: usize, h: usize) -> Vec<bool> {
    let mut out = vec![false; w * h];
    for y in 0..h {
        for x in 0..w {
            if !mask[y * w + x] {
                continue;
            }
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    let (nx, ny) = (x as isize + dx, y as isize + dy);
                    if nx >= 0 && ny >= 0 && (nx as usize) < w && (ny as usize) < h {
                        out[ny as usize * w + nx as usize] = true;
                    }
                }
            }
        }
    }
    out
}

/// Clockwise Moore neighbourhood (y grows downward), starting west
const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

/// Outer boundary of every 8-connected component, minus contours whose
/// bounds sit strictly inside another contour's bounds
fn external_contours(mask: &[bool], w: usize, h: usize) -> Vec<Contour> {
    let mut visited = vec![false; w * h];
    let mut contours = Vec::new();

    for start in 0..w * h {
        if !mask[start] || visited[start] {
            continue;
        }
        // Raster order guarantees `start` is the component's top-left pixel
        let size = flood_component(mask, &mut visited, w, h, start);
        contours.push(trace_boundary(mask, w, h, start, size));
    }

    let bounds: Vec<Rect> = contours.iter().map(|c| bounding_rect(c)).collect();
    contours
        .into_iter()
        .enumerate()
        .filter(|(i, _)| {
            !bounds
                .iter()
                .enumerate()
                .any(|(j, outer)| j != *i && strictly_inside(&bounds[*i], outer))
        })
        .map(|(_, c)| c)
        .collect()
}

fn flood_component(mask: &[bool], visited: &mut [bool], w: usize, h: usize, start: usize) -> usize {
    let mut stack = vec![start];
    visited[start] = true;
    let mut size = 0;
    while let Some(i) = stack.pop() {
        size += 1;
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for (dx, dy) in NEIGHBOURS {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                continue;
            }
            let n = ny as usize * w + nx as usize;
            if mask[n] && !visited[n] {
                visited[n] = true;
                stack.push(n);
            }
        }
    }
    size
}

/// Moore-neighbour tracing from the top-left pixel of a component.
/// Stops when the first move is about to be repeated.
fn trace_boundary(mask: &[bool], w: usize, h: usize, start: usize, size: usize) -> Contour {
    let is_set = |x: isize, y: isize| {
        x >= 0 && y >= 0 && (x as usize) < w && (y as usize) < h && mask[y as usize * w + x as usize]
    };

    let s = ((start % w) as isize, (start / w) as isize);
    let mut contour = vec![(s.0 as i32, s.1 as i32)];
    let mut current = s;
    // The west neighbour of the top-left pixel is always background
    let mut backtrack = 0usize;
    let mut first_move: Option<(isize, isize)> = None;
    let limit = 4 * size + 8;

    for _ in 0..limit {
        let mut next = None;
        for k in 1..=8 {
            let idx = (backtrack + k) % 8;
            let (dx, dy) = NEIGHBOURS[idx];
            let candidate = (current.0 + dx, current.1 + dy);
            if is_set(candidate.0, candidate.1) {
                let (bx, by) = NEIGHBOURS[(idx + 7) % 8];
                let checked = (current.0 + bx, current.1 + by);
                next = Some((candidate, checked));
                break;
            }
        }

        let Some((candidate, checked)) = next else {
            break; // isolated pixel
        };

        if current == s {
            match first_move {
                None => first_move = Some(candidate),
                Some(first) if first == candidate => break,
                Some(_) => {}
            }
        }

        let rel = (checked.0 - candidate.0, checked.1 - candidate.1);
        backtrack = NEIGHBOURS.iter().position(|&d| d == rel).unwrap_or(0);
        current = candidate;
        if current == s {
            continue;
        }
        contour.push((current.0 as i32, current.1 as i32));
    }

    contour
}

fn strictly_inside(inner: &Rect, outer: &Rect) -> bool {
    inner.x > outer.x
        && inner.y > outer.y
        && inner.x + inner.width < outer.x + outer.width
        && inner.y + inner.height < outer.y + outer.height
}

fn bounding_rect(points: &[(i32, i32)]) -> Rect {
    let (mut x0, mut y0, mut x1, mut y1) = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
    for &(x, y) in points {
        x0 = x0.min(x);
        y0 = y0.min(y);
        x1 = x1.max(x);
        y1 = y1.max(y);
    }
    if points.is_empty() {
        return Rect {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
        };
    }
    Rect {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0 + 1) as u32,
        height: (y1 - y0 + 1) as u32,
    }
}

fn distance(a: (i32, i32), b: (i32, i32)) -> f64 {
    (((a.0 - b.0) as f64).powi(2) + ((a.1 - b.1) as f64).powi(2)).sqrt()
}

fn closed_perimeter(points: &[(i32, i32)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 0..points.len() {
        total += distance(points[i], points[(i + 1) % points.len()]);
    }
    total
}

/// Shoelace area
fn polygon_area(points: &[(i32, i32)]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for i in 0..n {
        let (x0, y0) = points[i];
        let (x1, y1) = points[(i + 1) % n];
        twice += x0 as i64 * y1 as i64 - x1 as i64 * y0 as i64;
    }
    (twice.abs() as f64) / 2.0
}

/// Douglas-Peucker on a closed curve: split at the point farthest from
/// the first, simplify both halves, then rejoin.
fn approximate_closed(points: &[(i32, i32)], epsilon: f64) -> Vec<(i32, i32)> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let origin = points[0];
    let far = (1..points.len())
        .max_by(|&a, &b| distance(origin, points[a]).total_cmp(&distance(origin, points[b])))
        .unwrap_or(0);
    if far == 0 {
        return vec![origin];
    }

    let mut second_half: Vec<(i32, i32)> = points[far..].to_vec();
    second_half.push(origin);

    let mut result = simplify_open(&points[..=far], epsilon);
    result.pop();
    let mut tail = simplify_open(&second_half, epsilon);
    tail.pop();
    result.extend(tail);
    result
}

fn simplify_open(points: &[(i32, i32)], epsilon: f64) -> Vec<(i32, i32)> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let first = points[0];
    let last = points[points.len() - 1];

    let (index, max_dist) = points[1..points.len() - 1]
        .iter()
        .enumerate()
        .map(|(i, &p)| (i + 1, perpendicular_distance(p, first, last)))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });

    if max_dist > epsilon {
        let mut left = simplify_open(&points[..=index], epsilon);
        let right = simplify_open(&points[index..], epsilon);
        left.pop();
        left.extend(right);
        left
    } else {
        vec![first, last]
    }
}

fn perpendicular_distance(p: (i32, i32), a: (i32, i32), b: (i32, i32)) -> f64 {
    let len = distance(a, b);
    if len == 0.0 {
        return distance(p, a);
    }
    let cross = (b.0 - a.0) as f64 * (a.1 - p.1) as f64 - (a.0 - p.0) as f64 * (b.1 - a.1) as f64;
    cross.abs() / len
}
