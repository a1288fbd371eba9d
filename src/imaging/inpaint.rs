//! Fill masked pixels from their surroundings.
//!
//! The masked area is filled from the outside in. Every pass takes the masked
//! pixels touching a known pixel and replaces each with an inverse-square
//! distance weighted mean of the known pixels within `radius`. A pass only
//! reads values known before it started, so the fill does not depend on scan
//! order.

use image::{GrayImage, Luma};

const NEIGHBOURS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

pub fn inpaint(gray: &GrayImage, mask: &GrayImage, radius: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut result = gray.clone();
    if width == 0 || height == 0 {
        return result;
    }

    let idx = |x: u32, y: u32| (y * width + x) as usize;
    let mut known: Vec<bool> = mask.pixels().map(|p| p[0] == 0).collect();
    let mut pending: Vec<(u32, u32)> = mask
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] > 0)
        .map(|(x, y, _)| (x, y))
        .collect();

    let r = radius.max(1) as i64;

    while !pending.is_empty() {
        let (front, rest): (Vec<_>, Vec<_>) = pending.into_iter().partition(|&(x, y)| {
            NEIGHBOURS.iter().any(|&(dx, dy)| {
                let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                nx >= 0
                    && ny >= 0
                    && nx < width as i64
                    && ny < height as i64
                    && known[idx(nx as u32, ny as u32)]
            })
        });

        if front.is_empty() {
            // Nothing known left to propagate from.
            break;
        }

        let filled: Vec<(u32, u32, u8)> = front
            .iter()
            .map(|&(x, y)| {
                let mut weighted = 0.0f64;
                let mut total = 0.0f64;
                for dy in -r..=r {
                    for dx in -r..=r {
                        let d2 = (dx * dx + dy * dy) as f64;
                        if d2 == 0.0 || d2 > (r * r) as f64 {
                            continue;
                        }
                        let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                        if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                            continue;
                        }
                        if !known[idx(nx as u32, ny as u32)] {
                            continue;
                        }
                        let w = 1.0 / d2;
                        weighted += w * result.get_pixel(nx as u32, ny as u32)[0] as f64;
                        total += w;
                    }
                }
                let value = if total > 0.0 {
                    (weighted / total).round().clamp(0.0, 255.0) as u8
                } else {
                    result.get_pixel(x, y)[0]
                };
                (x, y, value)
            })
            .collect();

        for (x, y, value) in filled {
            result.put_pixel(x, y, Luma([value]));
            known[idx(x, y)] = true;
        }
        pending = rest;
    }

    result
}
