//! Contrast-limited adaptive histogram equalization.

use image::GrayImage;

/// Equalize `img` per tile with clipped histograms, blending tile mappings
/// bilinearly so tile borders do not show.
///
/// `clip_limit` is relative to a flat histogram (2.0 clips any bin at twice
/// the average bin height). A limit of 0 disables clipping.
pub fn clahe(img: &GrayImage, clip_limit: f32, grid: (u32, u32)) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    let tile_w = w.div_ceil(grid.0.clamp(1, w));
    let tile_h = h.div_ceil(grid.1.clamp(1, h));
    let nx = w.div_ceil(tile_w);
    let ny = h.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((nx * ny) as usize);
    for ty in 0..ny {
        for tx in 0..nx {
            let (x0, y0) = (tx * tile_w, ty * tile_h);
            let (x1, y1) = ((x0 + tile_w).min(w), (y0 + tile_h).min(h));
            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[img.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            luts.push(tile_lut(&mut hist, (x1 - x0) * (y1 - y0), clip_limit));
        }
    }

    let lookup = |tx: u32, ty: u32, v: usize| luts[(ty * nx + tx) as usize][v] as f32;
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let (ty0, ty1, wy) = neighbours(y, tile_h, ny);
        for x in 0..w {
            let (tx0, tx1, wx) = neighbours(x, tile_w, nx);
            let v = img.get_pixel(x, y)[0] as usize;
            let top = lookup(tx0, ty0, v) * (1.0 - wx) + lookup(tx1, ty0, v) * wx;
            let bottom = lookup(tx0, ty1, v) * (1.0 - wx) + lookup(tx1, ty1, v) * wx;
            let value = top * (1.0 - wy) + bottom * wy;
            out.put_pixel(x, y, image::Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Indices of the two tiles whose centres bracket `pos`, and the weight of the second.
fn neighbours(pos: u32, tile: u32, count: u32) -> (u32, u32, f32) {
    let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
    let first = (f.floor().max(0.0) as u32).min(count - 1);
    let second = (first + 1).min(count - 1);
    let weight = if second == first {
        0.0
    } else {
        (f - first as f32).clamp(0.0, 1.0)
    };
    (first, second, weight)
}

fn tile_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }
        let bonus = excess / 256;
        let residual = (excess % 256) as usize;
        for (i, bin) in hist.iter_mut().enumerate() {
            *bin += bonus + u32::from(i < residual);
        }
    }

    let area = area.max(1) as f32;
    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = (cdf as f32 * 255.0 / area).round().min(255.0) as u8;
    }
    lut
}
