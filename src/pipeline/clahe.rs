//! Contrast-limited adaptive histogram equalization over a fixed tile grid.

use image::GrayImage;

const HIST_SIZE: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct Clahe {
    pub clip_limit: f32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl Default for Clahe {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tiles_x: 4,
            tiles_y: 4,
        }
    }
}

impl Clahe {
    pub fn new(clip_limit: f32, tiles: u32) -> Self {
        Self {
            clip_limit,
            tiles_x: tiles.max(1),
            tiles_y: tiles.max(1),
        }
    }

    pub fn apply(&self, src: &GrayImage) -> GrayImage {
        let (width, height) = src.dimensions();
        if width == 0 || height == 0 {
            return src.clone();
        }

        let tiles_x = self.tiles_x.clamp(1, width) as usize;
        let tiles_y = self.tiles_y.clamp(1, height) as usize;
        let tile_w = (width as usize).div_ceil(tiles_x);
        let tile_h = (height as usize).div_ceil(tiles_y);

        let luts: Vec<[u8; HIST_SIZE]> = (0..tiles_y)
            .flat_map(|ty| (0..tiles_x).map(move |tx| (tx, ty)))
            .map(|(tx, ty)| self.tile_lut(src, tx * tile_w, ty * tile_h, tile_w, tile_h))
            .collect();
        let lut_at = |tx: usize, ty: usize| &luts[ty * tiles_x + tx];

        let inv_tw = 1.0 / tile_w as f32;
        let inv_th = 1.0 / tile_h as f32;

        // Per-column interpolation parameters are shared by every row.
        let columns: Vec<(usize, usize, f32)> = (0..width as usize)
            .map(|x| {
                let txf = x as f32 * inv_tw - 0.5;
                let tx1 = txf.floor() as isize;
                let xa = txf - tx1 as f32;
                let tx2 = (tx1 + 1).min(tiles_x as isize - 1).max(0) as usize;
                (tx1.max(0) as usize, tx2, xa)
            })
            .collect();

        let mut dst = GrayImage::new(width, height);
        for y in 0..height as usize {
            let tyf = y as f32 * inv_th - 0.5;
            let ty1 = tyf.floor() as isize;
            let ya = tyf - ty1 as f32;
            let ty2 = (ty1 + 1).min(tiles_y as isize - 1).max(0) as usize;
            let ty1 = ty1.max(0) as usize;

            for (x, &(tx1, tx2, xa)) in columns.iter().enumerate() {
                let v = src.get_pixel(x as u32, y as u32)[0] as usize;
                let top = lut_at(tx1, ty1)[v] as f32 * (1.0 - xa) + lut_at(tx2, ty1)[v] as f32 * xa;
                let bottom = lut_at(tx1, ty2)[v] as f32 * (1.0 - xa) + lut_at(tx2, ty2)[v] as f32 * xa;
                let res = top * (1.0 - ya) + bottom * ya;
                dst.put_pixel(x as u32, y as u32, image::Luma([res.round().clamp(0.0, 255.0) as u8]));
            }
        }

        dst
    }

    fn tile_lut(&self, src: &GrayImage, x0: usize, y0: usize, tile_w: usize, tile_h: usize) -> [u8; HIST_SIZE] {
        let (width, height) = (src.width() as usize, src.height() as usize);
        let x1 = (x0 + tile_w).min(width);
        let y1 = (y0 + tile_h).min(height);

        let mut hist = [0u32; HIST_SIZE];
        for y in y0..y1 {
            for x in x0..x1 {
                hist[src.get_pixel(x as u32, y as u32)[0] as usize] += 1;
            }
        }

        let area = ((x1.saturating_sub(x0)) * (y1.saturating_sub(y0))).max(1);

        if self.clip_limit > 0.0 {
            let clip = ((self.clip_limit * area as f32 / HIST_SIZE as f32) as u32).max(1);

            let mut clipped = 0u32;
            for h in hist.iter_mut() {
                if *h > clip {
                    clipped += *h - clip;
                    *h = clip;
                }
            }

            let batch = clipped / HIST_SIZE as u32;
            let mut residual = clipped - batch * HIST_SIZE as u32;
            for h in hist.iter_mut() {
                *h += batch;
            }

            if residual != 0 {
                let step = (HIST_SIZE / residual as usize).max(1);
                let mut i = 0;
                while i < HIST_SIZE && residual > 0 {
                    hist[i] += 1;
                    residual -= 1;
                    i += step;
                }
            }
        }

        let scale = (HIST_SIZE - 1) as f32 / area as f32;
        let mut lut = [0u8; HIST_SIZE];
        let mut sum = 0u32;
        for (i, h) in hist.iter().enumerate() {
            sum += h;
            lut[i] = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
        }
        lut
    }
}
