//! Nearest/bilinear sampling with repeat/clamp-to-edge wrap modes, generalized from euc's
//! `Nearest`/`Linear` samplers (`src/sampler/nearest.rs`, `src/sampler/linear.rs`) to
//! this crate's byte-backed [`super::Texture`] instead of a generic `Texture<N>` trait.

use super::Texture;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WrapMode {
    Repeat,
    ClampToEdge,
}

impl WrapMode {
    #[inline]
    fn apply(self, coord: f32) -> f32 {
        match self {
            WrapMode::Repeat => coord.rem_euclid(1.0),
            WrapMode::ClampToEdge => coord.clamp(0.0, 1.0),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Bilinear,
}

/// Conventional cube-map face layout, indexing the six depth layers of a cube texture.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX = 0,
    NegativeX = 1,
    PositiveY = 2,
    NegativeY = 3,
    PositiveZ = 4,
    NegativeZ = 5,
}

impl Texture {
    /// Sample this texture at normalized coordinates `(u, v)` in layer `layer`.
    pub fn sample(&self, u: f32, v: f32, layer: u32, wrap: WrapMode, filter: Filter) -> [f32; 4] {
        let u = wrap.apply(u);
        let v = wrap.apply(v);
        match filter {
            Filter::Nearest => self.sample_nearest(u, v, layer),
            Filter::Bilinear => self.sample_bilinear(u, v, layer),
        }
    }

    fn sample_nearest(&self, u: f32, v: f32, layer: u32) -> [f32; 4] {
        let x = denormalize(u, self.width());
        let y = denormalize(v, self.height());
        self.read_rgba_f32(x, y, layer)
    }

    fn sample_bilinear(&self, u: f32, v: f32, layer: u32) -> [f32; 4] {
        let w = self.width();
        let h = self.height();

        let fx = u * w as f32 - 0.5;
        let fy = v * h as f32 - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;

        let x0 = clamp_coord(x0 as i64, w);
        let x1 = clamp_coord(x0 as i64 + 1, w);
        let y0 = clamp_coord(y0 as i64, h);
        let y1 = clamp_coord(y0 as i64 + 1, h);

        let t00 = self.read_rgba_f32(x0, y0, layer);
        let t10 = self.read_rgba_f32(x1, y0, layer);
        let t01 = self.read_rgba_f32(x0, y1, layer);
        let t11 = self.read_rgba_f32(x1, y1, layer);

        let mut out = [0.0f32; 4];
        for c in 0..4 {
            let top = t00[c] * (1.0 - tx) + t10[c] * tx;
            let bottom = t01[c] * (1.0 - tx) + t11[c] * tx;
            out[c] = top * (1.0 - ty) + bottom * ty;
        }
        out
    }

    /// Sample a cube map: pick the dominant axis of `dir`, derive a face + 2D UV, and sample
    /// the corresponding depth layer.
    pub fn sample_cube(&self, dir: [f32; 3], filter: Filter) -> [f32; 4] {
        let (face, u, v) = cube_face_uv(dir);
        self.sample(u, v, Texture::cube_layer(face), WrapMode::ClampToEdge, filter)
    }
}

fn denormalize(coord: f32, size: u32) -> u32 {
    ((coord.max(0.0) * size as f32) as u32).min(size - 1)
}

fn clamp_coord(v: i64, size: u32) -> u32 {
    v.clamp(0, size as i64 - 1) as u32
}

fn cube_face_uv(dir: [f32; 3]) -> (CubeFace, f32, f32) {
    let [x, y, z] = dir;
    let (ax, ay, az) = (x.abs(), y.abs(), z.abs());

    if ax >= ay && ax >= az {
        if x > 0.0 {
            (CubeFace::PositiveX, 0.5 * (-z / ax + 1.0), 0.5 * (-y / ax + 1.0))
        } else {
            (CubeFace::NegativeX, 0.5 * (z / ax + 1.0), 0.5 * (-y / ax + 1.0))
        }
    } else if ay >= ax && ay >= az {
        if y > 0.0 {
            (CubeFace::PositiveY, 0.5 * (x / ay + 1.0), 0.5 * (z / ay + 1.0))
        } else {
            (CubeFace::NegativeY, 0.5 * (x / ay + 1.0), 0.5 * (-z / ay + 1.0))
        }
    } else if z > 0.0 {
        (CubeFace::PositiveZ, 0.5 * (x / az + 1.0), 0.5 * (-y / az + 1.0))
    } else {
        (CubeFace::NegativeZ, 0.5 * (-x / az + 1.0), 0.5 * (-y / az + 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::PixelFormat;

    #[test]
    fn nearest_sample_matches_texel() {
        let mut tex = Texture::new(PixelFormat::RGBA_F32, 2, 2, 1).unwrap();
        tex.write_rgba_f32(1, 0, 0, [9.0, 9.0, 9.0, 9.0]);
        let got = tex.sample(0.9, 0.1, 0, WrapMode::ClampToEdge, Filter::Nearest);
        assert_eq!(got, [9.0, 9.0, 9.0, 9.0]);
    }

    #[test]
    fn bilinear_interpolates_between_texels() {
        let mut tex = Texture::new(PixelFormat::RGBA_F32, 2, 1, 1).unwrap();
        tex.write_rgba_f32(0, 0, 0, [0.0, 0.0, 0.0, 1.0]);
        tex.write_rgba_f32(1, 0, 0, [1.0, 1.0, 1.0, 1.0]);
        let got = tex.sample(0.5, 0.5, 0, WrapMode::ClampToEdge, Filter::Bilinear);
        assert!((got[0] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn repeat_wraps_past_one() {
        let mut tex = Texture::new(PixelFormat::RGBA_F32, 2, 1, 1).unwrap();
        tex.write_rgba_f32(0, 0, 0, [5.0, 5.0, 5.0, 5.0]);
        let got = tex.sample(1.0 + 1e-4, 0.0, 0, WrapMode::Repeat, Filter::Nearest);
        assert_eq!(got, [5.0, 5.0, 5.0, 5.0]);
    }
}
