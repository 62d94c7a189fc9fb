//! CPU reference sampling of cube maps and projected atlases.

use crate::{octahedral, AtlasDescriptor, CubeFace};
use cgmath::Vector3;

/// RGBA image with `f32` channels, row-major from the top-left.
#[derive(Clone, Debug, PartialEq)]
pub struct TexelImage {
    width: u32,
    height: u32,
    texels: Vec<[f32; 4]>,
}

impl TexelImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            texels: vec![[0.0; 4]; width as usize * height as usize],
        }
    }

    pub fn from_texels(width: u32, height: u32, texels: Vec<[f32; 4]>) -> Option<Self> {
        if texels.len() != width as usize * height as usize {
            return None;
        }

        Some(Self {
            width,
            height,
            texels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        self.texels[y as usize * self.width as usize + x as usize]
    }

    pub fn set_texel(&mut self, x: u32, y: u32, value: [f32; 4]) {
        self.texels[y as usize * self.width as usize + x as usize] = value;
    }

    /// Bilinear lookup at a continuous texel-space position (texel `i` is
    /// centred at `i + 0.5`), clamping to the image edges.
    pub fn sample_bilinear(&self, x: f32, y: f32) -> [f32; 4] {
        let fx = (x - 0.5).max(0.0).min((self.width - 1) as f32);
        let fy = (y - 0.5).max(0.0).min((self.height - 1) as f32);

        let x0 = fx.floor() as u32;
        let y0 = fy.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);

        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;

        let top = lerp(self.texel(x0, y0), self.texel(x1, y0), tx);
        let bottom = lerp(self.texel(x0, y1), self.texel(x1, y1), tx);

        lerp(top, bottom, ty)
    }
}

pub fn lerp(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    let mut out = [0.0; 4];

    for i in 0..4 {
        out[i] = a[i] + (b[i] - a[i]) * t;
    }

    out
}

/// Selects the cube face hit by a direction and the `(s, t)` face
/// coordinates in `[0, 1]^2`, following the OpenGL cube map convention.
pub fn cube_face_coordinates(direction: Vector3<f32>) -> (CubeFace, f32, f32) {
    let (ax, ay, az) = (direction.x.abs(), direction.y.abs(), direction.z.abs());

    let (face, sc, tc, ma) = if ax >= ay && ax >= az {
        if direction.x > 0.0 {
            (CubeFace::PositiveX, -direction.z, -direction.y, ax)
        } else {
            (CubeFace::NegativeX, direction.z, -direction.y, ax)
        }
    } else if ay >= az {
        if direction.y > 0.0 {
            (CubeFace::PositiveY, direction.x, direction.z, ay)
        } else {
            (CubeFace::NegativeY, direction.x, -direction.z, ay)
        }
    } else if direction.z > 0.0 {
        (CubeFace::PositiveZ, direction.x, -direction.y, az)
    } else {
        (CubeFace::NegativeZ, -direction.x, -direction.y, az)
    };

    (face, 0.5 * (sc / ma + 1.0), 0.5 * (tc / ma + 1.0))
}

/// Direction through face coordinates `(s, t)`; inverse of
/// `cube_face_coordinates` up to normalization.
pub fn cube_direction(face: CubeFace, s: f32, t: f32) -> Vector3<f32> {
    let sc = 2.0 * s - 1.0;
    let tc = 2.0 * t - 1.0;

    match face {
        CubeFace::PositiveX => Vector3::new(1.0, -tc, -sc),
        CubeFace::NegativeX => Vector3::new(-1.0, -tc, sc),
        CubeFace::PositiveY => Vector3::new(sc, 1.0, tc),
        CubeFace::NegativeY => Vector3::new(sc, -1.0, -tc),
        CubeFace::PositiveZ => Vector3::new(sc, -tc, 1.0),
        CubeFace::NegativeZ => Vector3::new(-sc, -tc, -1.0),
    }
}

/// Samples one cube map level (six faces in `CubeFace::ALL` order) with
/// bilinear filtering inside the selected face.
pub fn sample_cube(faces: &[TexelImage], direction: Vector3<f32>) -> [f32; 4] {
    let (face, s, t) = cube_face_coordinates(direction);
    let image = &faces[face.index()];

    image.sample_bilinear(s * image.width() as f32, t * image.height() as f32)
}

/// Samples a projected atlas at one mip level along a cube-space direction.
pub fn sample_atlas(
    atlas: &TexelImage,
    descriptor: &AtlasDescriptor,
    direction: Vector3<f32>,
    level: usize,
) -> Option<[f32; 4]> {
    let [x, y] = octahedral::atlas_position(descriptor, octahedral::flip_y(direction), level)?;

    Some(atlas.sample_bilinear(x, y))
}

/// Samples a projected atlas at a fractional level of detail, blending the
/// two nearest levels and clamping to the last projected level.
pub fn sample_atlas_lod(
    atlas: &TexelImage,
    descriptor: &AtlasDescriptor,
    direction: Vector3<f32>,
    lod: f32,
) -> [f32; 4] {
    let max_lod = descriptor.maximum_mipmap_level();
    let lod = lod.max(0.0).min(max_lod as f32);

    let lower = lod.floor() as usize;
    let upper = (lower + 1).min(max_lod);

    let sample = |level| sample_atlas(atlas, descriptor, direction, level).unwrap_or([0.0; 4]);

    lerp(sample(lower), sample(upper), lod - lower as f32)
}
