//! Octahedral mapping between unit directions and the unit square.
//!
//! The upper hemisphere (`y >= 0`) maps onto the inner diamond of the square
//! and the lower hemisphere folds outward onto the four corner triangles.
//! `encode` and `decode` are exact inverses of each other, and both match the
//! GLSL in `shaders::OCTAHEDRAL_SAMPLING` and the projection program.

use crate::{AtlasDescriptor, Rect};
use cgmath::prelude::*;
use cgmath::Vector3;

fn sign_not_zero(value: f32) -> f32 {
    if value < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Maps a direction to octahedral coordinates in `[0, 1]^2`.
pub fn encode(direction: Vector3<f32>) -> [f32; 2] {
    let d = direction / (direction.x.abs() + direction.y.abs() + direction.z.abs());

    let (u, v) = if d.y >= 0.0 {
        (d.x, d.z)
    } else {
        (
            sign_not_zero(d.x) * (1.0 - d.z.abs()),
            sign_not_zero(d.z) * (1.0 - d.x.abs()),
        )
    };

    [0.5 * u + 0.5, 0.5 * v + 0.5]
}

/// Maps octahedral coordinates in `[0, 1]^2` back to a unit direction.
pub fn decode(coord: [f32; 2]) -> Vector3<f32> {
    let u = 2.0 * coord[0] - 1.0;
    let v = 2.0 * coord[1] - 1.0;
    let y = 1.0 - u.abs() - v.abs();

    let direction = if y >= 0.0 {
        Vector3::new(u, y, v)
    } else {
        Vector3::new(
            sign_not_zero(u) * (1.0 - v.abs()),
            y,
            sign_not_zero(v) * (1.0 - u.abs()),
        )
    };

    direction.normalize()
}

/// Octahedral coordinate stored by texel `index` of a level `size` texels wide.
///
/// Texel centres span the full `[0, 1]` range so that the octahedron's edges
/// and corners land exactly on texels of the level's own rectangle.
pub fn texel_coordinate(index: u32, size: u32) -> f32 {
    if size < 2 {
        0.5
    } else {
        index as f32 / (size - 1) as f32
    }
}

/// Continuous texel-space position (texel `i` centred at `i + 0.5`) of an
/// octahedral coordinate inside a level rectangle.
pub fn texel_position(rect: Rect, coord: [f32; 2]) -> [f32; 2] {
    let span_x = rect.width.saturating_sub(1) as f32;
    let span_y = rect.height.saturating_sub(1) as f32;

    [
        rect.x as f32 + 0.5 + coord[0] * span_x,
        rect.y as f32 + 0.5 + coord[1] * span_y,
    ]
}

/// Texel-space atlas position sampled for a direction at a given mip level.
///
/// `direction` is in atlas space: callers holding a cube-space direction must
/// negate its Y component first.
pub fn atlas_position(
    descriptor: &AtlasDescriptor,
    direction: Vector3<f32>,
    level: usize,
) -> Option<[f32; 2]> {
    let rect = descriptor.level(level)?;

    Some(texel_position(rect, encode(direction)))
}

/// Converts a cube-space direction to the atlas-space direction used for
/// sampling, and back.
pub fn flip_y(direction: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(direction.x, -direction.y, direction.z)
}
