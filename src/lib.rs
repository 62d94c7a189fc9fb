//! Octahedral projection of cube map environments for specular IBL.
//!
//! A [`Projection`] loads a cube map mip chain through a [`SourceLoader`],
//! records one reprojection pass per mip level into the frame's command
//! list and publishes a flat atlas holding every level, which renderers
//! sample with a single 2D lookup keyed by direction and level of detail.
//! Atlases are shared per source through a [`ProjectionCache`].

#![deny(unsafe_code)]

#[allow(unused_imports)]
use log::{debug, info, warn};

macro_rules! export {
    [$( $module:ident ),* $(,)*] => {
        $(
            mod $module;
            pub use self::$module::*;
        )*
    };
}

export![device, engine, error, projection];

/// GLSL shaders.
pub mod shaders {
    /// Full-screen triangle covering the destination viewport.
    pub const OCTAHEDRAL_PROJECTION_VERT: &str =
        include_str!("shaders/octahedral_projection.vert");

    /// Writes one cube map level into its rectangle of the atlas.
    pub const OCTAHEDRAL_PROJECTION_FRAG: &str =
        include_str!("shaders/octahedral_projection.frag");

    /// Consumer-side atlas lookup, to be included by lighting shaders.
    pub const OCTAHEDRAL_SAMPLING: &str = include_str!("shaders/octahedral_sampling.glsl");
}

#[cfg(test)]
mod tests {
    use super::shaders;

    #[test]
    fn sampling_include_flips_direction() {
        assert!(shaders::OCTAHEDRAL_SAMPLING.contains("octahedral_encode"));
        assert!(shaders::OCTAHEDRAL_SAMPLING.contains("-direction.y"));
    }
}
