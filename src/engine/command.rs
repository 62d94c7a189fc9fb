use crate::{shaders, FenceSignal, TextureHandle};
use zerocopy::{AsBytes, FromBytes};

/// Backend a command must be dispatched to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PassKind {
    Compute,
    /// Full-screen draw clipped to the destination viewport.
    Raster,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Program {
    /// Writes one mip level of a cube map into its octahedral atlas rectangle.
    OctahedralProjection,
}

impl Program {
    pub fn vertex_source(self) -> &'static str {
        match self {
            Self::OctahedralProjection => shaders::OCTAHEDRAL_PROJECTION_VERT,
        }
    }

    pub fn fragment_source(self) -> &'static str {
        match self {
            Self::OctahedralProjection => shaders::OCTAHEDRAL_PROJECTION_FRAG,
        }
    }
}

/// Uniform block of the octahedral projection program (std140 layout).
#[repr(align(16), C)]
#[derive(AsBytes, FromBytes, Clone, Copy, Debug, Default, PartialEq)]
pub struct ProjectionData {
    /// Destination rectangle as `[x, y, width, height]` in atlas texels.
    pub viewport: [u32; 4],
    pub atlas_size: [u32; 2],
    pub mip_level: u32,
    pub normalized: u32,
}

/// A single GPU pass recorded into a frame's command list.
#[derive(Debug)]
pub struct Command {
    pub kind: PassKind,
    pub program: Program,
    pub source: TextureHandle,
    pub target: TextureHandle,
    pub uniforms: ProjectionData,
    pub fence: Option<FenceSignal>,
}

impl Command {
    /// Raw uniform bytes for upload into a uniform buffer.
    pub fn uniform_bytes(&self) -> &[u8] {
        self.uniforms.as_bytes()
    }
}

/// Command side of the external GPU executor.
///
/// Commands must be executed in list order. Executors resolve each
/// command's fence once the pass has run or has failed.
pub trait Executor {
    fn execute(&self, commands: Vec<Command>);
}
