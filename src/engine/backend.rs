use crate::DeviceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Shared handle to the device backing a rendering context.
pub type Context = Rc<dyn Backend>;

/// Feature flags reported by a device.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct DeviceCapabilities {
    pub half_float_texture: bool,
    pub color_buffer_half_float: bool,
    pub float_texture: bool,
    pub color_buffer_float: bool,
    pub cube_map_sampling: bool,
    pub mipmap_generation: bool,
    pub compute_shaders: bool,
}

impl DeviceCapabilities {
    /// Capabilities of a typical WebGL2 context with the float extensions.
    pub fn webgl2() -> Self {
        Self {
            half_float_texture: true,
            color_buffer_half_float: true,
            float_texture: true,
            color_buffer_float: true,
            cube_map_sampling: true,
            mipmap_generation: true,
            compute_shaders: false,
        }
    }

    /// Whether half-float textures can be both sampled and rendered into.
    pub fn renders_half_float(&self) -> bool {
        self.half_float_texture && self.color_buffer_half_float
    }

    /// Whether full-float textures can be both sampled and rendered into.
    pub fn renders_float(&self) -> bool {
        self.float_texture && self.color_buffer_float
    }
}

/// Opaque identifier of a texture allocated by a backend.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TextureHandle(u64);

impl TextureHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum PixelDatatype {
    UnsignedByte,
    HalfFloat,
    Float,
}

impl PixelDatatype {
    /// Normalized datatypes store values clamped to `[0, 1]`.
    pub fn is_normalized(self) -> bool {
        self == Self::UnsignedByte
    }

    pub fn bytes_per_channel(self) -> usize {
        match self {
            Self::UnsignedByte => 1,
            Self::HalfFloat => 2,
            Self::Float => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextureKind {
    Flat,
    Cube,
}

/// Everything a backend needs to allocate an RGBA texture.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TextureDescriptor {
    pub label: &'static str,
    pub kind: TextureKind,
    pub cols: u32,
    pub rows: u32,
    pub datatype: PixelDatatype,
}

impl TextureDescriptor {
    /// Number of scalar channel values a full upload must contain.
    pub fn channel_count(&self) -> usize {
        let faces = match self.kind {
            TextureKind::Flat => 1,
            TextureKind::Cube => 6,
        };

        self.cols as usize * self.rows as usize * 4 * faces
    }
}

/// Borrowed RGBA texel data ready for upload.
///
/// Cube map uploads concatenate the six faces in `CubeFace::ALL` order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TextureData<'a> {
    Unorm8(&'a [u8]),
    Float16(&'a [u16]),
    Float32(&'a [f32]),
}

impl TextureData<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Unorm8(data) => data.len(),
            Self::Float16(data) => data.len(),
            Self::Float32(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn datatype(&self) -> PixelDatatype {
        match self {
            Self::Unorm8(_) => PixelDatatype::UnsignedByte,
            Self::Float16(_) => PixelDatatype::HalfFloat,
            Self::Float32(_) => PixelDatatype::Float,
        }
    }
}

/// Resource side of the external GPU executor.
///
/// Backends are shared by every texture allocated through them, so all
/// methods take `&self` and implementations use interior mutability.
pub trait Backend: fmt::Debug {
    fn capabilities(&self) -> DeviceCapabilities;

    /// Allocates a texture, optionally uploading its full contents.
    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        data: Option<TextureData<'_>>,
    ) -> Result<TextureHandle, DeviceError>;

    /// Releases a texture. Unknown handles are ignored.
    fn delete_texture(&self, handle: TextureHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webgl2_renders_both_float_formats() {
        let caps = DeviceCapabilities::webgl2();

        assert!(caps.renders_half_float());
        assert!(caps.renders_float());
        assert!(!caps.compute_shaders);
    }

    #[test]
    fn cube_descriptors_count_six_faces() {
        let descriptor = TextureDescriptor {
            label: "test",
            kind: TextureKind::Cube,
            cols: 4,
            rows: 4,
            datatype: PixelDatatype::Float,
        };

        assert_eq!(descriptor.channel_count(), 4 * 4 * 4 * 6);
    }

    #[test]
    fn capabilities_deserialize_with_missing_fields() {
        let caps: DeviceCapabilities =
            serde_json::from_str(r#"{ "float_texture": true, "color_buffer_float": true }"#)
                .unwrap();

        assert!(caps.renders_float());
        assert!(!caps.renders_half_float());
        assert!(!caps.cube_map_sampling && !caps.mipmap_generation);
    }
}
