#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{
    Context, DeviceError, PixelDatatype, TextureData, TextureDescriptor, TextureHandle,
    TextureKind,
};

/// RGBA texture owned through a backend context.
///
/// The underlying device texture is released when the texture is reset or
/// dropped, so whoever owns this value owns the GPU allocation.
#[derive(Debug)]
pub struct Texture {
    gl: Context,

    handle: Option<TextureHandle>,
    layout: (u32, u32),
    kind: TextureKind,
    datatype: PixelDatatype,
}

impl Texture {
    pub fn new(gl: Context) -> Self {
        Self {
            gl,
            handle: None,
            layout: (0, 0),
            kind: TextureKind::Flat,
            datatype: PixelDatatype::UnsignedByte,
        }
    }

    pub fn cols(&self) -> u32 {
        self.layout.0
    }

    pub fn rows(&self) -> u32 {
        self.layout.1
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn datatype(&self) -> PixelDatatype {
        self.datatype
    }

    pub fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }

    pub fn invalidate(&mut self) {
        self.layout = (0, 0);
        self.handle = None;
    }

    pub fn reset(&mut self) {
        if let Some(texture_handle) = self.handle {
            self.gl.delete_texture(texture_handle);
        }

        self.invalidate();
    }

    pub fn is_invalid(&self) -> bool {
        self.handle.is_none()
    }

    /// Allocates an empty flat texture, releasing any previous allocation.
    pub fn create(
        &mut self,
        label: &'static str,
        cols: u32,
        rows: u32,
        datatype: PixelDatatype,
    ) -> Result<(), DeviceError> {
        let descriptor = TextureDescriptor {
            label,
            kind: TextureKind::Flat,
            cols,
            rows,
            datatype,
        };

        self.create_texture(&descriptor, None)
    }

    /// Allocates a cube map and uploads all six faces.
    pub fn upload_cube(
        &mut self,
        label: &'static str,
        size: u32,
        data: TextureData<'_>,
    ) -> Result<(), DeviceError> {
        let descriptor = TextureDescriptor {
            label,
            kind: TextureKind::Cube,
            cols: size,
            rows: size,
            datatype: data.datatype(),
        };

        if data.len() != descriptor.channel_count() {
            return Err(DeviceError::UploadSize {
                expected: descriptor.channel_count(),
                actual: data.len(),
            });
        }

        self.create_texture(&descriptor, Some(data))
    }

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
        data: Option<TextureData<'_>>,
    ) -> Result<(), DeviceError> {
        assert!(
            descriptor.cols > 0 && descriptor.rows > 0,
            "invalid texture layout requested"
        );

        self.reset();

        self.handle = Some(self.gl.create_texture(descriptor, data)?);
        self.layout = (descriptor.cols, descriptor.rows);
        self.kind = descriptor.kind;
        self.datatype = descriptor.datatype;

        debug!(
            "created {}x{} {:?} texture `{}'",
            descriptor.cols, descriptor.rows, descriptor.kind, descriptor.label
        );

        Ok(())
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(texture_handle) = self.handle {
            self.gl.delete_texture(texture_handle);
        }
    }
}
