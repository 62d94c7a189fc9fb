#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{
    octahedral, sample_cube, Backend, Command, DeviceCapabilities, DeviceError, Executor,
    PixelDatatype, Program, ProjectionData, TexelImage, TextureData, TextureDescriptor,
    TextureHandle, TextureKind,
};
use half::f16;
use itertools::iproduct;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use zerocopy::LayoutVerified;

#[derive(Debug)]
enum StoredTexture {
    Flat {
        datatype: PixelDatatype,
        image: TexelImage,
    },
    Cube {
        faces: Vec<TexelImage>,
    },
}

/// CPU implementation of the GPU backend and command executor.
///
/// Textures are kept as `f32` images, quantized to their datatype on write,
/// and every pass runs synchronously inside `execute`. Useful headless and
/// as the reference the GPU programs are checked against.
#[derive(Debug)]
pub struct SoftwareDevice {
    capabilities: DeviceCapabilities,
    textures: RefCell<HashMap<TextureHandle, StoredTexture>>,
    next_handle: Cell<u64>,
    allocations_left: Cell<Option<usize>>,
    executed_passes: Cell<usize>,
}

impl SoftwareDevice {
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            textures: RefCell::new(HashMap::new()),
            next_handle: Cell::new(1),
            allocations_left: Cell::new(None),
            executed_passes: Cell::new(0),
        }
    }

    /// Makes every allocation after the next `count` ones fail.
    pub fn fail_allocations_after(&self, count: usize) {
        self.allocations_left.set(Some(count));
    }

    pub fn live_textures(&self) -> usize {
        self.textures.borrow().len()
    }

    pub fn contains_texture(&self, handle: TextureHandle) -> bool {
        self.textures.borrow().contains_key(&handle)
    }

    /// Number of passes that ran to completion.
    pub fn executed_passes(&self) -> usize {
        self.executed_passes.get()
    }

    /// Reads back the contents of a flat texture.
    pub fn read_texture(&self, handle: TextureHandle) -> Option<TexelImage> {
        match self.textures.borrow().get(&handle)? {
            StoredTexture::Flat { image, .. } => Some(image.clone()),
            StoredTexture::Cube { .. } => None,
        }
    }

    fn run(&self, command: &Command) -> Result<(), String> {
        match command.program {
            Program::OctahedralProjection => self.run_octahedral_projection(command),
        }
    }

    fn run_octahedral_projection(&self, command: &Command) -> Result<(), String> {
        // read the block back the way a GPU would see the uploaded buffer
        let uniforms: ProjectionData =
            *LayoutVerified::<_, ProjectionData>::new(command.uniform_bytes())
                .ok_or("malformed projection uniform block")?;

        let mut textures = self.textures.borrow_mut();

        let mut target = textures
            .remove(&command.target)
            .ok_or_else(|| format!("target texture {:?} was deleted", command.target))?;

        let result = match (textures.get(&command.source), &mut target) {
            (Some(StoredTexture::Cube { faces }), StoredTexture::Flat { datatype, image }) => {
                project_level(faces, image, *datatype, &uniforms);
                Ok(())
            }
            (None, _) => Err(format!("source texture {:?} was deleted", command.source)),
            _ => Err("projection expects a cube source and a flat target".to_string()),
        };

        textures.insert(command.target, target);
        result
    }
}

fn project_level(
    faces: &[TexelImage],
    atlas: &mut TexelImage,
    datatype: PixelDatatype,
    uniforms: &ProjectionData,
) {
    let [x0, y0, width, height] = uniforms.viewport;
    let normalized = uniforms.normalized != 0;

    for (y, x) in iproduct!(0..height, 0..width) {
        if x0 + x >= atlas.width() || y0 + y >= atlas.height() {
            continue; // clipped by the render target
        }

        let coord = [
            octahedral::texel_coordinate(x, width),
            octahedral::texel_coordinate(y, height),
        ];

        let direction = octahedral::flip_y(octahedral::decode(coord));
        let mut color = sample_cube(faces, direction);

        if normalized {
            for channel in &mut color {
                *channel = channel.max(0.0).min(1.0);
            }
        }

        atlas.set_texel(x0 + x, y0 + y, quantize(color, datatype));
    }
}

fn quantize(color: [f32; 4], datatype: PixelDatatype) -> [f32; 4] {
    let mut out = color;

    for channel in &mut out {
        *channel = match datatype {
            PixelDatatype::UnsignedByte => (channel.max(0.0).min(1.0) * 255.0).round() / 255.0,
            PixelDatatype::HalfFloat => f16::from_f32(*channel).to_f32(),
            PixelDatatype::Float => *channel,
        };
    }

    out
}

fn decode_texels(data: TextureData<'_>) -> Vec<[f32; 4]> {
    let values: Vec<f32> = match data {
        TextureData::Unorm8(data) => data.iter().map(|&v| f32::from(v) / 255.0).collect(),
        TextureData::Float16(data) => data.iter().map(|&v| f16::from_bits(v).to_f32()).collect(),
        TextureData::Float32(data) => data.to_vec(),
    };

    values
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect()
}

impl Backend for SoftwareDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        data: Option<TextureData<'_>>,
    ) -> Result<TextureHandle, DeviceError> {
        if let Some(left) = self.allocations_left.get() {
            if left == 0 {
                return Err(DeviceError::Allocation(format!(
                    "out of memory allocating `{}'",
                    descriptor.label
                )));
            }

            self.allocations_left.set(Some(left - 1));
        }

        if let Some(data) = &data {
            if data.len() != descriptor.channel_count() {
                return Err(DeviceError::UploadSize {
                    expected: descriptor.channel_count(),
                    actual: data.len(),
                });
            }
        }

        let (cols, rows) = (descriptor.cols, descriptor.rows);
        let texels = data.map(decode_texels);

        let texture = match descriptor.kind {
            TextureKind::Flat => StoredTexture::Flat {
                datatype: descriptor.datatype,
                image: texels
                    .and_then(|texels| TexelImage::from_texels(cols, rows, texels))
                    .unwrap_or_else(|| TexelImage::new(cols, rows)),
            },
            TextureKind::Cube => {
                let face_len = cols as usize * rows as usize;
                let faces = match texels {
                    Some(texels) => texels
                        .chunks_exact(face_len)
                        .filter_map(|face| TexelImage::from_texels(cols, rows, face.to_vec()))
                        .collect(),
                    None => vec![TexelImage::new(cols, rows); 6],
                };

                StoredTexture::Cube { faces }
            }
        };

        let handle = TextureHandle::from_raw(self.next_handle.get());
        self.next_handle.set(handle.raw() + 1);

        self.textures.borrow_mut().insert(handle, texture);

        Ok(handle)
    }

    fn delete_texture(&self, handle: TextureHandle) {
        self.textures.borrow_mut().remove(&handle);
    }
}

impl Executor for SoftwareDevice {
    fn execute(&self, commands: Vec<Command>) {
        for mut command in commands {
            let result = self.run(&command);

            match (&result, command.fence.take()) {
                (Ok(()), Some(fence)) => fence.signal(),
                (Err(reason), Some(fence)) => fence.fail(reason),
                (_, None) => {}
            }

            match result {
                Ok(()) => self.executed_passes.set(self.executed_passes.get() + 1),
                Err(reason) => debug!("skipped {:?} pass: {}", command.kind, reason),
            }
        }
    }
}
