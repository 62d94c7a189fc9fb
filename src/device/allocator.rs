use crate::{PixelDatatype, TextureData, Texels};
use half::f16;
use std::fmt;
use std::mem::size_of;
use zerocopy::{AsBytes, FromBytes, LayoutVerified};

/// Staging memory for texel conversion before upload.
///
/// This allocator is designed for potentially large, short-lived allocations
/// that only live until the upload call returns. It uses a watermark system
/// so that memory is released once the largest recent upload has shrunk.
#[derive(Default)]
pub struct Allocator {
    memory: Vec<Aligned>,
    watermark: usize,
}

impl Allocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shrink_to_watermark(&mut self) {
        self.memory.truncate(self.watermark);
        self.memory.shrink_to_fit(); // free

        self.watermark = 0;
    }

    pub fn allocate<T: AsBytes + FromBytes>(&mut self, len: usize) -> &mut [T] {
        let bytes = self.allocate_bytes(len * size_of::<T>());

        LayoutVerified::new_slice(bytes).unwrap().into_mut_slice()
    }

    pub fn allocate_bytes(&mut self, len: usize) -> &mut [u8] {
        let blocks = (len + size_of::<Aligned>() - 1) / size_of::<Aligned>();
        self.memory.resize_with(blocks, Aligned::default); // round up length

        self.watermark = self.watermark.max(self.memory.len());
        &mut self.memory.as_mut_slice().as_bytes_mut()[..len]
    }

    /// Concatenates cube faces into one upload buffer of the given datatype.
    pub fn stage_faces(&mut self, faces: &[Texels], datatype: PixelDatatype) -> TextureData<'_> {
        let len = faces.iter().map(Texels::len).sum();

        match datatype {
            PixelDatatype::UnsignedByte => {
                let staged: &mut [u8] = self.allocate(len);
                let values = faces.iter().flat_map(|face| ChannelIter::new(face));

                for (dst, value) in staged.iter_mut().zip(values) {
                    *dst = (value.max(0.0).min(1.0) * 255.0).round() as u8;
                }

                TextureData::Unorm8(staged)
            }
            PixelDatatype::HalfFloat => {
                let staged: &mut [u16] = self.allocate(len);
                let values = faces.iter().flat_map(|face| ChannelIter::new(face));

                for (dst, value) in staged.iter_mut().zip(values) {
                    *dst = f16::from_f32(value).to_bits();
                }

                TextureData::Float16(staged)
            }
            PixelDatatype::Float => {
                let staged: &mut [f32] = self.allocate(len);
                let values = faces.iter().flat_map(|face| ChannelIter::new(face));

                for (dst, value) in staged.iter_mut().zip(values) {
                    *dst = value;
                }

                TextureData::Float32(staged)
            }
        }
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.memory.len() * size_of::<Aligned>();
        write!(f, "Allocator {{ {} bytes in use }}", bytes)
    }
}

/// Iterates over the channel values of decoded texels as `f32`.
struct ChannelIter<'a> {
    texels: &'a Texels,
    index: usize,
}

impl<'a> ChannelIter<'a> {
    fn new(texels: &'a Texels) -> Self {
        Self { texels, index: 0 }
    }
}

impl Iterator for ChannelIter<'_> {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let value = match self.texels {
            Texels::Unorm8(data) => f32::from(*data.get(self.index)?) / 255.0,
            Texels::Float16(data) => f16::from_bits(*data.get(self.index)?).to_f32(),
            Texels::Float32(data) => *data.get(self.index)?,
        };

        self.index += 1;
        Some(value)
    }
}

#[repr(align(64), C)]
#[derive(FromBytes, AsBytes, Clone)]
struct Aligned([u8; 64]);

impl Default for Aligned {
    fn default() -> Self {
        Self([0; 64])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_sized_and_reused() {
        let mut allocator = Allocator::new();

        assert_eq!(allocator.allocate::<f32>(100).len(), 100);
        assert_eq!(allocator.allocate::<u16>(3).len(), 3);

        allocator.shrink_to_watermark();
        allocator.shrink_to_watermark();

        assert_eq!(format!("{:?}", allocator), "Allocator { 0 bytes in use }");
    }

    #[test]
    fn stages_float_faces_as_half_floats() {
        let mut allocator = Allocator::new();
        let faces = vec![Texels::Float32(vec![0.5, 1.0, 2.0, 1.0]); 6];

        match allocator.stage_faces(&faces, PixelDatatype::HalfFloat) {
            TextureData::Float16(data) => {
                assert_eq!(data.len(), 24);
                assert_eq!(f16::from_bits(data[0]).to_f32(), 0.5);
                assert_eq!(f16::from_bits(data[22]).to_f32(), 2.0);
            }
            other => panic!("unexpected staging format {:?}", other.datatype()),
        }
    }

    #[test]
    fn stages_normalized_faces_unchanged() {
        let mut allocator = Allocator::new();
        let mut faces = vec![Texels::Unorm8(vec![0, 64, 128, 255]); 6];
        faces[5] = Texels::Unorm8(vec![1, 2, 3, 4]);

        match allocator.stage_faces(&faces, PixelDatatype::UnsignedByte) {
            TextureData::Unorm8(data) => {
                assert_eq!(&data[..4], &[0, 64, 128, 255]);
                assert_eq!(&data[20..], &[1, 2, 3, 4]);
            }
            other => panic!("unexpected staging format {:?}", other.datatype()),
        }
    }
}
