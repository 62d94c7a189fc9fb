#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::LayoutError;
use serde::{Deserialize, Serialize};

/// Texels of padding on each side of a level rectangle.
pub const ATLAS_BORDER: u32 = 1;

/// Axis-aligned rectangle in atlas texels.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn to_array(&self) -> [u32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

/// Placement of every projected mip level inside the flat atlas.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AtlasDescriptor {
    pub width: u32,
    pub height: u32,
    pub mip_offsets: Vec<Rect>,
}

impl AtlasDescriptor {
    pub fn mip_count(&self) -> usize {
        self.mip_offsets.len()
    }

    /// Highest addressable level; zero for a descriptor without levels.
    pub fn maximum_mipmap_level(&self) -> usize {
        self.mip_offsets.len().saturating_sub(1)
    }

    pub fn level(&self, level: usize) -> Option<Rect> {
        self.mip_offsets.get(level).copied()
    }
}

/// Largest mip count a cube map with the given face size can have.
pub fn max_mip_count(face_size: u32) -> usize {
    (32 - face_size.leading_zeros()) as usize
}

/// Edge length of the octahedral square holding a given cube map level.
pub fn projected_size(face_size: u32, level: usize) -> u32 {
    2 * face_size.checked_shr(level as u32).unwrap_or(0).max(1)
}

/// Computes the packed atlas for a cube map with `mip_count` levels.
///
/// Level 0 occupies the `2 * face_size` square on the left. The remaining
/// levels are stacked top to bottom in a column of half that width, separated
/// from level 0 and from each other by a gutter of two border texels. A level
/// that no longer fits vertically goes to the right of the previous one.
pub fn atlas_layout(face_size: u32, mip_count: usize) -> Result<AtlasDescriptor, LayoutError> {
    if face_size == 0 {
        return Err(LayoutError::ZeroFaceSize);
    }

    if mip_count == 0 {
        return Err(LayoutError::NoLevels);
    }

    let max = max_mip_count(face_size);

    if mip_count > max {
        return Err(LayoutError::TooManyLevels {
            face_size,
            mip_count,
            max,
        });
    }

    let height = projected_size(face_size, 0);
    let column_x = height + 2 * ATLAS_BORDER;
    let width = column_x + height / 2;

    let mut mip_offsets = vec![Rect {
        x: 0,
        y: 0,
        width: height,
        height,
    }];

    let mut cursor_y = 0;

    for level in 1..mip_count {
        let size = projected_size(face_size, level);

        let rect = if cursor_y + size <= height {
            let rect = Rect {
                x: column_x,
                y: cursor_y,
                width: size,
                height: size,
            };

            cursor_y += size + 2 * ATLAS_BORDER;
            rect
        } else {
            let previous = mip_offsets[level - 1];

            Rect {
                x: previous.right() + 2 * ATLAS_BORDER,
                y: previous.y,
                width: size,
                height: size,
            }
        };

        if rect.right() > width || rect.bottom() > height {
            return Err(LayoutError::Overflow { level });
        }

        mip_offsets.push(rect);
    }

    debug!(
        "{}px cube map with {} levels packs into a {}x{} atlas",
        face_size, mip_count, width, height
    );

    Ok(AtlasDescriptor {
        width,
        height,
        mip_offsets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    #[test]
    fn reproduces_reference_atlas_dimensions() {
        let descriptor = atlas_layout(256, 8).unwrap();

        assert_eq!(descriptor.width, 770);
        assert_eq!(descriptor.height, 512);
        assert_eq!(descriptor.maximum_mipmap_level(), 7);
    }

    #[test]
    fn empty_descriptors_have_no_levels_above_zero() {
        let descriptor: AtlasDescriptor =
            serde_json::from_str(r#"{ "width": 0, "height": 0, "mip_offsets": [] }"#).unwrap();

        assert_eq!(descriptor.mip_count(), 0);
        assert_eq!(descriptor.maximum_mipmap_level(), 0);
        assert_eq!(descriptor.level(0), None);
    }

    #[test]
    fn layout_is_deterministic() {
        assert_eq!(atlas_layout(256, 8), atlas_layout(256, 8));
    }

    #[test]
    fn reference_levels_are_placed_in_column() {
        let descriptor = atlas_layout(256, 8).unwrap();

        let expected = [
            (0, 0, 512),
            (514, 0, 256),
            (514, 258, 128),
            (514, 388, 64),
            (514, 454, 32),
            (514, 488, 16),
            (532, 488, 8),
            (514, 506, 4),
        ];

        for (rect, &(x, y, size)) in descriptor.mip_offsets.iter().zip(&expected) {
            assert_eq!(
                *rect,
                Rect {
                    x,
                    y,
                    width: size,
                    height: size
                }
            );
        }
    }

    #[test]
    fn levels_never_overlap_and_stay_inside() {
        for face_size in 1..=300 {
            for mip_count in 1..=max_mip_count(face_size) {
                let descriptor = atlas_layout(face_size, mip_count).unwrap();

                for rect in &descriptor.mip_offsets {
                    assert!(rect.right() <= descriptor.width);
                    assert!(rect.bottom() <= descriptor.height);
                    assert!(rect.width >= 2);
                }

                for (a, b) in descriptor.mip_offsets.iter().tuple_combinations() {
                    assert!(!a.intersects(b), "{:?} overlaps {:?}", a, b);
                }
            }
        }
    }

    #[test]
    fn levels_descend_in_size() {
        let descriptor = atlas_layout(64, 7).unwrap();

        for (a, b) in descriptor.mip_offsets.iter().tuple_windows() {
            assert_eq!(a.width, 2 * b.width);
        }
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert_eq!(atlas_layout(0, 1), Err(LayoutError::ZeroFaceSize));
        assert_eq!(atlas_layout(16, 0), Err(LayoutError::NoLevels));
        assert_eq!(
            atlas_layout(16, 6),
            Err(LayoutError::TooManyLevels {
                face_size: 16,
                mip_count: 6,
                max: 5
            })
        );
    }

    #[test]
    fn max_mip_count_follows_log2() {
        assert_eq!(max_mip_count(1), 1);
        assert_eq!(max_mip_count(2), 2);
        assert_eq!(max_mip_count(3), 2);
        assert_eq!(max_mip_count(256), 9);
    }
}
