#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{LoadError, PixelDatatype, TextureData};
use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::task::Poll;

/// Canonical key of an environment map, compared by value.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct SourceIdentity(String);

impl SourceIdentity {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceIdentity {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for SourceIdentity {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Decoded RGBA texels of one cube face, row-major from the top-left.
#[derive(Clone, Debug, PartialEq)]
pub enum Texels {
    Unorm8(Vec<u8>),
    Float16(Vec<u16>),
    Float32(Vec<f32>),
}

impl Texels {
    pub fn len(&self) -> usize {
        self.as_data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn datatype(&self) -> PixelDatatype {
        self.as_data().datatype()
    }

    pub fn as_data(&self) -> TextureData<'_> {
        match self {
            Self::Unorm8(data) => TextureData::Unorm8(data),
            Self::Float16(data) => TextureData::Float16(data),
            Self::Float32(data) => TextureData::Float32(data),
        }
    }
}

/// The six faces of one cube map mip level, in `CubeFace::ALL` order.
#[derive(Clone, Debug, PartialEq)]
pub struct CubeMip {
    size: u32,
    faces: Vec<Texels>,
}

impl CubeMip {
    pub fn new(size: u32, faces: Vec<Texels>) -> Result<Self, LoadError> {
        if size == 0 {
            return Err(LoadError::InvalidSource("zero-sized cube face".into()));
        }

        if faces.len() != 6 {
            return Err(LoadError::InvalidSource(format!(
                "expected 6 cube faces, got {}",
                faces.len()
            )));
        }

        let expected = size as usize * size as usize * 4;

        for (face, texels) in CubeFace::ALL.iter().zip(&faces) {
            if texels.len() != expected {
                return Err(LoadError::InvalidSource(format!(
                    "{:?} face has {} channel values, expected {}",
                    face,
                    texels.len(),
                    expected
                )));
            }

            if texels.datatype() != faces[0].datatype() {
                return Err(LoadError::InvalidSource(
                    "cube faces have mixed datatypes".into(),
                ));
            }
        }

        Ok(Self { size, faces })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn faces(&self) -> &[Texels] {
        &self.faces
    }

    pub fn face(&self, face: CubeFace) -> &Texels {
        &self.faces[face.index()]
    }

    pub fn datatype(&self) -> PixelDatatype {
        self.faces[0].datatype()
    }
}

/// Decoded mip chain of a cube map, level 0 being the largest.
#[derive(Clone, Debug, PartialEq)]
pub struct CubeMipChain {
    levels: Vec<CubeMip>,
}

impl CubeMipChain {
    pub fn new(levels: Vec<CubeMip>) -> Result<Self, LoadError> {
        let first = match levels.first() {
            Some(first) => first,
            None => return Err(LoadError::InvalidSource("empty mip chain".into())),
        };

        for (level, mip) in levels.iter().enumerate() {
            let expected = first.size().checked_shr(level as u32).unwrap_or(0).max(1);

            if mip.size() != expected {
                return Err(LoadError::InvalidSource(format!(
                    "mip level {} is {}px, expected {}px",
                    level,
                    mip.size(),
                    expected
                )));
            }

            if mip.datatype() != first.datatype() {
                return Err(LoadError::InvalidSource(
                    "mip levels have mixed datatypes".into(),
                ));
            }
        }

        Ok(Self { levels })
    }

    pub fn face_size(&self) -> u32 {
        self.levels[0].size()
    }

    pub fn mip_count(&self) -> usize {
        self.levels.len()
    }

    pub fn datatype(&self) -> PixelDatatype {
        self.levels[0].datatype()
    }

    pub fn levels(&self) -> &[CubeMip] {
        &self.levels
    }

    pub fn into_levels(self) -> Vec<CubeMip> {
        self.levels
    }
}

pub type LoadResult = Result<CubeMipChain, LoadError>;

/// Fetches and decodes environment maps. The decoder itself lives outside
/// this crate; loaders only promise to eventually answer each request.
pub trait SourceLoader {
    fn load(&self, source: &SourceIdentity) -> LoadRequest;
}

impl<F: Fn(&SourceIdentity) -> LoadRequest> SourceLoader for F {
    fn load(&self, source: &SourceIdentity) -> LoadRequest {
        self(source)
    }
}

/// Receiving end of an in-flight load, polled once per update.
///
/// Dropping the request cancels it: the completer's result is discarded.
#[derive(Debug)]
pub struct LoadRequest {
    receiver: oneshot::Receiver<LoadResult>,
}

impl LoadRequest {
    /// Creates a request answered later through the returned completer.
    pub fn pending() -> (LoadCompleter, Self) {
        let (sender, receiver) = oneshot::channel();

        (LoadCompleter { sender }, Self { receiver })
    }

    /// Creates a request that is already answered.
    pub fn completed(result: LoadResult) -> Self {
        let (completer, request) = Self::pending();
        completer.complete(result);
        request
    }

    pub(crate) fn poll(&mut self) -> Poll<LoadResult> {
        match self.receiver.try_recv() {
            Ok(Some(result)) => Poll::Ready(result),
            Ok(None) => Poll::Pending,
            Err(oneshot::Canceled) => Poll::Ready(Err(LoadError::Canceled)),
        }
    }
}

#[derive(Debug)]
pub struct LoadCompleter {
    sender: oneshot::Sender<LoadResult>,
}

impl LoadCompleter {
    /// Answers the request. Returns `false` if it was canceled meanwhile.
    pub fn complete(self, result: LoadResult) -> bool {
        self.sender.send(result).is_ok()
    }

    pub fn is_canceled(&self) -> bool {
        self.sender.is_canceled()
    }
}
