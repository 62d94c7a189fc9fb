use crate::SourceIdentity;
use thiserror::Error;

/// Error payload delivered through a projection's error event.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProjectionError {
    #[error("failed to load `{identity}': {reason}")]
    Load {
        identity: SourceIdentity,
        reason: LoadError,
    },

    #[error("failed to pack `{identity}': {reason}")]
    Packing {
        identity: SourceIdentity,
        reason: PackingError,
    },
}

impl ProjectionError {
    pub fn identity(&self) -> &SourceIdentity {
        match self {
            Self::Load { identity, .. } | Self::Packing { identity, .. } => identity,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum LoadError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("load request dropped without a result")]
    Canceled,

    #[error("invalid cube map: {0}")]
    InvalidSource(String),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum PackingError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("reprojection pass for level {level} failed: {reason}")]
    Pass { level: usize, reason: String },
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LayoutError {
    #[error("cube map face size must be non-zero")]
    ZeroFaceSize,

    #[error("cube map must have at least one mip level")]
    NoLevels,

    #[error("{mip_count} mip levels requested but a {face_size}px face supports at most {max}")]
    TooManyLevels {
        face_size: u32,
        mip_count: usize,
        max: usize,
    },

    #[error("mip level {level} does not fit in the atlas")]
    Overflow { level: usize },
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DeviceError {
    #[error("texture allocation failed: {0}")]
    Allocation(String),

    #[error("texture upload expected {expected} channel values, got {actual}")]
    UploadSize { expected: usize, actual: usize },
}
