use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::num::NonZeroUsize;

/// Settings shared by every pipeline a projection cache creates.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, SmartDefault, Serialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Projects at most this many source mip levels, all of them if unset.
    #[default(None)]
    pub max_mip_levels: Option<usize>,

    /// Reprojection passes issued per update, all remaining ones if unset.
    #[default(None)]
    pub passes_per_update: Option<NonZeroUsize>,

    #[default(true)]
    pub prefer_compute: bool,
}
