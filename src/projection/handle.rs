#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{
    DeviceCapabilities, ErrorEvent, FrameState, PipelineState, ProjectedAtlas, ProjectionCache,
    SharedEntry, SourceIdentity,
};
use std::rc::Rc;

/// Octahedral projection of one environment map, as seen by one call site.
///
/// Projections of the same source made through the same cache share a
/// single load and a single atlas. Call `update` once per frame until
/// `ready` returns true; failures are reported through `error_event`.
#[derive(Debug)]
pub struct Projection {
    source: SourceIdentity,
    cache: ProjectionCache,
    entry: Option<SharedEntry>,
    error_event: ErrorEvent,
    error_delivered: bool,
}

impl Projection {
    /// Starts projecting a source. Does not block or touch the device.
    pub fn new(source: impl Into<SourceIdentity>, cache: &ProjectionCache) -> Self {
        let source = source.into();
        let entry = cache.acquire(&source);

        Self {
            source,
            cache: cache.clone(),
            entry: Some(entry),
            error_event: ErrorEvent::new(),
            error_delivered: false,
        }
    }

    /// Whether a device can host projected atlases at all: it needs a
    /// float-capable render target, cube map sampling and mip generation.
    pub fn is_supported(capabilities: &DeviceCapabilities) -> bool {
        (capabilities.renders_half_float() || capabilities.renders_float())
            && capabilities.cube_map_sampling
            && capabilities.mipmap_generation
    }

    /// Advances the shared pipeline and records any GPU passes it needs into
    /// the frame's command list.
    pub fn update(&mut self, frame: &mut FrameState) {
        let entry = match &self.entry {
            Some(entry) => entry.clone(),
            None => return,
        };

        if !Self::is_supported(&frame.context.capabilities()) {
            debug!("skipping projection of `{}': device unsupported", self.source);
            return;
        }

        let error = {
            let mut entry = entry.borrow_mut();
            entry.pipeline.update(frame);
            entry.pipeline.error().cloned()
        };

        if let Some(error) = error {
            if !self.error_delivered {
                self.error_delivered = true;
                self.error_event.raise(&error);
            }
        }
    }

    pub fn ready(&self) -> bool {
        self.state() == Some(PipelineState::Ready)
    }

    /// The shared atlas, once ready.
    ///
    /// A held atlas outlives `destroy`. If every projection of the source is
    /// destroyed while it is held, the next projection of that source through
    /// the same cache starts out ready with this same atlas.
    pub fn texture(&self) -> Option<Rc<ProjectedAtlas>> {
        self.entry.as_ref()?.borrow().pipeline.atlas()
    }

    pub fn maximum_mipmap_level(&self) -> Option<usize> {
        Some(self.texture()?.maximum_mipmap_level())
    }

    /// State of the shared pipeline, or `None` once destroyed.
    pub fn state(&self) -> Option<PipelineState> {
        Some(self.entry.as_ref()?.borrow().pipeline.state())
    }

    pub fn error_event(&self) -> &ErrorEvent {
        &self.error_event
    }

    pub fn source(&self) -> &SourceIdentity {
        &self.source
    }

    pub fn is_destroyed(&self) -> bool {
        self.entry.is_none()
    }

    /// Releases this projection's share of the cache entry. Safe to call
    /// repeatedly and in any state; an in-flight load is canceled when no
    /// other projection still needs it.
    pub fn destroy(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.cache.release(&self.source, entry);
        }
    }
}

impl Drop for Projection {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn support_requires_a_float_render_target() {
        assert!(Projection::is_supported(&DeviceCapabilities::webgl2()));
        assert!(!Projection::is_supported(&DeviceCapabilities::default()));

        let half_only = DeviceCapabilities {
            half_float_texture: true,
            color_buffer_half_float: true,
            cube_map_sampling: true,
            mipmap_generation: true,
            ..DeviceCapabilities::default()
        };

        assert!(Projection::is_supported(&half_only));

        let no_float_targets = DeviceCapabilities {
            color_buffer_half_float: false,
            color_buffer_float: false,
            ..DeviceCapabilities::webgl2()
        };

        assert!(!Projection::is_supported(&no_float_targets));
    }

    #[test]
    fn support_requires_cube_sampling_and_mip_generation() {
        let no_cube_maps = DeviceCapabilities {
            cube_map_sampling: false,
            ..DeviceCapabilities::webgl2()
        };

        let no_mipmaps = DeviceCapabilities {
            mipmap_generation: false,
            ..DeviceCapabilities::webgl2()
        };

        assert!(!Projection::is_supported(&no_cube_maps));
        assert!(!Projection::is_supported(&no_mipmaps));
    }
}
