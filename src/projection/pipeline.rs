#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{
    atlas_layout, Allocator, AtlasDescriptor, Command, Context, CubeMip, CubeMipChain,
    DeviceCapabilities, Fence, FenceStatus, FrameState, LayoutError, LoadRequest, PackingError,
    PassKind, PixelDatatype, Program, ProjectionConfig, ProjectionData, ProjectionError,
    SourceIdentity, SourceLoader, Texture, TextureHandle,
};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::num::NonZeroUsize;
use std::rc::Rc;
use std::task::Poll;

/// Observable lifecycle of a reprojection pipeline.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PipelineState {
    Uninitialized,
    AwaitingSource,
    Packing,
    Ready,
    Failed,
}

/// Finished octahedral atlas shared by every projection of a source.
///
/// Immutable once published; the texture is released when the last
/// reference goes away.
#[derive(Debug)]
pub struct ProjectedAtlas {
    texture: Texture,
    descriptor: AtlasDescriptor,
}

impl ProjectedAtlas {
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn handle(&self) -> Option<TextureHandle> {
        self.texture.handle()
    }

    pub fn descriptor(&self) -> &AtlasDescriptor {
        &self.descriptor
    }

    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    pub fn maximum_mipmap_level(&self) -> usize {
        self.descriptor.maximum_mipmap_level()
    }

    pub fn datatype(&self) -> PixelDatatype {
        self.texture.datatype()
    }
}

#[derive(Debug)]
enum Stage {
    Uninitialized,
    AwaitingSource(LoadRequest),
    Packing(Box<Packing>),
    Ready(Rc<ProjectedAtlas>),
    Failed(ProjectionError),
}

/// Resources alive while the per-level passes are in flight.
#[derive(Debug)]
struct Packing {
    atlas: Texture,
    descriptor: AtlasDescriptor,
    pending: VecDeque<CubeMip>,
    next_level: usize,
    sources: Vec<Texture>,
    fences: Vec<Fence>,
    allocator: Allocator,
}

impl Packing {
    fn new(
        context: &Context,
        chain: CubeMipChain,
        config: &ProjectionConfig,
    ) -> Result<Self, PackingError> {
        let face_size = chain.face_size();
        let datatype = atlas_datatype(chain.datatype(), &context.capabilities());

        let mut levels = chain.into_levels();

        if let Some(max_mip_levels) = config.max_mip_levels {
            levels.truncate(max_mip_levels);
        }

        let descriptor = atlas_layout(face_size, levels.len())?;

        let mut atlas = Texture::new(context.clone());
        atlas.create(
            "projected atlas",
            descriptor.width,
            descriptor.height,
            datatype,
        )?;

        Ok(Self {
            atlas,
            descriptor,
            pending: levels.into(),
            next_level: 0,
            sources: vec![],
            fences: vec![],
            allocator: Allocator::new(),
        })
    }

    /// Uploads the next source level and records its reprojection pass.
    fn issue(&mut self, kind: PassKind, frame: &mut FrameState) -> Result<bool, PackingError> {
        let mip = match self.pending.pop_front() {
            Some(mip) => mip,
            None => return Ok(false),
        };

        let level = self.next_level;
        let datatype = self.atlas.datatype();

        let rect = self
            .descriptor
            .level(level)
            .ok_or(LayoutError::Overflow { level })?;

        let mut source = Texture::new(frame.context.clone());
        let data = self.allocator.stage_faces(mip.faces(), datatype);
        source.upload_cube("cube map level", mip.size(), data)?;

        let (source_handle, target_handle) = match (source.handle(), self.atlas.handle()) {
            (Some(source), Some(target)) => (source, target),
            _ => {
                return Err(PackingError::Pass {
                    level,
                    reason: "texture released before its pass was recorded".to_string(),
                })
            }
        };

        let (fence, signal) = Fence::new();

        frame.push(Command {
            kind,
            program: Program::OctahedralProjection,
            source: source_handle,
            target: target_handle,
            uniforms: ProjectionData {
                viewport: rect.to_array(),
                atlas_size: [self.descriptor.width, self.descriptor.height],
                mip_level: level as u32,
                normalized: datatype.is_normalized() as u32,
            },
            fence: Some(signal),
        });

        self.sources.push(source);
        self.fences.push(fence);
        self.next_level += 1;

        Ok(true)
    }

    fn failure(&self) -> Option<PackingError> {
        self.fences
            .iter()
            .enumerate()
            .find_map(|(level, fence)| match fence.status() {
                FenceStatus::Failed(reason) => Some(PackingError::Pass { level, reason }),
                _ => None,
            })
    }

    fn is_complete(&self) -> bool {
        self.pending.is_empty() && self.fences.iter().all(Fence::is_signaled)
    }
}

/// Chooses the atlas datatype for a source datatype on a given device.
pub fn atlas_datatype(source: PixelDatatype, capabilities: &DeviceCapabilities) -> PixelDatatype {
    match source {
        PixelDatatype::UnsignedByte => PixelDatatype::UnsignedByte,
        _ if capabilities.renders_half_float() => PixelDatatype::HalfFloat,
        _ => PixelDatatype::Float,
    }
}

/// Drives one source from load request to published atlas.
///
/// Each call to `update` advances the state machine by at most one step per
/// frame and never blocks: loads and GPU passes are polled.
pub(crate) struct ReprojectionPipeline {
    source: SourceIdentity,
    loader: Rc<dyn SourceLoader>,
    config: ProjectionConfig,
    stage: Stage,
    last_frame: Option<u64>,
}

impl ReprojectionPipeline {
    pub fn new(
        source: SourceIdentity,
        loader: Rc<dyn SourceLoader>,
        config: ProjectionConfig,
    ) -> Self {
        Self {
            source,
            loader,
            config,
            stage: Stage::Uninitialized,
            last_frame: None,
        }
    }

    /// A pipeline that starts out ready with an atlas built earlier.
    pub fn published(
        source: SourceIdentity,
        loader: Rc<dyn SourceLoader>,
        config: ProjectionConfig,
        atlas: Rc<ProjectedAtlas>,
    ) -> Self {
        Self {
            stage: Stage::Ready(atlas),
            ..Self::new(source, loader, config)
        }
    }

    pub fn state(&self) -> PipelineState {
        match self.stage {
            Stage::Uninitialized => PipelineState::Uninitialized,
            Stage::AwaitingSource(_) => PipelineState::AwaitingSource,
            Stage::Packing(_) => PipelineState::Packing,
            Stage::Ready(_) => PipelineState::Ready,
            Stage::Failed(_) => PipelineState::Failed,
        }
    }

    pub fn atlas(&self) -> Option<Rc<ProjectedAtlas>> {
        match &self.stage {
            Stage::Ready(atlas) => Some(atlas.clone()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ProjectionError> {
        match &self.stage {
            Stage::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn update(&mut self, frame: &mut FrameState) {
        if self.last_frame == Some(frame.frame_id()) {
            return; // already advanced by another projection this frame
        }

        self.last_frame = Some(frame.frame_id());

        let stage = mem::replace(&mut self.stage, Stage::Uninitialized);

        self.stage = match self.advance(stage, frame) {
            Ok(stage) => stage,
            Err(error) => {
                warn!("{}", error);
                Stage::Failed(error)
            }
        };
    }

    fn advance(&mut self, stage: Stage, frame: &mut FrameState) -> Result<Stage, ProjectionError> {
        match stage {
            Stage::Uninitialized => {
                debug!("requesting environment map `{}'", self.source);
                let request = self.loader.load(&self.source);

                self.await_source(request, frame)
            }
            Stage::AwaitingSource(request) => self.await_source(request, frame),
            Stage::Packing(packing) => self.pack(packing, frame),
            stage => Ok(stage),
        }
    }

    fn await_source(
        &mut self,
        mut request: LoadRequest,
        frame: &mut FrameState,
    ) -> Result<Stage, ProjectionError> {
        match request.poll() {
            Poll::Pending => Ok(Stage::AwaitingSource(request)),
            Poll::Ready(Err(reason)) => Err(ProjectionError::Load {
                identity: self.source.clone(),
                reason,
            }),
            Poll::Ready(Ok(chain)) => {
                let packing = Packing::new(&frame.context, chain, &self.config)
                    .map_err(|reason| self.packing_error(reason))?;

                debug!(
                    "packing `{}' into a {}x{} atlas with {} levels",
                    self.source,
                    packing.descriptor.width,
                    packing.descriptor.height,
                    packing.descriptor.mip_count()
                );

                self.pack(Box::new(packing), frame)
            }
        }
    }

    fn pack(
        &mut self,
        mut packing: Box<Packing>,
        frame: &mut FrameState,
    ) -> Result<Stage, ProjectionError> {
        let budget = self
            .config
            .passes_per_update
            .map_or(usize::MAX, NonZeroUsize::get);

        let kind = if self.config.prefer_compute && frame.context.capabilities().compute_shaders {
            PassKind::Compute
        } else {
            PassKind::Raster
        };

        for _ in 0..budget {
            let level = packing.next_level;

            if !packing
                .issue(kind, frame)
                .map_err(|reason| self.packing_error(reason))?
            {
                break;
            }

            debug!("enqueued {:?} pass for level {} of `{}'", kind, level, self.source);
        }

        packing.allocator.shrink_to_watermark();

        if let Some(reason) = packing.failure() {
            return Err(self.packing_error(reason));
        }

        if !packing.is_complete() {
            return Ok(Stage::Packing(packing));
        }

        let Packing {
            atlas, descriptor, ..
        } = *packing;

        let atlas = ProjectedAtlas {
            texture: atlas,
            descriptor,
        };

        info!(
            "projected `{}' into a {}x{} {:?} atlas",
            self.source,
            atlas.width(),
            atlas.height(),
            atlas.datatype()
        );

        Ok(Stage::Ready(Rc::new(atlas)))
    }

    fn packing_error(&self, reason: PackingError) -> ProjectionError {
        ProjectionError::Packing {
            identity: self.source.clone(),
            reason,
        }
    }
}

impl fmt::Debug for ReprojectionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReprojectionPipeline")
            .field("source", &self.source)
            .field("config", &self.config)
            .field("stage", &self.stage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Executor, LoadError, LoadResult, SoftwareDevice, Texels};
    use std::cell::RefCell;

    fn chain(face_size: u32, mip_count: usize) -> CubeMipChain {
        let levels = (0..mip_count)
            .map(|level| {
                let size = (face_size >> level).max(1);
                let face = Texels::Float32(vec![0.5; size as usize * size as usize * 4]);
                CubeMip::new(size, vec![face; 6]).unwrap()
            })
            .collect();

        CubeMipChain::new(levels).unwrap()
    }

    fn pipeline(result: LoadResult, config: ProjectionConfig) -> ReprojectionPipeline {
        let result = RefCell::new(Some(result));
        let loader = move |_: &SourceIdentity| {
            LoadRequest::completed(result.borrow_mut().take().expect("loaded twice"))
        };

        ReprojectionPipeline::new("test.ktx2".into(), Rc::new(loader), config)
    }

    fn run_frames(
        pipeline: &mut ReprojectionPipeline,
        device: &SoftwareDevice,
        frame: &mut FrameState,
        frames: usize,
    ) {
        for _ in 0..frames {
            pipeline.update(frame);
            device.execute(frame.finish());
        }
    }

    #[test]
    fn float_sources_prefer_half_float_atlases() {
        let webgl2 = DeviceCapabilities::webgl2();
        let float_only = DeviceCapabilities {
            half_float_texture: false,
            ..webgl2
        };

        assert_eq!(
            atlas_datatype(PixelDatatype::Float, &webgl2),
            PixelDatatype::HalfFloat
        );
        assert_eq!(
            atlas_datatype(PixelDatatype::HalfFloat, &float_only),
            PixelDatatype::Float
        );
        assert_eq!(
            atlas_datatype(PixelDatatype::UnsignedByte, &float_only),
            PixelDatatype::UnsignedByte
        );
    }

    #[test]
    fn ready_after_passes_execute() {
        let device = Rc::new(SoftwareDevice::new(DeviceCapabilities::webgl2()));
        let mut pipeline = pipeline(Ok(chain(16, 5)), ProjectionConfig::default());
        let mut frame = FrameState::new(device.clone());

        run_frames(&mut pipeline, &device, &mut frame, 1);
        assert_eq!(pipeline.state(), PipelineState::Packing);
        assert_eq!(device.executed_passes(), 5);

        run_frames(&mut pipeline, &device, &mut frame, 1);
        assert_eq!(pipeline.state(), PipelineState::Ready);

        let atlas = pipeline.atlas().unwrap();
        assert_eq!(atlas.maximum_mipmap_level(), 4);
        assert_eq!(device.live_textures(), 1);
    }

    #[test]
    fn updates_within_one_frame_advance_once() {
        let device = Rc::new(SoftwareDevice::new(DeviceCapabilities::webgl2()));
        let mut pipeline = pipeline(
            Ok(chain(16, 5)),
            ProjectionConfig {
                passes_per_update: NonZeroUsize::new(1),
                ..ProjectionConfig::default()
            },
        );

        let mut frame = FrameState::new(device.clone());
        pipeline.update(&mut frame);
        pipeline.update(&mut frame);

        assert_eq!(frame.commands.len(), 1);
    }

    #[test]
    fn mip_levels_can_be_capped() {
        let device = Rc::new(SoftwareDevice::new(DeviceCapabilities::webgl2()));
        let mut pipeline = pipeline(
            Ok(chain(16, 5)),
            ProjectionConfig {
                max_mip_levels: Some(2),
                ..ProjectionConfig::default()
            },
        );
        let mut frame = FrameState::new(device.clone());

        run_frames(&mut pipeline, &device, &mut frame, 2);

        assert_eq!(pipeline.atlas().unwrap().maximum_mipmap_level(), 1);
        assert_eq!(device.executed_passes(), 2);
    }

    #[test]
    fn load_failures_are_terminal() {
        let device = Rc::new(SoftwareDevice::new(DeviceCapabilities::webgl2()));
        let mut pipeline = pipeline(
            Err(LoadError::Fetch("404".to_string())),
            ProjectionConfig::default(),
        );
        let mut frame = FrameState::new(device.clone());

        run_frames(&mut pipeline, &device, &mut frame, 3);

        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(matches!(
            pipeline.error(),
            Some(ProjectionError::Load {
                reason: LoadError::Fetch(_),
                ..
            })
        ));
    }

    #[test]
    fn discarded_commands_fail_packing() {
        let device = Rc::new(SoftwareDevice::new(DeviceCapabilities::webgl2()));
        let mut pipeline = pipeline(Ok(chain(8, 2)), ProjectionConfig::default());

        let mut frame = FrameState::new(device.clone());
        pipeline.update(&mut frame);
        drop(frame.finish());
        pipeline.update(&mut frame);

        assert!(matches!(
            pipeline.error(),
            Some(ProjectionError::Packing {
                reason: PackingError::Pass { level: 0, .. },
                ..
            })
        ));
        assert_eq!(device.live_textures(), 0);
    }
}
