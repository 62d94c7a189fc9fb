use crate::{Command, Context};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(0);

fn next_frame_id() -> u64 {
    NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed)
}

/// Per-frame state handed to every `update` call.
///
/// Commands are recorded in submission order and handed to the executor
/// when the frame is finished. Every frame gets an identifier no other frame
/// shares, whether it comes from `new` or from `finish`.
#[derive(Debug)]
pub struct FrameState {
    pub context: Context,
    pub commands: Vec<Command>,
    frame_id: u64,
}

impl FrameState {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            commands: Vec::new(),
            frame_id: next_frame_id(),
        }
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Ends the current frame and returns its command list.
    pub fn finish(&mut self) -> Vec<Command> {
        self.frame_id = next_frame_id();
        std::mem::take(&mut self.commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeviceCapabilities, SoftwareDevice};
    use std::rc::Rc;

    #[test]
    fn frames_never_share_identifiers() {
        let device = Rc::new(SoftwareDevice::new(DeviceCapabilities::webgl2()));

        let mut frame = FrameState::new(device.clone());
        let other = FrameState::new(device.clone());
        let first = frame.frame_id();

        assert_ne!(first, other.frame_id());

        frame.finish();

        assert_ne!(frame.frame_id(), first);
        assert_ne!(frame.frame_id(), other.frame_id());
    }
}
