//! Frame Intake Layer
//!
//! The host owns the camera. This layer only defines the frame type the core
//! consumes and a file-backed source used to replay recorded sessions.

pub mod frame;
pub mod replay;

pub use frame::{Frame, FrameId};
pub use replay::{load_trace, ReplayFrame, ReplayTrace};

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::ScanResult;

/// Hands out monotonically increasing frame identifiers
#[derive(Debug, Default)]
pub struct FrameSequencer {
    next: AtomicU64,
}

impl FrameSequencer {
    /// Create a sequencer starting at frame 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next frame identifier
    pub fn next_id(&self) -> FrameId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Wrap RGBA pixel data into a frame with the next identifier
    pub fn frame(&self, data: Vec<u8>, width: u32, height: u32) -> Frame {
        Frame::new(self.next_id(), data, width, height)
    }
}

/// Load an image file as an RGBA frame
pub fn load_frame(path: &Path, id: FrameId) -> ScanResult<Frame> {
    let img = image::open(path)?.to_rgba8();
    let (width, height) = img.dimensions();
    debug!("Loaded frame {} from {:?} ({}x{})", id, path, width, height);
    Ok(Frame::new(id, img.into_raw(), width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_sequencer_is_monotonic() {
        let seq = FrameSequencer::new();
        let a = seq.next_id();
        let b = seq.next_id();
        let frame = seq.frame(vec![0; 16], 2, 2);
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(frame.id, 2);
    }

    #[test]
    fn test_load_frame_from_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        RgbaImage::from_pixel(6, 4, Rgba([9, 8, 7, 255]))
            .save(&path)
            .unwrap();

        let frame = load_frame(&path, 42).unwrap();
        assert_eq!(frame.id, 42);
        assert_eq!(frame.dimensions(), (6, 4));
        assert_eq!(&frame.data[0..4], &[9, 8, 7, 255]);
    }

    #[test]
    fn test_load_frame_missing_file() {
        assert!(load_frame(Path::new("/nonexistent/frame.png"), 0).is_err());
    }
}
