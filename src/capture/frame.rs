//! Frame data structures for camera content handed over by the host

use image::{Rgb, RgbImage};
use std::sync::Arc;
use std::time::Instant;

/// Host-assigned, monotonically increasing frame identifier
pub type FrameId = u64;

/// Bytes needed for an RGBA image of the given size
pub fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

/// A frame submitted by the host
///
/// The pixel buffer is reference counted so that workers and classifiers
/// share it instead of copying.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame identifier
    pub id: FrameId,
    /// Raw RGBA pixel data
    pub data: Arc<[u8]>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Monotonic capture timestamp
    pub timestamp: Instant,
}

impl Frame {
    /// Create a new frame stamped with the current instant
    pub fn new(id: FrameId, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id,
            data: data.into(),
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// Create a frame filled with a single RGBA colour
    pub fn filled(id: FrameId, width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(rgba_len(width, height))
            .collect();
        Self::new(id, data, width, height)
    }

    /// Replace the capture timestamp
    pub fn with_timestamp(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// True when the buffer holds a full RGBA image of the stated size
    pub fn is_complete(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() >= rgba_len(self.width, self.height)
    }

    /// Nearest-neighbour RGB thumbnail whose longer side is at most `max_side`
    ///
    /// Samples the shared buffer directly, so the full frame is never copied.
    pub fn thumbnail(&self, max_side: u32) -> RgbImage {
        if !self.is_complete() || max_side == 0 {
            return RgbImage::new(0, 0);
        }

        let longest = self.width.max(self.height);
        let (tw, th) = if longest <= max_side {
            (self.width, self.height)
        } else {
            let scale = max_side as f32 / longest as f32;
            (
                ((self.width as f32 * scale) as u32).max(1),
                ((self.height as f32 * scale) as u32).max(1),
            )
        };

        RgbImage::from_fn(tw, th, |x, y| {
            let sx = (x as u64 * self.width as u64 / tw as u64) as usize;
            let sy = (y as u64 * self.height as u64 / th as u64) as usize;
            let idx = (sy * self.width as usize + sx) * 4;
            Rgb([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
        })
    }
}
