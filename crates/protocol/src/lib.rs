use std::time::{Duration, Instant};

use patches::{PartitionStrategy, Patch, PatchTable};
use thiserror::Error;

/// Bytes per pixel in a [`PixelBuffer`]; channel order is blue, green, red.
pub const BYTES_PER_PIXEL: usize = 3;

/// One pixel in buffer channel order.
pub type Bgr = [u8; BYTES_PER_PIXEL];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderJob {
    pub frame_index: usize,
    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u32,
    pub strategy: PartitionStrategy,
    pub sub_strategy: PartitionStrategy,
}

impl RenderJob {
    pub fn region(&self) -> Patch {
        Patch::full(self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("buffer is {found_width}x{found_height}, expected {width}x{height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        found_width: u32,
        found_height: u32,
    },
    #[error("patch {patch} does not fit a {width}x{height} buffer")]
    PatchOutOfBounds { patch: Patch, width: u32, height: u32 },
    #[error("pixel ({x}, {y}) is outside patch {patch}")]
    PixelOutsidePatch { x: u32, y: u32, patch: Patch },
    #[error("patch {patch} needs {expected} bytes, got {found}")]
    TileSizeMismatch {
        patch: Patch,
        expected: usize,
        found: usize,
    },
}

/// Full-frame image in bottom-up row order, zero-initialised.
///
/// Pixels are only ever written by blitting a [`PatchPixels`] tile, so a
/// unit can touch nothing outside the patch it rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bytes: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn region(&self) -> Patch {
        Patch::full(self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Bgr> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = self.offset(x, y);
        let mut pixel = [0; BYTES_PER_PIXEL];
        pixel.copy_from_slice(&self.bytes[offset..offset + BYTES_PER_PIXEL]);
        Some(pixel)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL
    }

    /// Copies a rendered tile into its patch, leaving every other byte untouched.
    pub fn blit(&mut self, tile: &PatchPixels) -> Result<(), BufferError> {
        let patch = tile.patch;
        if !self.region().contains_patch(&patch) {
            return Err(BufferError::PatchOutOfBounds {
                patch,
                width: self.width,
                height: self.height,
            });
        }
        let span = patch.width() as usize * BYTES_PER_PIXEL;
        if span == 0 {
            return Ok(());
        }
        for (row, source) in tile.bytes.chunks_exact(span).enumerate() {
            let start = self.offset(patch.px, patch.py + row as u32);
            self.bytes[start..start + span].copy_from_slice(source);
        }
        Ok(())
    }

    /// Elementwise byte sum with `u8` wraparound.
    pub fn wrapping_accumulate(&mut self, other: &PixelBuffer) -> Result<(), BufferError> {
        if self.width != other.width || self.height != other.height {
            return Err(BufferError::DimensionMismatch {
                width: self.width,
                height: self.height,
                found_width: other.width,
                found_height: other.height,
            });
        }
        for (into, from) in self.bytes.iter_mut().zip(&other.bytes) {
            *into = into.wrapping_add(*from);
        }
        Ok(())
    }
}

/// Compact pixels of one patch, rows bottom-up like [`PixelBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPixels {
    patch: Patch,
    bytes: Vec<u8>,
}

impl PatchPixels {
    pub fn new(patch: Patch) -> Self {
        Self {
            patch,
            bytes: vec![0; patch.area() as usize * BYTES_PER_PIXEL],
        }
    }

    pub fn from_bytes(patch: Patch, bytes: Vec<u8>) -> Result<Self, BufferError> {
        let expected = patch.area() as usize * BYTES_PER_PIXEL;
        if bytes.len() != expected {
            return Err(BufferError::TileSizeMismatch {
                patch,
                expected,
                found: bytes.len(),
            });
        }
        Ok(Self { patch, bytes })
    }

    pub fn patch(&self) -> Patch {
        self.patch
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Writes a pixel given in global raster coordinates.
    pub fn set(&mut self, x: u32, y: u32, pixel: Bgr) -> Result<(), BufferError> {
        if !self.patch.contains(x, y) {
            return Err(BufferError::PixelOutsidePatch {
                x,
                y,
                patch: self.patch,
            });
        }
        let local = (y - self.patch.py) as usize * self.patch.width() as usize
            + (x - self.patch.px) as usize;
        let offset = local * BYTES_PER_PIXEL;
        self.bytes[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&pixel);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    pub frame_index: usize,
    pub started_at: Instant,
    pub finished_at: Instant,
}

impl FrameTiming {
    pub fn duration(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }

    pub fn report(&self) -> TimingReport {
        TimingReport {
            frame_index: self.frame_index,
            duration: self.duration(),
        }
    }
}

/// What a frame leader transmits to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingReport {
    pub frame_index: usize,
    pub duration: Duration,
}

/// Everything exchanged between ranks of a render run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderMessage {
    Patches(PatchTable),
    Buffer(PixelBuffer),
    Timing(TimingReport),
}

macro_rules! render_message_payload {
    ($variant:ident, $payload:ty) => {
        impl From<$payload> for RenderMessage {
            fn from(payload: $payload) -> Self {
                RenderMessage::$variant(payload)
            }
        }

        impl TryFrom<RenderMessage> for $payload {
            type Error = RenderMessage;

            fn try_from(message: RenderMessage) -> Result<Self, Self::Error> {
                match message {
                    RenderMessage::$variant(payload) => Ok(payload),
                    other => Err(other),
                }
            }
        }
    };
}

render_message_payload!(Patches, PatchTable);
render_message_payload!(Buffer, PixelBuffer);
render_message_payload!(Timing, TimingReport);
