//! Asynchronous framebuffer readback ring.
//!
//! Each render tick starts a copy of the framebuffer into the `write` slot
//! and maps the `read` slot issued on the previous tick, so the render
//! thread never waits on the GPU. Roles rotate write -> read -> spare ->
//! write. The first two ticks after a reset only prime the ring.

use crate::error::HudResult;

/// Number of readback slots.
pub const READBACK_SLOTS: usize = 3;

/// Ticks after a reset before the first map is attempted.
const PRIMING_TICKS: u32 = 2;

/// Row order of mapped readback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    TopDown,
    BottomUp,
}

/// A framebuffer that can be read back asynchronously into numbered slots.
pub trait PixelReadback {
    /// Readback size in pixels.
    fn readback_size(&self) -> (u32, u32);

    fn row_order(&self) -> RowOrder;

    /// Start copying the current framebuffer into `slot`.
    fn begin_readback(&mut self, slot: usize) -> HudResult<()>;

    /// Hand the rows of `slot` to `consume(data, bytes_per_row)` if the copy
    /// has completed. Returns `false` if the slot could not be mapped.
    fn map_readback(&mut self, slot: usize, consume: &mut dyn FnMut(&[u8], usize)) -> bool;
}

/// Copy `height` rows of `width` RGBA pixels out of a padded buffer,
/// flipping vertically if asked.
pub fn copy_rows(src: &[u8], stride: usize, width: u32, height: u32, flip: bool, dst: &mut Vec<u8>) -> bool {
    let row_size = width as usize * 4;
    let height = height as usize;
    if stride < row_size || src.len() < stride * height.saturating_sub(1) + row_size {
        return false;
    }
    dst.resize(row_size * height, 0);

    for (i, row) in dst.chunks_exact_mut(row_size).enumerate() {
        let src_row = if flip { height - 1 - i } else { i };
        let start = src_row * stride;
        row.copy_from_slice(&src[start..start + row_size]);
    }
    true
}

/// Rotating readback slots plus the last successfully mapped frame.
#[derive(Debug)]
pub struct ReadbackRing {
    write: usize,
    read: usize,
    spare: usize,
    primed: u32,
    frame: Vec<u8>,
    has_frame: bool,
    frames_mapped: u64,
    frames_reused: u64,
}

impl Default for ReadbackRing {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadbackRing {
    pub fn new() -> Self {
        Self {
            write: 0,
            read: 1,
            spare: 2,
            primed: 0,
            frame: Vec::new(),
            has_frame: false,
            frames_mapped: 0,
            frames_reused: 0,
        }
    }

    /// Forget all in-flight readbacks; the next two ticks prime again.
    pub fn reset(&mut self) {
        *self = Self {
            frame: std::mem::take(&mut self.frame),
            ..Self::new()
        };
    }

    pub fn is_primed(&self) -> bool {
        self.primed >= PRIMING_TICKS
    }

    /// Last mapped frame, tightly packed and top-down.
    pub fn latest(&self) -> Option<&[u8]> {
        self.has_frame.then_some(self.frame.as_slice())
    }

    pub fn frames_reused(&self) -> u64 {
        self.frames_reused
    }

    pub fn frames_mapped(&self) -> u64 {
        self.frames_mapped
    }

    /// Kick off this tick's readback and collect the previous one.
    ///
    /// Returns `Ok(None)` while priming. A failed map reuses the last good
    /// frame.
    pub fn tick(&mut self, source: &mut dyn PixelReadback) -> HudResult<Option<&[u8]>> {
        source.begin_readback(self.write)?;

        if !self.is_primed() {
            self.primed += 1;
            self.rotate();
            log::trace!("[READBACK] Priming ({}/{})", self.primed, PRIMING_TICKS);
            return Ok(None);
        }

        let (width, height) = source.readback_size();
        let flip = source.row_order() == RowOrder::BottomUp;
        let frame = &mut self.frame;
        let mut copied = false;
        let mapped = source.map_readback(self.read, &mut |data, stride| {
            copied = copy_rows(data, stride, width, height, flip, frame);
        });
        self.rotate();

        if mapped && copied {
            self.has_frame = true;
            self.frames_mapped += 1;
        } else {
            self.frames_reused += 1;
            log::debug!(
                "[READBACK] Map failed, reusing last frame ({} reused)",
                self.frames_reused
            );
        }
        Ok(self.latest())
    }

    fn rotate(&mut self) {
        let (write, read, spare) = (self.write, self.read, self.spare);
        self.read = write;
        self.spare = read;
        self.write = spare;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Slots hold whatever "frame number" was current when they began.
    struct FakeGpu {
        width: u32,
        height: u32,
        row_order: RowOrder,
        frame_number: u8,
        slots: [Option<u8>; READBACK_SLOTS],
        fail_next_map: bool,
        begun: Vec<usize>,
        mapped: Vec<usize>,
    }

    impl FakeGpu {
        fn new(row_order: RowOrder) -> Self {
            Self {
                width: 2,
                height: 2,
                row_order,
                frame_number: 0,
                slots: [None; READBACK_SLOTS],
                fail_next_map: false,
                begun: Vec::new(),
                mapped: Vec::new(),
            }
        }
    }

    impl PixelReadback for FakeGpu {
        fn readback_size(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn row_order(&self) -> RowOrder {
            self.row_order
        }

        fn begin_readback(&mut self, slot: usize) -> HudResult<()> {
            self.begun.push(slot);
            self.slots[slot] = Some(self.frame_number);
            Ok(())
        }

        fn map_readback(&mut self, slot: usize, consume: &mut dyn FnMut(&[u8], usize)) -> bool {
            self.mapped.push(slot);
            if std::mem::take(&mut self.fail_next_map) {
                return false;
            }
            let Some(n) = self.slots[slot] else { return false };
            // 256-byte padded rows; row 0 holds n, row 1 holds n + 100
            let stride = 256;
            let mut data = vec![0u8; stride * 2];
            data[..8].fill(n);
            data[stride..stride + 8].fill(n + 100);
            consume(&data, stride);
            true
        }
    }

    #[test]
    fn test_priming_then_one_tick_latency() {
        let mut gpu = FakeGpu::new(RowOrder::TopDown);
        let mut ring = ReadbackRing::new();

        gpu.frame_number = 1;
        assert!(ring.tick(&mut gpu).unwrap().is_none());
        gpu.frame_number = 2;
        assert!(ring.tick(&mut gpu).unwrap().is_none());
        assert!(gpu.mapped.is_empty());

        gpu.frame_number = 3;
        let frame = ring.tick(&mut gpu).unwrap().unwrap();
        assert_eq!(frame.len(), 16);
        assert_eq!(frame[0], 2);
        assert_eq!(frame[8], 102);
    }

    #[test]
    fn test_slot_roles_rotate() {
        let mut gpu = FakeGpu::new(RowOrder::TopDown);
        let mut ring = ReadbackRing::new();
        for _ in 0..5 {
            ring.tick(&mut gpu).unwrap();
        }
        assert_eq!(gpu.begun, [0, 2, 1, 0, 2]);
        // Each map reads the slot begun on the previous tick
        assert_eq!(gpu.mapped, [2, 1, 0]);
    }

    #[test]
    fn test_bottom_up_rows_are_flipped() {
        let mut gpu = FakeGpu::new(RowOrder::BottomUp);
        let mut ring = ReadbackRing::new();
        gpu.frame_number = 5;
        ring.tick(&mut gpu).unwrap();
        ring.tick(&mut gpu).unwrap();
        let frame = ring.tick(&mut gpu).unwrap().unwrap();
        assert_eq!(frame[0], 105);
        assert_eq!(frame[8], 5);
    }

    #[test]
    fn test_failed_map_reuses_last_frame() {
        let mut gpu = FakeGpu::new(RowOrder::TopDown);
        let mut ring = ReadbackRing::new();
        for n in 1..=3 {
            gpu.frame_number = n;
            ring.tick(&mut gpu).unwrap();
        }
        assert_eq!(ring.latest().unwrap()[0], 2);

        gpu.frame_number = 4;
        gpu.fail_next_map = true;
        let frame = ring.tick(&mut gpu).unwrap().unwrap();
        assert_eq!(frame[0], 2);
        assert_eq!(ring.frames_reused(), 1);
    }

    #[test]
    fn test_reset_primes_again() {
        let mut gpu = FakeGpu::new(RowOrder::TopDown);
        let mut ring = ReadbackRing::new();
        for _ in 0..3 {
            ring.tick(&mut gpu).unwrap();
        }
        ring.reset();
        assert!(!ring.is_primed());
        assert!(ring.latest().is_none());
        assert!(ring.tick(&mut gpu).unwrap().is_none());
    }

    #[test]
    fn test_copy_rows_rejects_short_buffer() {
        let mut dst = Vec::new();
        assert!(!copy_rows(&[0u8; 10], 8, 2, 2, false, &mut dst));
        assert!(copy_rows(&[0u8; 16], 8, 2, 2, false, &mut dst));
        assert_eq!(dst.len(), 16);
    }
}
