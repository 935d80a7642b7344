//! Triple-buffered frame hand-off from the render thread to the encode
//! thread.
//!
//! Three byte buffers rotate between the writer, a shared "ready" slot and
//! the reader. The writer fills its own buffer with no lock held and
//! publishes by swapping it with the ready slot under the mutex; the
//! reader takes the ready slot the same way. Neither side can ever touch
//! the buffer the other is using.

use std::sync::Arc;

use parking_lot::Mutex;

struct Shared {
    ready: Vec<u8>,
    fresh: bool,
    published: u64,
}

/// Create a connected writer/reader pair.
pub fn triple_buffer() -> (TripleWriter, TripleReader) {
    let shared = Arc::new(Mutex::new(Shared {
        ready: Vec::new(),
        fresh: false,
        published: 0,
    }));
    (
        TripleWriter {
            shared: Arc::clone(&shared),
            slot: Vec::new(),
        },
        TripleReader {
            shared,
            slot: Vec::new(),
            sequence: 0,
        },
    )
}

/// Render-thread half.
pub struct TripleWriter {
    shared: Arc<Mutex<Shared>>,
    slot: Vec<u8>,
}

impl TripleWriter {
    /// Buffer to fill for the next publish, resized to `len`.
    pub fn write_slot(&mut self, len: usize) -> &mut Vec<u8> {
        self.slot.resize(len, 0);
        &mut self.slot
    }

    /// Make the write slot the newest frame. An unread older frame is
    /// replaced, never queued.
    pub fn publish(&mut self) {
        let mut shared = self.shared.lock();
        std::mem::swap(&mut shared.ready, &mut self.slot);
        shared.fresh = true;
        shared.published += 1;
    }

    /// Copy `frame` into the write slot and publish it.
    pub fn publish_from(&mut self, frame: &[u8]) {
        self.write_slot(frame.len()).copy_from_slice(frame);
        self.publish();
    }
}

/// Encode-thread half.
pub struct TripleReader {
    shared: Arc<Mutex<Shared>>,
    slot: Vec<u8>,
    sequence: u64,
}

impl TripleReader {
    /// Swap in the newest frame if one was published since the last take.
    pub fn take_latest(&mut self) -> Option<&[u8]> {
        {
            let mut shared = self.shared.lock();
            if !shared.fresh {
                return None;
            }
            std::mem::swap(&mut shared.ready, &mut self.slot);
            shared.fresh = false;
            self.sequence = shared.published;
        }
        Some(&self.slot)
    }

    /// Last frame taken, empty before the first.
    pub fn current(&self) -> &[u8] {
        &self.slot
    }

    /// Publish count at the time of the last take.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn has_fresh(&self) -> bool {
        self.shared.lock().fresh
    }
}
