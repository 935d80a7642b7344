//! Lock-guarded double buffer for handing frames to the render thread.
//!
//! The writer fills the slot that is not currently readable and flips the
//! read index under the mutex. Readers never block on new data: they get
//! the most recently published value and a flag saying whether it is new
//! since their last read.

use std::sync::Arc;

use parking_lot::Mutex;

struct SlotState<T> {
    buffers: [Option<Arc<T>>; 2],
    read_index: usize,
    ready: bool,
    generation: u64,
}

/// Two-slot publish/read cell.
pub struct DoubleBufferSlot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T> Default for DoubleBufferSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DoubleBufferSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                buffers: [None, None],
                read_index: 0,
                ready: false,
                generation: 0,
            }),
        }
    }

    /// Publish a new value and make it the readable one.
    ///
    /// The value previously occupying the write slot is released after the
    /// lock is dropped; readers still holding it keep it alive.
    pub fn publish(&self, value: T) {
        let stale = {
            let mut state = self.state.lock();
            let write_index = 1 - state.read_index;
            let stale = state.buffers[write_index].replace(Arc::new(value));
            state.read_index = write_index;
            state.ready = true;
            state.generation += 1;
            stale
        };
        drop(stale);
    }

    /// Latest published value and whether it is new since the last call.
    ///
    /// Returns `None` until the first publish.
    pub fn latest(&self) -> Option<(Arc<T>, bool)> {
        let mut state = self.state.lock();
        let fresh = std::mem::replace(&mut state.ready, false);
        let index = state.read_index;
        state.buffers[index].clone().map(|value| (value, fresh))
    }

    /// Latest value only if it has not been seen yet.
    pub fn take_new(&self) -> Option<Arc<T>> {
        match self.latest() {
            Some((value, true)) => Some(value),
            _ => None,
        }
    }

    /// Whether a publish happened since the last read.
    pub fn has_new(&self) -> bool {
        self.state.lock().ready
    }

    /// Total number of publishes.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_slot() {
        let slot: DoubleBufferSlot<u32> = DoubleBufferSlot::new();
        assert!(slot.latest().is_none());
        assert!(!slot.has_new());
    }

    #[test]
    fn test_publish_then_read() {
        let slot = DoubleBufferSlot::new();
        slot.publish(7u32);
        assert!(slot.has_new());

        let (value, fresh) = slot.latest().unwrap();
        assert_eq!(*value, 7);
        assert!(fresh);
        assert!(!slot.has_new());
    }

    #[test]
    fn test_repeated_reads_return_same_object() {
        let slot = DoubleBufferSlot::new();
        slot.publish(String::from("frame"));

        let (first, _) = slot.latest().unwrap();
        for _ in 0..10 {
            let (again, fresh) = slot.latest().unwrap();
            assert!(!fresh);
            assert!(Arc::ptr_eq(&first, &again));
        }
        assert!(slot.take_new().is_none());
    }

    #[test]
    fn test_reader_keeps_old_frame_alive() {
        let slot = DoubleBufferSlot::new();
        slot.publish(vec![1u8; 4]);
        let (held, _) = slot.latest().unwrap();

        slot.publish(vec![2u8; 4]);
        slot.publish(vec![3u8; 4]);

        assert_eq!(*held, vec![1u8; 4]);
        assert_eq!(Arc::strong_count(&held), 1);
        let (latest, fresh) = slot.latest().unwrap();
        assert!(fresh);
        assert_eq!(*latest, vec![3u8; 4]);
        assert_eq!(slot.generation(), 3);
    }

    #[test]
    fn test_concurrent_publish_and_read() {
        let slot = Arc::new(DoubleBufferSlot::new());
        let writer = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                for i in 0..2000u64 {
                    slot.publish([i, i, i, i]);
                }
            })
        };

        let mut last = 0u64;
        for _ in 0..2000 {
            if let Some((value, _)) = slot.latest() {
                // No tearing: all lanes were written together
                assert!(value.iter().all(|v| *v == value[0]));
                assert!(value[0] >= last);
                last = value[0];
            }
        }
        writer.join().unwrap();
        assert_eq!(slot.generation(), 2000);
    }
}
