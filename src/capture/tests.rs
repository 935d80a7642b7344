//! Scenario tests for the frame synchronizer.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::*;
use crate::error::HudError;
use crate::shutdown::ShutdownFlag;

/// Source that replays a fixed script and records how often it was pulled.
struct ScriptedSource {
    name: String,
    script: VecDeque<Script>,
    pulls: Arc<Mutex<u32>>,
    next_id: u64,
}

enum Script {
    Frame(u64),
    Empty,
    Eos,
}

impl ScriptedSource {
    fn new(name: &str, script: Vec<Script>) -> (Self, Arc<Mutex<u32>>) {
        let pulls = Arc::new(Mutex::new(0));
        (
            Self {
                name: name.to_string(),
                script: script.into(),
                pulls: Arc::clone(&pulls),
                next_id: 0,
            },
            pulls,
        )
    }

    fn frames(name: &str, ms: &[u64]) -> (Self, Arc<Mutex<u32>>) {
        Self::new(name, ms.iter().map(|m| Script::Frame(*m)).collect())
    }
}

impl CameraSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn pull_sample(&mut self) -> SampleResult {
        *self.pulls.lock() += 1;
        match self.script.pop_front() {
            Some(Script::Frame(ms)) => {
                let id = self.next_id;
                self.next_id += 1;
                SampleResult::Frame(CameraFrame::new(
                    vec![0; 4],
                    1,
                    1,
                    Duration::from_millis(ms),
                    id,
                ))
            },
            Some(Script::Empty) => SampleResult::Empty,
            Some(Script::Eos) | None => SampleResult::EndOfStream,
        }
    }
}

fn synchronizer(
    left: ScriptedSource,
    right: Option<ScriptedSource>,
    shutdown: ShutdownFlag,
) -> (FrameSynchronizer, Arc<DoubleBufferSlot<FramePair>>) {
    let slot = Arc::new(DoubleBufferSlot::new());
    let sync = FrameSynchronizer::new(
        Box::new(left),
        right.map(|r| Box::new(r) as Box<dyn CameraSource>),
        Arc::clone(&slot),
        Duration::from_millis(33),
        8,
        shutdown,
    );
    (sync, slot)
}

#[test]
fn test_lagging_camera_is_repulled() {
    // A at 1000ms, B at 1050ms: A is behind and must be re-pulled
    let (left, left_pulls) = ScriptedSource::frames("A", &[1000, 1033, 1049]);
    let (right, right_pulls) = ScriptedSource::frames("B", &[1050]);
    let (mut sync, slot) = synchronizer(left, Some(right), ShutdownFlag::new());

    assert_eq!(sync.step().unwrap(), StepOutcome::Published);
    assert!(*left_pulls.lock() >= 2);
    assert_eq!(*right_pulls.lock(), 1);

    let (pair, fresh) = slot.latest().unwrap();
    assert!(fresh);
    assert!(pair.skew() <= Duration::from_millis(33));
    assert_eq!(pair.left.pts, Duration::from_millis(1033));
    assert_eq!(sync.stats().catchup_pulls, 1);
}

#[test]
fn test_gap_equal_to_frame_duration_is_aligned() {
    let (left, _) = ScriptedSource::frames("A", &[100]);
    let (right, right_pulls) = ScriptedSource::frames("B", &[133]);
    let (mut sync, slot) = synchronizer(left, Some(right), ShutdownFlag::new());

    assert_eq!(sync.step().unwrap(), StepOutcome::Published);
    assert_eq!(*right_pulls.lock(), 1);
    assert_eq!(slot.latest().unwrap().0.skew(), Duration::from_millis(33));
}

#[test]
fn test_right_behind_is_repulled() {
    let (left, left_pulls) = ScriptedSource::frames("A", &[500]);
    let (right, right_pulls) = ScriptedSource::frames("B", &[400, 440, 480]);
    let (mut sync, slot) = synchronizer(left, Some(right), ShutdownFlag::new());

    assert_eq!(sync.step().unwrap(), StepOutcome::Published);
    assert_eq!(*left_pulls.lock(), 1);
    assert_eq!(*right_pulls.lock(), 3);
    assert_eq!(slot.latest().unwrap().0.right.pts, Duration::from_millis(480));
}

#[test]
fn test_catchup_is_bounded() {
    // B is stuck far in the future; A can never close the gap
    let a_frames: Vec<u64> = (0..20).map(|i| i * 10).collect();
    let (left, _) = ScriptedSource::frames("A", &a_frames);
    let (right, _) = ScriptedSource::frames("B", &[10_000]);
    let (mut sync, slot) = synchronizer(left, Some(right), ShutdownFlag::new());

    assert_eq!(sync.step().unwrap(), StepOutcome::Dropped);
    assert!(slot.latest().is_none());
    assert_eq!(sync.stats().pairs_dropped, 1);
    assert_eq!(sync.stats().catchup_pulls, 8);
}

#[test]
fn test_single_camera_reuses_frame() {
    let (left, _) = ScriptedSource::frames("mono", &[5]);
    let (mut sync, slot) = synchronizer(left, None, ShutdownFlag::new());

    assert_eq!(sync.step().unwrap(), StepOutcome::Published);
    let (pair, _) = slot.latest().unwrap();
    assert!(pair.is_mono());
    assert_eq!(pair.skew(), Duration::ZERO);
}

#[test]
fn test_empty_samples_are_retried() {
    let (left, left_pulls) = ScriptedSource::new(
        "A",
        vec![Script::Empty, Script::Empty, Script::Frame(10)],
    );
    let (right, _) = ScriptedSource::frames("B", &[12]);
    let (mut sync, _slot) = synchronizer(left, Some(right), ShutdownFlag::new());

    assert_eq!(sync.step().unwrap(), StepOutcome::Published);
    assert_eq!(*left_pulls.lock(), 3);
    assert_eq!(sync.stats().empty_samples, 2);
}

#[test]
fn test_end_of_stream_requests_shutdown() {
    let (left, _) = ScriptedSource::frames("A", &[0, 33]);
    let (right, _) = ScriptedSource::new("B", vec![Script::Frame(0), Script::Eos]);
    let shutdown = ShutdownFlag::new();
    let (mut sync, _slot) = synchronizer(left, Some(right), shutdown.clone());

    assert_eq!(sync.step().unwrap(), StepOutcome::Published);
    match sync.step() {
        Err(HudError::CameraEndOfStream { camera }) => assert_eq!(camera, "B"),
        other => panic!("expected end of stream, got {:?}", other),
    }

    let stats = sync.run();
    assert!(shutdown.is_requested());
    assert!(stats.error.is_some());
}

#[test]
fn test_shutdown_stops_retry_loop() {
    let script = (0..1000).map(|_| Script::Empty).collect();
    let (left, _) = ScriptedSource::new("A", script);
    let shutdown = ShutdownFlag::new();
    shutdown.request("test");
    let (mut sync, slot) = synchronizer(left, None, shutdown);

    assert_eq!(sync.step().unwrap(), StepOutcome::Stopped);
    assert!(slot.latest().is_none());
}

#[test]
fn test_capture_thread_publishes_until_end() {
    let frames: Vec<u64> = (0..50).map(|i| i * 16).collect();
    let (left, _) = ScriptedSource::frames("A", &frames);
    let (right, _) = ScriptedSource::frames("B", &frames);
    let shutdown = ShutdownFlag::new();
    let (sync, slot) = synchronizer(left, Some(right), shutdown.clone());

    let stats = sync.spawn().unwrap().join().unwrap();
    assert_eq!(stats.pairs_published, 50);
    assert!(shutdown.is_requested());
    assert_eq!(slot.generation(), 50);
}
