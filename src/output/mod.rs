//! Recording and streaming of the composited frame.
//!
//! ## Architecture
//!
//! ```text
//! render thread                              encode thread
//! -------------                              -------------
//! ReadbackRing::tick --> TripleWriter ==> TripleReader --> EncodeGraph
//!   (PixelReadback)        publish         take_latest     push_frame
//!                                                              |
//!                                          BackpressureGate <--+ need/enough data
//! ```
//!
//! - `mode`: output destination modes
//! - `readback`: asynchronous three-slot framebuffer readback
//! - `triple`: render-to-encode frame hand-off
//! - `backpressure`: encoder readiness gate
//! - `encoder_selection`: NVENC probe and x264 fallback
//! - `graph`: encode graph plans and the ffmpeg-backed graph
//! - `encoder`: the paced encode thread
//! - `watchdog`: recording growth check, alerts and announcements
//! - `manager`: ties the above together for the render thread

pub mod backpressure;
pub mod encoder;
pub mod encoder_selection;
pub mod graph;
pub mod manager;
pub mod mode;
pub mod readback;
pub mod triple;
pub mod watchdog;


pub use backpressure::BackpressureGate;
pub use encoder::{EncodeThread, EncoderResult};
pub use graph::{EncodeGraph, FfmpegGraphFactory, GraphFactory, GraphPlan, GraphStats};
pub use manager::{OutputPipelineManager, OutputStatus};
pub use mode::OutputMode;
pub use readback::{PixelReadback, ReadbackRing, RowOrder};
pub use triple::{triple_buffer, TripleReader, TripleWriter};
pub use watchdog::{AlertFlags, Announcer, FileGrowthWatchdog, LogAnnouncer};
