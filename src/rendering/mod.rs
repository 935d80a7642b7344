//! Stereo compositing.
//!
//! ## Components
//! - `coord`: pixel rectangles and the side-by-side eye layout
//! - `texture`: shared RGBA texture handles with transient alpha modulation
//! - `canvas`: the draw target trait and the CPU implementation
//! - `gpu`: the wgpu implementation with asynchronous readback
//! - `stereo`: per-eye clipping and projection of overlays and camera frames

pub mod canvas;
pub mod coord;
pub mod gpu;
pub mod stereo;
pub mod texture;

pub use canvas::{Canvas, SoftwareCanvas};
pub use coord::{Eye, EyeLayout, Rect};
pub use gpu::GpuCanvas;
pub use stereo::{clip_eye, clip_stereo, project_eye, project_stereo, EyeDraw, StereoClip};
pub use texture::{AlphaGuard, Texture, TextureCache};
