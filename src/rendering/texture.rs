//! CPU-side texture handles.
//!
//! A [`Texture`] is a cheap, cloneable handle to immutable RGBA pixels plus
//! a mutable alpha modulation value shared by every clone. Canvas backends
//! upload or sample the pixels; GPU backends key their caches by
//! `(id, version)`.
//!
//! Alpha modulation is transient per draw. [`Texture::alpha_scope`] returns
//! a guard that restores full opacity when dropped, so an early return in a
//! render path can never leave a texture dimmed for the next frame.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::capture::CameraFrame;
use crate::error::HudResult;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique texture id.
pub fn next_texture_id() -> u64 {
    NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed)
}

struct TextureInner {
    id: u64,
    version: u64,
    width: u32,
    height: u32,
    stride: u32,
    pixels: Arc<Vec<u8>>,
    alpha_mod: AtomicU8,
    label: String,
}

/// Shared RGBA texture handle.
#[derive(Clone)]
pub struct Texture {
    inner: Arc<TextureInner>,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("size", &(self.inner.width, self.inner.height))
            .finish()
    }
}

impl Texture {
    /// Wrap tightly packed RGBA pixels.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>, label: &str) -> Self {
        Self::from_shared(next_texture_id(), 0, width, height, width * 4, Arc::new(pixels), label)
    }

    /// Wrap pixels that are already shared elsewhere (camera frames).
    pub fn from_shared(
        id: u64,
        version: u64,
        width: u32,
        height: u32,
        stride: u32,
        pixels: Arc<Vec<u8>>,
        label: &str,
    ) -> Self {
        Self {
            inner: Arc::new(TextureInner {
                id,
                version,
                width,
                height,
                stride,
                pixels,
                alpha_mod: AtomicU8::new(255),
                label: label.to_string(),
            }),
        }
    }

    /// View a camera frame as a texture without copying.
    ///
    /// `stream_id` stays constant for one camera so GPU backends can reuse
    /// the same device texture; the frame id becomes the version.
    pub fn from_frame(stream_id: u64, frame: &CameraFrame) -> Self {
        Self::from_shared(
            stream_id,
            frame.frame_id,
            frame.width,
            frame.height,
            frame.stride,
            Arc::clone(&frame.data),
            "camera",
        )
    }

    /// Load a PNG (or any format `image` decodes) from disk.
    pub fn load(path: &Path) -> HudResult<Self> {
        let img = image::open(path)?.to_rgba8();
        let (width, height) = img.dimensions();
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self::from_rgba(width, height, img.into_raw(), &label))
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn version(&self) -> u64 {
        self.inner.version
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// Bytes per row.
    pub fn stride(&self) -> u32 {
        self.inner.stride
    }

    pub fn pixels(&self) -> &[u8] {
        &self.inner.pixels
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Current alpha modulation (255 = opaque).
    pub fn alpha_mod(&self) -> u8 {
        self.inner.alpha_mod.load(Ordering::Relaxed)
    }

    pub fn set_alpha_mod(&self, alpha: u8) {
        self.inner.alpha_mod.store(alpha, Ordering::Relaxed);
    }

    /// Apply `alpha` until the returned guard is dropped.
    pub fn alpha_scope(&self, alpha: u8) -> AlphaGuard<'_> {
        self.set_alpha_mod(alpha);
        AlphaGuard { texture: self }
    }

    /// Two handles share the same pixel storage.
    pub fn ptr_eq(&self, other: &Texture) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Restores a texture's alpha modulation to opaque on drop.
pub struct AlphaGuard<'a> {
    texture: &'a Texture,
}

impl Drop for AlphaGuard<'_> {
    fn drop(&mut self) {
        self.texture.set_alpha_mod(255);
    }
}

/// Path-keyed texture cache used while building a layout.
///
/// Elements that reference the same file share one texture.
#[derive(Default)]
pub struct TextureCache {
    root: Option<PathBuf>,
    textures: HashMap<PathBuf, Texture>,
}

impl TextureCache {
    /// Resolve relative paths against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            textures: HashMap::new(),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Load a texture, reusing a previous load of the same file.
    pub fn load(&mut self, path: &Path) -> HudResult<Texture> {
        let resolved = self.resolve(path);
        if let Some(texture) = self.textures.get(&resolved) {
            return Ok(texture.clone());
        }
        let texture = Texture::load(&resolved)?;
        log::debug!(
            "[TEXTURE] Loaded {} ({}x{})",
            resolved.display(),
            texture.width(),
            texture.height()
        );
        self.textures.insert(resolved, texture.clone());
        Ok(texture)
    }

    /// Insert an already decoded texture under a path key.
    pub fn insert(&mut self, path: &Path, texture: Texture) {
        let resolved = self.resolve(path);
        self.textures.insert(resolved, texture);
    }

    /// Every texture loaded so far.
    pub fn textures(&self) -> impl Iterator<Item = &Texture> {
        self.textures.values()
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_guard_restores_opacity() {
        let tex = Texture::from_rgba(1, 1, vec![255; 4], "dot");
        {
            let _guard = tex.alpha_scope(64);
            assert_eq!(tex.alpha_mod(), 64);
        }
        assert_eq!(tex.alpha_mod(), 255);
    }

    #[test]
    fn test_alpha_shared_between_clones() {
        let tex = Texture::from_rgba(1, 1, vec![255; 4], "dot");
        let clone = tex.clone();
        tex.set_alpha_mod(10);
        assert_eq!(clone.alpha_mod(), 10);
        assert!(tex.ptr_eq(&clone));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Texture::from_rgba(1, 1, vec![0; 4], "a");
        let b = Texture::from_rgba(1, 1, vec![0; 4], "b");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.stride(), 4);
    }

    #[test]
    fn test_cache_loads_png_once() {
        let dir = std::env::temp_dir().join(format!("stereohud-tex-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dot.png");
        image::RgbaImage::from_pixel(2, 3, image::Rgba([1, 2, 3, 4]))
            .save(&path)
            .unwrap();

        let mut cache = TextureCache::with_root(&dir);
        let first = cache.load(Path::new("dot.png")).unwrap();
        let second = cache.load(&path).unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!((first.width(), first.height()), (2, 3));
        assert_eq!(&first.pixels()[..4], &[1, 2, 3, 4]);
        assert_eq!(cache.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_cache_missing_file_is_error() {
        let mut cache = TextureCache::default();
        assert!(cache.load(Path::new("/nonexistent/stereohud.png")).is_err());
    }
}
