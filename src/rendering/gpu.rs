//! wgpu-backed canvas.
//!
//! Draw calls are batched into textured quads (two triangles each) with the
//! rotation applied on the CPU and the texture's alpha modulation baked
//! into every vertex. Nothing reaches the GPU until [`GpuCanvas::submit`],
//! which uploads the vertices and records one render pass into an
//! offscreen `Rgba8Unorm` target.
//!
//! Device textures are cached by texture id and re-uploaded in place when
//! the version changes, so a camera stream keeps a single device texture.
//!
//! Readback for the output pipeline uses three `MAP_READ` buffers with rows
//! padded to 256 bytes. Mapping is requested without blocking and collected
//! on a later tick via `device.poll(PollType::Poll)`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use wgpu::{Device, Queue};

use super::canvas::Canvas;
use super::coord::Rect;
use super::texture::Texture;
use crate::error::{HudError, HudResult};
use crate::output::readback::{PixelReadback, RowOrder, READBACK_SLOTS};

/// Device textures unused for this many submits are released.
const TEXTURE_IDLE_SUBMITS: u64 = 300;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// WGSL shader drawing one textured quad per draw with per-vertex alpha.
const OVERLAY_SHADER: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) alpha: f32,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) alpha: f32,
}

@group(0) @binding(0) var overlay_texture: texture_2d<f32>;
@group(0) @binding(1) var overlay_sampler: sampler;

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    output.position = vec4<f32>(input.position, 0.0, 1.0);
    output.uv = input.uv;
    output.alpha = input.alpha;
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(overlay_texture, overlay_sampler, input.uv);
    return vec4<f32>(color.rgb, color.a * input.alpha);
}
"#;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
    alpha: f32,
}

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Float32];

struct CachedTexture {
    version: u64,
    width: u32,
    height: u32,
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    last_used: u64,
}

/// Consecutive vertices that sample the same texture.
struct DrawBatch {
    texture_id: u64,
    first_vertex: u32,
    vertex_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MapState {
    Idle,
    Pending(u64),
    Ready(u64),
    Failed,
}

struct ReadbackSlot {
    buffer: wgpu::Buffer,
    generation: u64,
    state: Arc<Mutex<MapState>>,
}

/// Bytes per row of a readback buffer, padded to wgpu's copy alignment.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let bytes_per_row = 4 * width;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    bytes_per_row.div_ceil(align) * align
}

/// Pixel-space corners of `dest` rotated clockwise by `angle` degrees about
/// its center, in top-left, top-right, bottom-right, bottom-left order.
pub fn quad_corners(dest: Rect, angle: f64) -> [[f32; 2]; 4] {
    let x0 = dest.x as f64;
    let y0 = dest.y as f64;
    let x1 = dest.right() as f64;
    let y1 = dest.bottom() as f64;
    let corners = [[x0, y0], [x1, y0], [x1, y1], [x0, y1]];
    if angle == 0.0 {
        return corners.map(|[x, y]| [x as f32, y as f32]);
    }

    let (sin, cos) = angle.to_radians().sin_cos();
    let cx = x0 + dest.w as f64 / 2.0;
    let cy = y0 + dest.h as f64 / 2.0;
    corners.map(|[x, y]| {
        let dx = x - cx;
        let dy = y - cy;
        [
            (cx + dx * cos - dy * sin) as f32,
            (cy + dx * sin + dy * cos) as f32,
        ]
    })
}

/// Offscreen wgpu render target implementing [`Canvas`] and
/// [`PixelReadback`].
pub struct GpuCanvas {
    device: Arc<Device>,
    queue: Arc<Queue>,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    width: u32,
    height: u32,
    vertices: Vec<QuadVertex>,
    batches: Vec<DrawBatch>,
    vertex_buffer: wgpu::Buffer,
    vertex_capacity: usize,
    clear: Option<[u8; 4]>,
    textures: HashMap<u64, CachedTexture>,
    submits: u64,
    readback: Vec<ReadbackSlot>,
}

impl GpuCanvas {
    /// Create a headless device and a `width` x `height` target.
    pub fn new(width: u32, height: u32) -> HudResult<Self> {
        let (device, queue) = pollster::block_on(request_device())?;
        Ok(Self::with_device(Arc::new(device), Arc::new(queue), width, height))
    }

    /// Build the canvas on an existing device.
    pub fn with_device(device: Arc<Device>, queue: Arc<Queue>, width: u32, height: u32) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("HUD Overlay Shader"),
            source: wgpu::ShaderSource::Wgsl(OVERLAY_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("HUD Overlay Bind Group Layout"),
            entries: &[
                // Overlay texture
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Overlay sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("HUD Overlay Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("HUD Overlay Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<QuadVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRIBUTES,
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    // Overlay PNGs carry straight alpha
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("HUD Overlay Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("HUD Framebuffer"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let vertex_capacity = 6 * 64;
        let vertex_buffer = create_vertex_buffer(&device, vertex_capacity);

        let readback_size = (padded_bytes_per_row(width) * height) as u64;
        let readback = (0..READBACK_SLOTS)
            .map(|i| ReadbackSlot {
                buffer: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("HUD Readback {}", i)),
                    size: readback_size,
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                    mapped_at_creation: false,
                }),
                generation: 0,
                state: Arc::new(Mutex::new(MapState::Idle)),
            })
            .collect();

        log::info!("[GPU] Canvas ready ({}x{})", width, height);

        Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            sampler,
            target,
            target_view,
            width,
            height,
            vertices: Vec::new(),
            batches: Vec::new(),
            vertex_buffer,
            vertex_capacity,
            clear: None,
            textures: HashMap::new(),
            submits: 0,
            readback,
        }
    }

    /// Number of device textures currently cached.
    pub fn cached_textures(&self) -> usize {
        self.textures.len()
    }

    /// Upload `texture` if it is new or its version changed.
    fn ensure_texture(&mut self, texture: &Texture) {
        let submits = self.submits;
        if let Some(cached) = self.textures.get_mut(&texture.id()) {
            cached.last_used = submits;
            if cached.version == texture.version() {
                return;
            }
            if cached.width == texture.width() && cached.height == texture.height() {
                write_pixels(&self.queue, &cached.texture, texture);
                cached.version = texture.version();
                return;
            }
        }

        let size = wgpu::Extent3d {
            width: texture.width(),
            height: texture.height(),
            depth_or_array_layers: 1,
        };
        let device_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(texture.label()),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        write_pixels(&self.queue, &device_texture, texture);

        let view = device_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("HUD Overlay Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        log::debug!(
            "[GPU] Uploaded texture '{}' ({}x{})",
            texture.label(),
            texture.width(),
            texture.height()
        );
        self.textures.insert(
            texture.id(),
            CachedTexture {
                version: texture.version(),
                width: texture.width(),
                height: texture.height(),
                texture: device_texture,
                bind_group,
                last_used: submits,
            },
        );
    }

    fn push_quad(&mut self, texture: &Texture, src: Rect, dest: Rect, angle: f64) {
        if src.is_empty() || dest.is_empty() || texture.width() == 0 || texture.height() == 0 {
            return;
        }
        self.ensure_texture(texture);

        let alpha = texture.alpha_mod() as f32 / 255.0;
        let tw = texture.width() as f32;
        let th = texture.height() as f32;
        let u0 = src.x as f32 / tw;
        let v0 = src.y as f32 / th;
        let u1 = src.right() as f32 / tw;
        let v1 = src.bottom() as f32 / th;
        let uvs = [[u0, v0], [u1, v0], [u1, v1], [u0, v1]];

        let fw = self.width as f32;
        let fh = self.height as f32;
        let corners = quad_corners(dest, angle).map(|[x, y]| [x / fw * 2.0 - 1.0, 1.0 - y / fh * 2.0]);

        let first_vertex = self.vertices.len() as u32;
        for i in [0usize, 1, 2, 0, 2, 3] {
            self.vertices.push(QuadVertex {
                position: corners[i],
                uv: uvs[i],
                alpha,
            });
        }

        match self.batches.last_mut() {
            Some(batch) if batch.texture_id == texture.id() => batch.vertex_count += 6,
            _ => self.batches.push(DrawBatch {
                texture_id: texture.id(),
                first_vertex,
                vertex_count: 6,
            }),
        }
    }

    /// Record and submit everything drawn since the last submit.
    pub fn submit(&mut self) -> HudResult<()> {
        if self.batches.is_empty() && self.clear.is_none() {
            return Ok(());
        }

        if self.vertices.len() > self.vertex_capacity {
            self.vertex_capacity = self.vertices.len().next_power_of_two();
            self.vertex_buffer = create_vertex_buffer(&self.device, self.vertex_capacity);
        }
        if !self.vertices.is_empty() {
            self.queue
                .write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(&self.vertices));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("HUD Frame Encoder"),
            });

        {
            let load = match self.clear {
                Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: r as f64 / 255.0,
                    g: g as f64 / 255.0,
                    b: b as f64 / 255.0,
                    a: a as f64 / 255.0,
                }),
                None => wgpu::LoadOp::Load,
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("HUD Overlay Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            for batch in &self.batches {
                let Some(cached) = self.textures.get(&batch.texture_id) else {
                    continue;
                };
                render_pass.set_bind_group(0, &cached.bind_group, &[]);
                render_pass.draw(batch.first_vertex..batch.first_vertex + batch.vertex_count, 0..1);
            }
        }

        self.queue.submit(Some(encoder.finish()));
        self.vertices.clear();
        self.batches.clear();
        self.clear = None;
        self.submits += 1;
        self.evict_idle_textures();
        Ok(())
    }

    fn evict_idle_textures(&mut self) {
        let submits = self.submits;
        let before = self.textures.len();
        self.textures
            .retain(|_, cached| submits.saturating_sub(cached.last_used) < TEXTURE_IDLE_SUBMITS);
        let evicted = before - self.textures.len();
        if evicted > 0 {
            log::debug!("[GPU] Released {} idle textures", evicted);
        }
    }

    fn copy_target_to(&self, encoder: &mut wgpu::CommandEncoder, buffer: &wgpu::Buffer) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row(self.width)),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

async fn request_device() -> HudResult<(Device, Queue)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    // Prefer the high-performance GPU
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| HudError::GpuError(format!("Failed to find GPU adapter: {}", e)))?;

    log::info!("[GPU] Using adapter: {:?}", adapter.get_info().name);

    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("StereoHUD Renderer"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        })
        .await
        .map_err(|e| HudError::GpuError(format!("Failed to create GPU device: {}", e)))
}

fn create_vertex_buffer(device: &Device, vertices: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("HUD Quad Vertices"),
        size: (vertices * std::mem::size_of::<QuadVertex>()) as u64,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn write_pixels(queue: &Queue, device_texture: &wgpu::Texture, texture: &Texture) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: device_texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        texture.pixels(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(texture.stride()),
            rows_per_image: Some(texture.height()),
        },
        wgpu::Extent3d {
            width: texture.width(),
            height: texture.height(),
            depth_or_array_layers: 1,
        },
    );
}

impl Canvas for GpuCanvas {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, rgba: [u8; 4]) {
        // A clear discards everything drawn before it
        self.vertices.clear();
        self.batches.clear();
        self.clear = Some(rgba);
    }

    fn copy(&mut self, texture: &Texture, src: Rect, dest: Rect) {
        self.push_quad(texture, src, dest, 0.0);
    }

    fn copy_rotated(&mut self, texture: &Texture, src: Rect, dest: Rect, angle: f64) {
        self.push_quad(texture, src, dest, angle);
    }

    fn present(&mut self) -> HudResult<()> {
        self.submit()
    }

    fn read_pixels(&mut self) -> HudResult<Vec<u8>> {
        self.submit()?;

        let padded = padded_bytes_per_row(self.width);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("HUD Screenshot Buffer"),
            size: (padded * self.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("HUD Screenshot Encoder"),
            });
        self.copy_target_to(&mut encoder, &buffer);
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| HudError::GpuError(format!("Device poll failed: {}", e)))?;
        rx.recv()
            .map_err(|_| HudError::GpuError("Map callback dropped".to_string()))?
            .map_err(|e| HudError::GpuError(format!("Failed to map screenshot buffer: {}", e)))?;

        let mut pixels = Vec::new();
        {
            let data = slice.get_mapped_range();
            crate::output::readback::copy_rows(&data, padded as usize, self.width, self.height, false, &mut pixels);
        }
        buffer.unmap();
        Ok(pixels)
    }
}

impl PixelReadback for GpuCanvas {
    fn readback_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn row_order(&self) -> RowOrder {
        RowOrder::TopDown
    }

    fn begin_readback(&mut self, slot: usize) -> HudResult<()> {
        if slot >= self.readback.len() {
            return Err(HudError::GpuError(format!("No readback slot {}", slot)));
        }
        self.submit()?;

        {
            let previous = *self.readback[slot].state.lock();
            // A slot that was never collected still holds a map or a pending map
            if matches!(previous, MapState::Pending(_) | MapState::Ready(_)) {
                self.readback[slot].buffer.unmap();
            }
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("HUD Readback Encoder"),
            });
        self.copy_target_to(&mut encoder, &self.readback[slot].buffer);
        self.queue.submit(Some(encoder.finish()));

        let entry = &mut self.readback[slot];
        entry.generation += 1;
        let generation = entry.generation;
        *entry.state.lock() = MapState::Pending(generation);

        let state = Arc::clone(&entry.state);
        entry.buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let mut state = state.lock();
            // Ignore callbacks for maps that were cancelled and reissued
            if *state == MapState::Pending(generation) {
                *state = match result {
                    Ok(()) => MapState::Ready(generation),
                    Err(_) => MapState::Failed,
                };
            }
        });

        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            log::debug!("[READBACK] Poll after readback failed: {}", e);
        }
        Ok(())
    }

    fn map_readback(&mut self, slot: usize, consume: &mut dyn FnMut(&[u8], usize)) -> bool {
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            log::debug!("[READBACK] Poll failed: {}", e);
        }
        let Some(entry) = self.readback.get(slot) else {
            return false;
        };
        if !matches!(*entry.state.lock(), MapState::Ready(_)) {
            return false;
        }

        {
            let data = entry.buffer.slice(..).get_mapped_range();
            consume(&data, padded_bytes_per_row(self.width) as usize);
        }
        entry.buffer.unmap();
        *entry.state.lock() = MapState::Idle;
        true
    }
}
