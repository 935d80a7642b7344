//! Per-frame HUD element rendering.
//!
//! [`render_huds`] advances the transition clock, decides which elements
//! of which screens are visible, and hands each one to the stereo
//! projector with its transition effect applied.

use std::time::Instant;

use chrono::{DateTime, Local};

use super::animation::{altitude_frame, heading_frame, pitch_frame, wifi_frame};
use super::element::{
    DetectionOverlay, ElementKind, ElementStore, GaugeKind, OverlayElement, SpecialElement,
};
use super::sensors::{DetectionBox, SensorSnapshot};
use super::text::TextRasterizer;
use super::transition::{element_effect, render_passes, ElementEffect, ElementGroup, FramePhase, HudManager};
use crate::output::mode::OutputMode;
use crate::rendering::canvas::Canvas;
use crate::rendering::coord::{EyeLayout, Rect};
use crate::rendering::stereo::project_stereo;
use crate::rendering::texture::Texture;

/// The camera region each eye shows, for overlays anchored to camera
/// content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CameraView {
    /// First camera column shown.
    pub crop_x: i32,
    /// Camera columns stretched over one eye; 0 maps one to one.
    pub crop_width: i32,
    /// Camera rows stretched over the eye height; 0 maps one to one.
    pub height: i32,
}

impl CameraView {
    /// Eye-local position of camera pixel `(x, y)`.
    pub fn to_eye(&self, x: i32, y: i32, layout: &EyeLayout) -> (i32, i32) {
        let scale_x = if self.crop_width > 0 {
            layout.eye_width as f64 / self.crop_width as f64
        } else {
            1.0
        };
        let scale_y = if self.height > 0 {
            layout.eye_height as f64 / self.height as f64
        } else {
            1.0
        };
        (
            ((x - self.crop_x) as f64 * scale_x).round() as i32,
            (y as f64 * scale_y).round() as i32,
        )
    }
}

/// Inputs shared by every element in one frame.
pub struct RenderContext<'a> {
    pub layout: EyeLayout,
    pub camera: CameraView,
    /// Horizontal disparity; the left eye shifts left, the right eye right.
    pub stereo_offset: i32,
    pub pitch_offset: f64,
    pub sensors: &'a SensorSnapshot,
    pub output_started: bool,
    pub output_mode: OutputMode,
    pub now: Instant,
    pub wall_clock: DateTime<Local>,
}

/// What one call to [`render_huds`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderReport {
    pub phase: FramePhase,
    pub elements_drawn: usize,
    pub draw_calls: usize,
}

/// Draw the current HUD, or both HUDs of an in-flight transition.
pub fn render_huds(
    canvas: &mut dyn Canvas,
    manager: &mut HudManager,
    elements: &mut ElementStore,
    ctx: &RenderContext<'_>,
    mut text: Option<&mut dyn TextRasterizer>,
) -> RenderReport {
    if manager.take_switched() {
        elements.invalidate_text();
    }
    let phase = manager.advance(ctx.now);
    let mut report = RenderReport {
        phase,
        elements_drawn: 0,
        draw_calls: 0,
    };
    let ids = elements.ids_layered().to_vec();

    match phase {
        FramePhase::Empty => {},
        FramePhase::Idle { current } => {
            for id in &ids {
                let Some(element) = elements.get_mut(*id) else { continue };
                if !element.enabled || !element.huds.contains(current) {
                    continue;
                }
                let calls = draw_element(canvas, element, ElementEffect::NORMAL, ctx, &mut text);
                report.elements_drawn += usize::from(calls > 0);
                report.draw_calls += calls;
            }
        },
        FramePhase::Transitioning {
            from,
            to,
            kind,
            progress,
        } => {
            for group in render_passes(kind) {
                let effect = element_effect(group, kind, progress, ctx.layout.eye_width);
                for id in &ids {
                    let Some(element) = elements.get_mut(*id) else { continue };
                    if !element.enabled
                        || ElementGroup::classify(element.huds, from, to) != Some(group)
                    {
                        continue;
                    }
                    let calls = draw_element(canvas, element, effect, ctx, &mut text);
                    report.elements_drawn += usize::from(calls > 0);
                    report.draw_calls += calls;
                }
            }
            reset_alpha(elements);
        },
    }

    report
}

/// Restore full opacity on every element texture.
pub fn reset_alpha(elements: &ElementStore) {
    for (_, element) in elements.iter_layered() {
        for texture in element.textures() {
            texture.set_alpha_mod(255);
        }
    }
}

fn sized(x: i32, y: i32, width: i32, height: i32, texture: &Texture) -> Rect {
    Rect::new(
        x,
        y,
        if width > 0 { width } else { texture.width() as i32 },
        if height > 0 { height } else { texture.height() as i32 },
    )
}

/// Texture, optional source region and eye-local destination for an
/// element this frame. `None` draws nothing.
fn resolve(
    element: &mut OverlayElement,
    ctx: &RenderContext<'_>,
    text: &mut Option<&mut dyn TextRasterizer>,
) -> Option<(Texture, Option<Rect>, Rect)> {
    let (x, y, w, h) = (element.x, element.y, element.width, element.height);
    let sensors = ctx.sensors;

    match &mut element.kind {
        ElementKind::Static(textures) => {
            let texture = textures
                .select(ctx.output_started, ctx.output_mode, sensors.ai_state)
                .clone();
            let dest = sized(x, y, w, h, &texture);
            Some((texture, None, dest))
        },
        ElementKind::Animated { sheet, animation } => {
            animation.advance(ctx.now);
            let frame = animation.current_frame()?;
            Some((sheet.clone(), Some(frame.source), frame.dest_rect(x, y, w, h)))
        },
        ElementKind::Text(text_element) => {
            let rasterizer = text.as_deref_mut()?;
            match text_element.texture(sensors, ctx.wall_clock, rasterizer) {
                Ok(Some(texture)) => {
                    let dest = sized(x, y, w, h, &texture);
                    Some((texture, None, dest))
                },
                Ok(None) => None,
                Err(e) => {
                    log::warn!("[HUD] Text element '{}': {}", element.name, e);
                    None
                },
            }
        },
        ElementKind::Special(SpecialElement::Gauge {
            gauge,
            sheet,
            animation,
        }) => {
            let count = animation.frame_count();
            let index = match gauge {
                GaugeKind::Heading => heading_frame(sensors.motion.heading, count),
                GaugeKind::Pitch => pitch_frame(sensors.motion.pitch, ctx.pitch_offset, count),
                GaugeKind::Altitude => altitude_frame(sensors.gps.altitude, count),
                GaugeKind::Wifi => wifi_frame(sensors.wifi_level, count),
            };
            animation.select(index);
            let frame = animation.current_frame()?;
            Some((sheet.clone(), Some(frame.source), frame.natural_rect(x, y)))
        },
        ElementKind::Special(SpecialElement::Battery(textures)) => {
            let texture = textures.select(sensors.battery_level).clone();
            let dest = sized(x, y, w, h, &texture);
            Some((texture, None, dest))
        },
        ElementKind::ArmorComponent(textures) => {
            let texture = textures
                .select(sensors.armor_status(&textures.component))
                .clone();
            let dest = sized(x, y, w, h, &texture);
            Some((texture, None, dest))
        },
        ElementKind::EnvironmentPanel(panel) => {
            let texture = panel.texture(&sensors.environment, ctx.now);
            let dest = sized(x, y, w, h, &texture);
            Some((texture, None, dest))
        },
        // Drawn per detection by draw_detections
        ElementKind::Detections(_) => None,
    }
}

/// Draw the box sprite, and its label when a rasterizer is available,
/// over every detection. Positions come from each camera's own box, so
/// the stereo offset does not apply.
fn draw_detections(
    canvas: &mut dyn Canvas,
    overlay: &mut DetectionOverlay,
    origin: (i32, i32),
    effect: ElementEffect,
    ctx: &RenderContext<'_>,
    text: &mut Option<&mut dyn TextRasterizer>,
) -> usize {
    if ctx.sensors.detections.is_empty() {
        return 0;
    }
    overlay.animation.advance(ctx.now);
    let Some(frame) = overlay.animation.current_frame().copied() else {
        return 0;
    };

    // Top-left of the frame's original canvas, centered on the box
    let anchor = |b: &DetectionBox| {
        let (cx, cy) = b.center();
        let (x, y) = ctx.camera.to_eye(cx, cy, &ctx.layout);
        (
            x - frame.source_size_w / 2 + origin.0 + effect.offset_x,
            y - frame.source_size_h / 2 + origin.1,
        )
    };

    let mut calls = 0;
    for detection in &ctx.sensors.detections {
        let (lx, ly) = anchor(&detection.left);
        let (rx, ry) = anchor(&detection.right);
        let left = frame.natural_rect(lx, ly).zoom_about_center(effect.scale);
        let right = frame.natural_rect(rx, ry).zoom_about_center(effect.scale);
        {
            let _alpha = (effect.alpha < 1.0).then(|| overlay.sheet.alpha_scope(effect.alpha_mod()));
            calls += project_stereo(
                canvas,
                &overlay.sheet,
                Some(frame.source),
                left,
                Some(right),
                0.0,
                &ctx.layout,
            );
        }

        let label = match text.as_deref_mut() {
            Some(rasterizer) => overlay.label(&detection.label, rasterizer),
            None => Ok(None),
        };
        match label {
            Ok(Some(label)) => {
                let (ox, oy) = overlay.label_offset;
                let left = sized(lx + ox, ly + oy, 0, 0, &label);
                let right = sized(rx + ox, ry + oy, 0, 0, &label);
                let _alpha = (effect.alpha < 1.0).then(|| label.alpha_scope(effect.alpha_mod()));
                calls += project_stereo(canvas, &label, None, left, Some(right), 0.0, &ctx.layout);
            },
            Ok(None) => {},
            Err(e) => log::warn!("[HUD] Detection label '{}': {}", detection.label, e),
        }
    }
    calls
}

/// Draw one element to both eyes. Returns the number of draw calls.
///
/// Elements slid fully out of both eyes are dropped by per-eye clipping.
fn draw_element(
    canvas: &mut dyn Canvas,
    element: &mut OverlayElement,
    effect: ElementEffect,
    ctx: &RenderContext<'_>,
    text: &mut Option<&mut dyn TextRasterizer>,
) -> usize {
    let origin = (element.x, element.y);
    if let ElementKind::Detections(overlay) = &mut element.kind {
        return draw_detections(canvas, overlay, origin, effect, ctx, text);
    }

    let (texture, src, dest) = match resolve(element, ctx, text) {
        Some(resolved) => resolved,
        None => return 0,
    };

    let dest = dest.offset(effect.offset_x, 0);
    let disparity = if element.fixed { 0 } else { ctx.stereo_offset };
    let left = dest.offset(-disparity, 0).zoom_about_center(effect.scale);
    let right = dest.offset(disparity, 0).zoom_about_center(effect.scale);
    let angle = element.angle.resolve(ctx.sensors.motion.roll);

    let _alpha = (effect.alpha < 1.0).then(|| texture.alpha_scope(effect.alpha_mod()));
    project_stereo(canvas, &texture, src, left, Some(right), angle, &ctx.layout)
}
