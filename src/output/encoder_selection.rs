//! Encoder selection and hardware acceleration detection.

use std::path::Path;
use std::process::Stdio;

/// Which H.264 encoder an encode graph uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderType {
    /// NVIDIA NVENC hardware encoder (h264_nvenc).
    Nvenc,
    /// Software x264 encoder (libx264).
    X264,
}

/// Codec arguments shared by every branch of an encode graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub encoder_type: EncoderType,
    pub codec: String,
    pub preset: String,
    /// Extra low-latency tuning flags, already split into arguments.
    pub tuning: Vec<String>,
}

impl EncoderSettings {
    /// Low-latency NVENC settings.
    pub fn nvenc() -> Self {
        Self {
            encoder_type: EncoderType::Nvenc,
            codec: "h264_nvenc".to_string(),
            // p1 is the fastest preset, ll keeps per-frame latency flat
            preset: "p1".to_string(),
            tuning: vec!["-tune".to_string(), "ll".to_string(), "-zerolatency".to_string(), "1".to_string()],
        }
    }

    /// Software fallback tuned for the render cadence.
    pub fn x264() -> Self {
        Self {
            encoder_type: EncoderType::X264,
            codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            tuning: vec!["-tune".to_string(), "zerolatency".to_string()],
        }
    }

    /// Codec arguments for one output at `bitrate_kbps`, with a keyframe
    /// every `gop` frames.
    pub fn codec_args(&self, bitrate_kbps: u32, gop: u32) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
        ];
        args.extend(self.tuning.iter().cloned());
        args.extend([
            "-b:v".to_string(),
            format!("{}k", bitrate_kbps),
            "-maxrate".to_string(),
            format!("{}k", bitrate_kbps),
            "-bufsize".to_string(),
            format!("{}k", bitrate_kbps * 2),
            "-g".to_string(),
            gop.max(1).to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ]);
        args
    }
}

/// Check if NVENC is available by testing FFmpeg encoder.
pub fn is_nvenc_available(ffmpeg_path: &Path) -> bool {
    // NVENC has minimum frame size requirements (~145x49), so use 256x256
    let result = crate::ffmpeg::create_hidden_command(ffmpeg_path)
        .args([
            "-f",
            "lavfi",
            "-i",
            "testsrc=duration=0.01:size=256x256:rate=1",
            "-c:v",
            "h264_nvenc",
            "-f",
            "null",
            "-",
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        Ok(status) => {
            let available = status.success();
            log::info!(
                "[ENCODER] NVENC availability check: {}",
                if available {
                    "available"
                } else {
                    "not available"
                }
            );
            available
        },
        Err(e) => {
            log::debug!("[ENCODER] NVENC check failed: {}", e);
            false
        },
    }
}

/// Select the best available encoder based on hardware and preferences.
pub fn select_encoder(ffmpeg_path: &Path, prefer_hardware: bool) -> EncoderSettings {
    if prefer_hardware && is_nvenc_available(ffmpeg_path) {
        log::info!("[ENCODER] Using NVENC hardware encoder");
        EncoderSettings::nvenc()
    } else {
        log::info!("[ENCODER] Using x264 software encoder");
        EncoderSettings::x264()
    }
}
