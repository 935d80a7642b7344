//! Locating and launching the ffmpeg binary.
//!
//! Camera sources and encode graphs both run ffmpeg as a child process
//! talking raw RGBA over pipes.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{HudError, HudResult};

/// Create a Command configured to hide the console window on Windows.
pub fn create_hidden_command(program: &Path) -> Command {
    let mut cmd = Command::new(program);

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd
}

/// Find a working ffmpeg binary.
///
/// Tries the ffmpeg-sidecar location first, then the system PATH. Each
/// candidate is validated by running `-version`.
pub fn find_ffmpeg() -> Option<PathBuf> {
    let sidecar_path = ffmpeg_sidecar::paths::ffmpeg_path();

    if test_ffmpeg_binary(&sidecar_path) {
        log::debug!("[FFMPEG] Using sidecar path: {}", sidecar_path.display());
        return Some(sidecar_path);
    }

    log::debug!(
        "[FFMPEG] Sidecar path failed ({}), trying system PATH",
        sidecar_path.display()
    );

    let binary_name = if cfg!(windows) {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    };

    if let Some(path) = find_in_system_path(binary_name).filter(|p| test_ffmpeg_binary(p)) {
        log::debug!("[FFMPEG] Using system PATH: {}", path.display());
        return Some(path);
    }

    log::warn!("[FFMPEG] No working ffmpeg found");
    None
}

/// Like [`find_ffmpeg`] but as an error for `?` call sites.
pub fn require_ffmpeg() -> HudResult<PathBuf> {
    find_ffmpeg().ok_or(HudError::FfmpegNotFound)
}

/// Test if an ffmpeg binary works by running -version
fn test_ffmpeg_binary(path: &Path) -> bool {
    create_hidden_command(path)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// First `name` found in a `PATH` directory.
fn find_in_system_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Render an argument list for logging.
pub fn format_args_for_log(args: &[String]) -> String {
    args.iter()
        .map(|a| {
            if a.contains(' ') {
                format!("\"{}\"", a)
            } else {
                a.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_fails_validation() {
        assert!(!test_ffmpeg_binary(Path::new("/nonexistent/ffmpeg-binary")));
    }

    #[test]
    fn test_path_lookup_ignores_missing_names() {
        assert!(find_in_system_path("stereohud-no-such-tool").is_none());
    }

    #[test]
    fn test_format_args_quotes_spaces() {
        let args = vec!["-i".to_string(), "my file.mkv".to_string()];
        assert_eq!(format_args_for_log(&args), "-i \"my file.mkv\"");
    }
}
