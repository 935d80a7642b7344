//! Output destination modes.

use serde::{Deserialize, Serialize};

/// Where composited frames go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Disabled,
    Record,
    Stream,
    RecordStream,
}

impl OutputMode {
    /// Decode the wire value (0, 1, 2, 4).
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(OutputMode::Disabled),
            1 => Some(OutputMode::Record),
            2 => Some(OutputMode::Stream),
            4 => Some(OutputMode::RecordStream),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            OutputMode::Disabled => 0,
            OutputMode::Record => 1,
            OutputMode::Stream => 2,
            OutputMode::RecordStream => 4,
        }
    }

    pub fn includes_record(self) -> bool {
        matches!(self, OutputMode::Record | OutputMode::RecordStream)
    }

    pub fn includes_stream(self) -> bool {
        matches!(self, OutputMode::Stream | OutputMode::RecordStream)
    }

    pub fn is_enabled(self) -> bool {
        self != OutputMode::Disabled
    }

    /// Spoken/visual announcement when switching into this mode.
    pub fn announcement(self) -> &'static str {
        match self {
            OutputMode::Disabled => "Stopping recording and streaming.",
            OutputMode::Record => "Starting recording.",
            OutputMode::Stream => "Starting streaming.",
            OutputMode::RecordStream => "Starting recording and streaming.",
        }
    }
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutputMode::Disabled => "disabled",
            OutputMode::Record => "record",
            OutputMode::Stream => "stream",
            OutputMode::RecordStream => "record+stream",
        };
        f.write_str(name)
    }
}
