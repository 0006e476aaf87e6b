use serde::{Deserialize, Serialize};

use crate::consts::FIRST_VISIBLE_LINE;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Buffer index of beam position 0. Denise outputs pixels a few cycles after
    /// Agnus fetched them.
    pub pixel_offset: usize,
    /// Lines above this one belong to the vertical blank and are never drawn.
    pub first_visible_line: u16,
    /// Move pixels drawn past the end of the line to the start of the buffer.
    pub wrap_prefetch: bool,
    /// Paint the border with distinct debug colors.
    pub debug_border: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            pixel_offset: 6,
            first_visible_line: FIRST_VISIBLE_LINE,
            wrap_prefetch: true,
            debug_border: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Frames the emulation may fall behind or run ahead before the time base is reset.
    pub max_frame_drift: i64,
    /// Upper bound for a single sleep of the emulator thread.
    pub sleep_timeout_ms: u64,
    /// Loop iterations between two statistics updates.
    pub stats_interval: u32,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            max_frame_drift: 5,
            sleep_timeout_ms: 50,
            stats_interval: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub video: VideoConfig,
    pub thread: ThreadConfig,
}
