// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Idle keepalive frames.
//!
//! While the route set is empty, each destination still needs to appear on
//! the network. The keepalive synthesizes a black 720p BGRA frame that the
//! router broadcasts to every destination on its status tick.

use bytes::Bytes;
use tracing::info;

use crate::sdk::{PixelFormat, VideoFrame};

pub const KEEPALIVE_WIDTH: u32 = 1280;
pub const KEEPALIVE_HEIGHT: u32 = 720;

/// Log at most once per this many frames.
const LOG_EVERY_FRAMES: u64 = 300;

/// Black-frame generator with a monotonically increasing timecode.
pub struct Keepalive {
    /// Zeroed BGRA buffer, built once and shared across frames.
    data: Bytes,
    frame_counter: u64,
    last_log_frame: u64,
}

impl Keepalive {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Bytes::from(vec![0u8; (KEEPALIVE_WIDTH * KEEPALIVE_HEIGHT * 4) as usize]),
            frame_counter: 0,
            last_log_frame: 0,
        }
    }

    /// The next keepalive frame. Timecode advances by 1000 per frame.
    pub fn next_frame(&mut self, destination_count: usize) -> VideoFrame {
        let frame = VideoFrame {
            width: KEEPALIVE_WIDTH,
            height: KEEPALIVE_HEIGHT,
            format: PixelFormat::Bgra,
            frame_rate_n: 30,
            frame_rate_d: 1,
            line_stride: KEEPALIVE_WIDTH * 4,
            timecode: self.frame_counter as i64 * 1000,
            data: self.data.clone(),
        };
        self.frame_counter += 1;
        if self.frame_counter - self.last_log_frame >= LOG_EVERY_FRAMES {
            info!(destinations = destination_count, "Sending keepalive frames to maintain network visibility");
            self.last_log_frame = self.frame_counter;
        }
        frame
    }
}

impl Default for Keepalive {
    fn default() -> Self {
        Self::new()
    }
}
