// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Preview sampler: on-demand RGB snapshots of a single chosen source.
//!
//! The preview pipeline is independent of routing: it owns its own receiver
//! (never the pooled ones), runs at reduced bandwidth, and is strictly
//! best-effort. A snapshot is a small framed buffer: 4 bytes little-endian
//! width, 4 bytes little-endian height, then `width * height * 3` bytes of
//! RGB reordered from the captured BGRA frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{Result, RouterError};
use crate::sdk::{Bandwidth, CapturedFrame, FrameReceiver, ReceiverConfig, SdkSession, VideoFrame};
use crate::types::Source;

/// Minimum spacing between non-empty snapshots (~24 fps).
pub const PREVIEW_FRAME_INTERVAL: Duration = Duration::from_millis(42);

/// Capture timeout; preview never waits on a source.
const CAPTURE_TIMEOUT: Duration = Duration::from_millis(1);

/// Settle time after tearing down the previous receiver.
const SWITCH_SETTLE: Duration = Duration::from_millis(100);

/// Drain time around receiver destruction.
const CLEAR_DRAIN: Duration = Duration::from_millis(50);

/// Holds at most one preview receiver and the name of the source it taps.
pub struct PreviewMonitor {
    session: Arc<SdkSession>,
    receiver: Option<Box<dyn FrameReceiver>>,
    source: Option<String>,
    last_frame: Option<Instant>,
}

impl PreviewMonitor {
    #[must_use]
    pub fn new(session: Arc<SdkSession>) -> Self {
        Self { session, receiver: None, source: None, last_frame: None }
    }

    /// Switches the preview to `source_name`, which must be present in the
    /// supplied discovery snapshot. Any previous preview receiver is torn
    /// down first.
    pub async fn set_source(&mut self, source_name: &str, snapshot: &[Source]) -> Result<()> {
        self.clear().await;
        tokio::time::sleep(SWITCH_SETTLE).await;

        if !snapshot.iter().any(|s| s.name == source_name) {
            return Err(RouterError::NotFound(format!("preview source '{source_name}'")));
        }

        let config = ReceiverConfig {
            source_name: source_name.to_string(),
            receiver_name: None,
            bandwidth: Bandwidth::Lowest,
        };
        let receiver = self.session.create_receiver(&config).ok_or_else(|| {
            warn!(source = %source_name, "Failed to create preview receiver");
            RouterError::ResourceCreate(format!("preview receiver for '{source_name}'"))
        })?;

        self.receiver = Some(receiver);
        self.source = Some(source_name.to_string());
        self.last_frame = None;
        info!(source = %source_name, "Preview receiver created");
        Ok(())
    }

    /// The currently previewed source name, if any.
    #[must_use]
    pub fn source(&self) -> Option<String> {
        self.source.clone()
    }

    /// Tears down the preview receiver, letting in-flight captures drain on
    /// either side of the destroy.
    pub async fn clear(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            tokio::time::sleep(CLEAR_DRAIN).await;
            drop(receiver);
            tokio::time::sleep(CLEAR_DRAIN).await;
        }
        self.source = None;
    }

    /// Captures one snapshot. Returns an empty buffer when no preview source
    /// is set, the rate cap has not elapsed, or no frame arrived this call.
    pub fn capture_frame(&mut self) -> Vec<u8> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Vec::new();
        };
        if self.last_frame.is_some_and(|t| t.elapsed() < PREVIEW_FRAME_INTERVAL) {
            return Vec::new();
        }
        match receiver.capture(CAPTURE_TIMEOUT) {
            CapturedFrame::Video(frame) => {
                let snapshot = rgb_snapshot(&frame);
                self.last_frame = Some(Instant::now());
                snapshot
            },
            _ => Vec::new(),
        }
    }
}

/// Builds the framed RGB snapshot: LE width, LE height, then RGB24 pixels
/// reordered from BGRA (alpha dropped).
fn rgb_snapshot(frame: &VideoFrame) -> Vec<u8> {
    let (width, height) = (frame.width as usize, frame.height as usize);
    let stride = frame.line_stride as usize;

    let mut out = Vec::with_capacity(8 + width * height * 3);
    out.extend_from_slice(&frame.width.to_le_bytes());
    out.extend_from_slice(&frame.height.to_le_bytes());

    for y in 0..height {
        let row = &frame.data[y * stride..y * stride + width * 4];
        for bgra in row.chunks_exact(4) {
            out.push(bgra[2]);
            out.push(bgra[1]);
            out.push(bgra[0]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackSdk, LOOPBACK_FRAME_HEIGHT, LOOPBACK_FRAME_WIDTH};

    fn make_session(sdk: LoopbackSdk) -> Arc<SdkSession> {
        Arc::new(SdkSession::open(Arc::new(sdk)).unwrap())
    }

    fn snapshot(names: &[&str]) -> Vec<Source> {
        names
            .iter()
            .map(|n| Source {
                name: (*n).to_string(),
                url: String::new(),
                connected: true,
                group: String::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn set_source_requires_discoverable_source() {
        let session = make_session(LoopbackSdk::with_sources(["CAM1"]));
        let mut preview = PreviewMonitor::new(session);

        let err = preview.set_source("GHOST", &snapshot(&["CAM1"])).await.unwrap_err();
        assert!(matches!(err, RouterError::NotFound(_)));
        assert_eq!(preview.source(), None);

        preview.set_source("CAM1", &snapshot(&["CAM1"])).await.unwrap();
        assert_eq!(preview.source(), Some("CAM1".to_string()));
    }

    #[tokio::test]
    async fn clear_drops_receiver_and_source() {
        let session = make_session(LoopbackSdk::with_sources(["CAM1"]));
        let mut preview = PreviewMonitor::new(session);
        preview.set_source("CAM1", &snapshot(&["CAM1"])).await.unwrap();

        preview.clear().await;
        assert_eq!(preview.source(), None);
        assert!(preview.capture_frame().is_empty());
    }

    #[tokio::test]
    async fn snapshot_framing_matches_source_resolution() {
        let session = make_session(LoopbackSdk::with_sources(["CAM1"]));
        let mut preview = PreviewMonitor::new(session);
        preview.set_source("CAM1", &snapshot(&["CAM1"])).await.unwrap();

        let buffer = preview.capture_frame();
        let (w, h) = (LOOPBACK_FRAME_WIDTH, LOOPBACK_FRAME_HEIGHT);
        assert_eq!(buffer.len(), 8 + (w * h * 3) as usize);
        assert_eq!(&buffer[..4], &w.to_le_bytes());
        assert_eq!(&buffer[4..8], &h.to_le_bytes());
        // Loopback pixel (x, y) is B=x G=y R=0x80, so RGB out is [0x80, y, x].
        assert_eq!(&buffer[8..11], &[0x80, 0, 0]);
        assert_eq!(&buffer[8 + 3..8 + 6], &[0x80, 0, 1]);
    }

    #[tokio::test]
    async fn capture_respects_rate_cap() {
        let session = make_session(LoopbackSdk::with_sources(["CAM1"]));
        let mut preview = PreviewMonitor::new(session);
        preview.set_source("CAM1", &snapshot(&["CAM1"])).await.unwrap();

        assert!(!preview.capture_frame().is_empty());
        // Immediately after a frame, the 42 ms cap suppresses the next one.
        assert!(preview.capture_frame().is_empty());

        tokio::time::sleep(PREVIEW_FRAME_INTERVAL).await;
        assert!(!preview.capture_frame().is_empty());
    }

    #[test]
    fn empty_without_receiver() {
        let session = make_session(LoopbackSdk::new());
        let mut preview = PreviewMonitor::new(session);
        assert!(preview.capture_frame().is_empty());
    }
}
