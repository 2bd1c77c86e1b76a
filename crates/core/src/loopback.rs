// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! In-memory loopback backend for the SDK port.
//!
//! The loopback backend stands in for the vendor runtime wherever the real
//! binding is unavailable: every test runs against it, and it is the default
//! runtime backend of the server binary. It keeps the contract honest in the
//! ways that matter to the router:
//!
//! - created senders register their name as a discoverable source, so the
//!   discovery filter's own-destination exclusion is exercised end-to-end;
//! - receivers synthesize deterministic BGRA frames (with an audio frame
//!   every fifth emission) at a paced interval, so capture timing, fan-out,
//!   and the BGRA→RGB preview conversion all see realistic data;
//! - handle creation can be scripted to fail, for the error paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::sdk::{
    AudioFrame, CapturedFrame, DiscoveredSource, FrameReceiver, FrameSender, MediaSdk, PixelFormat,
    ReceiverConfig, SenderConfig, SourceFinder, VideoFrame,
};

/// Resolution of synthesized video frames. Small on purpose: tests pump many
/// of them through the loop.
pub const LOOPBACK_FRAME_WIDTH: u32 = 64;
pub const LOOPBACK_FRAME_HEIGHT: u32 = 36;

/// Minimum spacing between synthesized frames (~50 fps).
const FRAME_INTERVAL: Duration = Duration::from_millis(20);

/// Per-sender delivery counters, readable by tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub video_frames: u64,
    pub audio_frames: u64,
}

#[derive(Default)]
struct LoopbackState {
    sources: BTreeMap<String, String>,
    stats: HashMap<String, SenderStats>,
    fail_sender_creates: bool,
    fail_receiver_creates: bool,
}

/// The loopback [`MediaSdk`] implementation. Clones share state, so a test
/// can keep a handle for assertions while the session owns another.
#[derive(Clone, Default)]
pub struct LoopbackSdk {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackSdk {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A loopback SDK pre-seeded with discoverable sources.
    #[must_use]
    pub fn with_sources<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sdk = Self::new();
        for name in names {
            sdk.add_source(name, "");
        }
        sdk
    }

    /// Makes `name` visible to finders.
    pub fn add_source(&self, name: impl Into<String>, url: impl Into<String>) {
        let name = name.into();
        let url = url.into();
        let url = if url.is_empty() { format!("loopback://{name}") } else { url };
        self.lock().sources.insert(name, url);
    }

    /// Removes `name` from the discoverable set.
    pub fn remove_source(&self, name: &str) {
        self.lock().sources.remove(name);
    }

    /// When set, subsequent `create_sender` calls return `None`.
    pub fn set_fail_sender_creates(&self, fail: bool) {
        self.lock().fail_sender_creates = fail;
    }

    /// When set, subsequent `create_receiver` calls return `None`.
    pub fn set_fail_receiver_creates(&self, fail: bool) {
        self.lock().fail_receiver_creates = fail;
    }

    /// Delivery counters for the sender named `name`, if one was created.
    #[must_use]
    pub fn sender_stats(&self, name: &str) -> Option<SenderStats> {
        self.lock().stats.get(name).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoopbackState> {
        // The mutex only guards plain data; a poisoned lock means a test
        // already panicked, so propagating the panic is fine.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl MediaSdk for LoopbackSdk {
    fn init(&self) -> bool {
        true
    }

    fn shutdown(&self) {}

    fn create_finder(&self, _show_local_sources: bool) -> Option<Box<dyn SourceFinder>> {
        Some(Box::new(LoopbackFinder { state: Arc::clone(&self.state) }))
    }

    fn create_receiver(&self, config: &ReceiverConfig) -> Option<Box<dyn FrameReceiver>> {
        if self.lock().fail_receiver_creates {
            return None;
        }
        Some(Box::new(LoopbackReceiver {
            state: Arc::clone(&self.state),
            source_name: config.source_name.clone(),
            last_emit: None,
            emitted: 0,
        }))
    }

    fn create_sender(&self, config: &SenderConfig) -> Option<Box<dyn FrameSender>> {
        let mut state = self.lock();
        if state.fail_sender_creates {
            return None;
        }
        state.sources.insert(config.name.clone(), format!("loopback://{}", config.name));
        state.stats.entry(config.name.clone()).or_default();
        Some(Box::new(LoopbackSender { state: Arc::clone(&self.state), name: config.name.clone() }))
    }
}

struct LoopbackFinder {
    state: Arc<Mutex<LoopbackState>>,
}

impl SourceFinder for LoopbackFinder {
    fn current_sources(&self) -> Vec<DiscoveredSource> {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state
            .sources
            .iter()
            .map(|(name, url)| DiscoveredSource { name: name.clone(), url: url.clone() })
            .collect()
    }
}

struct LoopbackReceiver {
    state: Arc<Mutex<LoopbackState>>,
    source_name: String,
    last_emit: Option<Instant>,
    emitted: u64,
}

impl LoopbackReceiver {
    fn source_exists(&self) -> bool {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.sources.contains_key(&self.source_name)
    }

    fn synth_video(&self) -> VideoFrame {
        let (w, h) = (LOOPBACK_FRAME_WIDTH, LOOPBACK_FRAME_HEIGHT);
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[x as u8, y as u8, 0x80, 0xff]);
            }
        }
        VideoFrame {
            width: w,
            height: h,
            format: PixelFormat::Bgra,
            frame_rate_n: 30,
            frame_rate_d: 1,
            line_stride: w * 4,
            timecode: self.emitted as i64 * 1000,
            data: Bytes::from(data),
        }
    }

    fn synth_audio(&self) -> AudioFrame {
        let sample_count = 480u32;
        AudioFrame {
            sample_rate: 48_000,
            channels: 2,
            sample_count,
            timecode: self.emitted as i64 * 1000,
            data: Bytes::from(vec![0u8; (sample_count * 2 * 4) as usize]),
        }
    }
}

impl FrameReceiver for LoopbackReceiver {
    // The loopback never blocks: if no frame is due within the pacing
    // interval it reports None immediately, like an expired SDK timeout.
    fn capture(&mut self, _timeout: Duration) -> CapturedFrame {
        if !self.source_exists() {
            return CapturedFrame::None;
        }
        let due = self.last_emit.is_none_or(|t| t.elapsed() >= FRAME_INTERVAL);
        if !due {
            return CapturedFrame::None;
        }
        self.last_emit = Some(Instant::now());
        self.emitted += 1;
        if self.emitted % 5 == 0 {
            CapturedFrame::Audio(self.synth_audio())
        } else {
            CapturedFrame::Video(self.synth_video())
        }
    }
}

struct LoopbackSender {
    state: Arc<Mutex<LoopbackState>>,
    name: String,
}

impl LoopbackSender {
    fn with_stats(&self, f: impl FnOnce(&mut SenderStats)) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(state.stats.entry(self.name.clone()).or_default());
    }
}

impl FrameSender for LoopbackSender {
    fn send_video(&mut self, _frame: &VideoFrame) {
        self.with_stats(|s| s.video_frames += 1);
    }

    fn send_audio(&mut self, _frame: &AudioFrame) {
        self.with_stats(|s| s.audio_frames += 1);
    }
}

impl Drop for LoopbackSender {
    // A destroyed sender disappears from the network; its counters survive
    // so tests can assert on deliveries after teardown.
    fn drop(&mut self) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.sources.remove(&self.name);
    }
}
