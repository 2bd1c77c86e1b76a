// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The SDK port: the only surface the routing engine depends on.
//!
//! The vendor discovery-and-transport SDK is reached exclusively through the
//! traits in this module:
//!
//! - [`MediaSdk`]: process-wide init/teardown plus handle factories
//! - [`SourceFinder`]: snapshot of currently visible network sources
//! - [`FrameReceiver`]: pulls frames from one named source
//! - [`FrameSender`]: publishes frames under one destination name
//!
//! Handle creation is fallible in the SDK (null handles); the port models
//! that as `Option`, which callers treat as a transient failure and log.
//!
//! Frames own their pixel/sample buffers ([`bytes::Bytes`]), so the
//! free-after-capture pairing the raw SDK requires is subsumed by `Drop`,
//! and fanning one frame out to several senders needs no copies.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Receive-side bandwidth mode.
///
/// Routing receivers default to `Highest` to preserve quality; the preview
/// sampler always uses `Lowest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Bandwidth {
    #[default]
    Highest,
    Lowest,
}

/// Pixel layout of raw video frames crossing the port. Routing and preview
/// both operate on BGRA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit blue, green, red, alpha; 4 bytes per pixel.
    Bgra,
}

/// A single raw video frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub frame_rate_n: u32,
    pub frame_rate_d: u32,
    /// Bytes from the start of one row to the next.
    pub line_stride: u32,
    pub timecode: i64,
    pub data: Bytes,
}

/// A single frame of raw audio (32-bit float, planar).
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub channels: u32,
    pub sample_count: u32,
    pub timecode: i64,
    pub data: Bytes,
}

/// Result of one capture call. Forwarding logic matches on the variant;
/// everything that is not video or audio is ignored by the routing loop.
#[derive(Debug)]
pub enum CapturedFrame {
    /// Nothing arrived within the timeout.
    None,
    Video(VideoFrame),
    Audio(AudioFrame),
    Metadata,
    Status,
    SourceChange,
}

/// A source as reported by the finder, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSource {
    pub name: String,
    pub url: String,
}

/// Parameters for creating a receiver.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Name of the network source to connect to.
    pub source_name: String,
    /// Optional logical name for the receiver itself.
    pub receiver_name: Option<String>,
    pub bandwidth: Bandwidth,
}

/// Parameters for creating a sender. Neither clock is ever enabled: the
/// router forwards at receive pace for lowest latency.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub name: String,
    pub clock_video: bool,
    pub clock_audio: bool,
}

impl SenderConfig {
    /// An unclocked sender publishing under `name`.
    #[must_use]
    pub fn unclocked(name: impl Into<String>) -> Self {
        Self { name: name.into(), clock_video: false, clock_audio: false }
    }
}

/// Entry point to the vendor runtime. Implementations must be safe to share
/// across tasks; each handle they produce has a single logical owner.
pub trait MediaSdk: Send + Sync {
    /// Initializes the process-wide SDK state. Returns false on failure.
    fn init(&self) -> bool;

    /// Tears down the process-wide SDK state. Called exactly once, after
    /// every handle has been released.
    fn shutdown(&self);

    fn create_finder(&self, show_local_sources: bool) -> Option<Box<dyn SourceFinder>>;

    fn create_receiver(&self, config: &ReceiverConfig) -> Option<Box<dyn FrameReceiver>>;

    fn create_sender(&self, config: &SenderConfig) -> Option<Box<dyn FrameSender>>;
}

/// Snapshot access to the set of currently visible network sources.
pub trait SourceFinder: Send {
    fn current_sources(&self) -> Vec<DiscoveredSource>;
}

/// Pulls frames from one named source. Dropping the receiver disconnects.
pub trait FrameReceiver: Send {
    /// Waits up to `timeout` for the next frame. The routing loop calls this
    /// with a 1 ms timeout so shutdown latency stays bounded by one tick.
    fn capture(&mut self, timeout: Duration) -> CapturedFrame;
}

/// Publishes frames under one destination name. Sends never consume the
/// frame, so the same instance fans out to many senders within a tick.
pub trait FrameSender: Send {
    fn send_video(&mut self, frame: &VideoFrame);
    fn send_audio(&mut self, frame: &AudioFrame);
}

/// RAII handle for the process-wide SDK session.
///
/// Opening the session runs SDK init; dropping it runs teardown. All handle
/// creation goes through the session, and the top-level runtime keeps it
/// alive until every finder, receiver, and sender has been released, making
/// SDK teardown structurally the last step of shutdown.
pub struct SdkSession {
    sdk: Arc<dyn MediaSdk>,
}

impl SdkSession {
    /// Initializes the SDK. Returns `None` when init fails; the caller
    /// treats that as fatal.
    #[must_use]
    pub fn open(sdk: Arc<dyn MediaSdk>) -> Option<Self> {
        if !sdk.init() {
            return None;
        }
        Some(Self { sdk })
    }

    #[must_use]
    pub fn create_finder(&self, show_local_sources: bool) -> Option<Box<dyn SourceFinder>> {
        self.sdk.create_finder(show_local_sources)
    }

    #[must_use]
    pub fn create_receiver(&self, config: &ReceiverConfig) -> Option<Box<dyn FrameReceiver>> {
        self.sdk.create_receiver(config)
    }

    #[must_use]
    pub fn create_sender(&self, config: &SenderConfig) -> Option<Box<dyn FrameSender>> {
        self.sdk.create_sender(config)
    }
}

impl Drop for SdkSession {
    fn drop(&mut self) {
        self.sdk.shutdown();
    }
}

impl std::fmt::Debug for SdkSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkSession").finish_non_exhaustive()
    }
}
