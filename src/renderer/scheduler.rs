//! Refresh-synchronized frame scheduling
//!
//! The scheduler turns any number of state changes into at most one redraw per
//! display refresh. It never runs a timer of its own: it arms the host's
//! one-shot "redraw on next refresh" primitive (a `requestAnimationFrame`-style
//! callback, or `Window::request_redraw` under winit) and remembers that a
//! frame is already on its way.
//!
//! # Usage
//!
//! ```
//! use std::cell::Cell;
//! use trackscreen::renderer::scheduler::{FrameScheduler, RedrawRequester};
//!
//! struct Counter(Cell<u32>);
//! impl RedrawRequester for Counter {
//!     fn request_redraw(&self) {
//!         self.0.set(self.0.get() + 1);
//!     }
//! }
//!
//! let host = Counter(Cell::new(0));
//! let mut scheduler = FrameScheduler::new();
//!
//! // A burst of changes arms a single callback
//! for _ in 0..100 {
//!     scheduler.request(&host);
//! }
//! assert_eq!(host.0.get(), 1);
//!
//! // The host fires the callback: render, then complete
//! scheduler.begin_frame();
//! scheduler.complete_frame(&host);
//! assert!(!scheduler.is_frame_queued());
//! ```

use log::trace;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Number of recent frame durations kept for the running average.
const FRAME_HISTORY_SIZE: u32 = 120;

/// Host primitive that runs one redraw at the next display refresh.
pub trait RedrawRequester {
    /// Arms a single redraw callback. Must not render synchronously.
    fn request_redraw(&self);
}

impl<T: RedrawRequester + ?Sized> RedrawRequester for Rc<T> {
    fn request_redraw(&self) {
        (**self).request_redraw();
    }
}

impl<T: RedrawRequester + ?Sized> RedrawRequester for Arc<T> {
    fn request_redraw(&self) {
        (**self).request_redraw();
    }
}

/// Counters describing scheduler activity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Requests that armed a host callback
    pub redraw_requests: u64,
    /// Requests absorbed into an already queued frame
    pub coalesced_requests: u64,
    /// Completed redraw passes
    pub frames_rendered: u64,
    /// Out-of-band rect flushes caused by a full rect queue
    pub forced_flushes: u64,
    /// Duration of the most recent redraw pass
    pub last_frame_time: Duration,
    /// Running average of redraw pass durations
    pub avg_frame_time: Duration,
}

/// Single-flight redraw scheduler.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    frame_queued: bool,
    frame_start: Option<Instant>,
    requested_mid_frame: bool,
    stats: FrameStats,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks for a redraw at the next refresh.
    ///
    /// Arms the host callback only if no frame is queued yet. Returns whether
    /// a callback was armed by this call.
    pub fn request(&mut self, host: &dyn RedrawRequester) -> bool {
        if self.frame_queued {
            if self.frame_start.is_some() {
                self.requested_mid_frame = true;
            }
            self.stats.coalesced_requests += 1;
            return false;
        }
        self.frame_queued = true;
        self.stats.redraw_requests += 1;
        host.request_redraw();
        trace!("frame queued");
        true
    }

    pub fn is_frame_queued(&self) -> bool {
        self.frame_queued
    }

    /// Marks the start of a redraw pass.
    pub fn begin_frame(&mut self) {
        self.frame_start = Some(Instant::now());
    }

    /// Marks the end of a redraw pass and re-enables scheduling.
    ///
    /// A request that arrived while the pass was running arms the next frame.
    pub fn complete_frame(&mut self, host: &dyn RedrawRequester) {
        if let Some(start) = self.frame_start.take() {
            let elapsed = start.elapsed();
            self.stats.last_frame_time = elapsed;
            let window = self.stats.frames_rendered.min(u64::from(FRAME_HISTORY_SIZE - 1)) as u32;
            self.stats.avg_frame_time = (self.stats.avg_frame_time * window + elapsed) / (window + 1);
        }
        self.stats.frames_rendered += 1;
        self.frame_queued = false;
        if std::mem::take(&mut self.requested_mid_frame) {
            self.request(host);
        }
    }

    /// Records a rect flush forced by queue overflow.
    pub fn record_forced_flush(&mut self) {
        self.stats.forced_flushes += 1;
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }
}
