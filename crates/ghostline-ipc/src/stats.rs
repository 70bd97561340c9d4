//! Processor counters
//!
//! Relaxed atomics only: counters are diagnostics, never used for control flow.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct ProcessorCounters {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    malformed_frames: AtomicU64,
    unhandled_frames: AtomicU64,
    late_replies: AtomicU64,
    timeouts: AtomicU64,
}

impl ProcessorCounters {
    pub(crate) fn record_send(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_receive(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unhandled(&self) {
        self.unhandled_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_late_reply(&self) {
        self.late_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, pending_requests: usize) -> ProcessorStats {
        ProcessorStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            unhandled_frames: self.unhandled_frames.load(Ordering::Relaxed),
            late_replies: self.late_replies.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            pending_requests,
        }
    }
}

/// Point-in-time view of processor activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Frames written to the stream
    pub frames_sent: u64,
    /// Well-formed frames read from the stream
    pub frames_received: u64,
    /// Lines that failed to decode and were dropped
    pub malformed_frames: u64,
    /// Frames with no handler (or an unknown command)
    pub unhandled_frames: u64,
    /// Replies whose request was already gone
    pub late_replies: u64,
    /// Requests that hit their deadline
    pub timeouts: u64,
    /// Requests currently waiting for a reply
    pub pending_requests: usize,
}
