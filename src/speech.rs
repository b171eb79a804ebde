//! Speech capability seams: synthesis of settled responses and an exclusive
//! gate for microphone capture.
//!
//! Synthesis is fire-and-forget; a failing or absent backend never affects
//! conversation state. Capture is exclusive across the process: at most one
//! recognition session may hold the gate at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// === Traits ===

/// Speaks a settled response aloud. Implementations must not block the
/// caller and must swallow their own failures.
pub trait SpeechSynthesizer {
    fn synthesize(&self, text: &str);
}

/// Receives interim transcripts from an active capture session.
pub trait TranscriptSink {
    fn transcript(&self, text: &str);
}

/// Begins microphone capture sessions. Capture is exclusive: implementations
/// return `None` while another session is active (see [`CaptureGate`]).
/// Dropping the returned handle stops the capture.
pub trait SpeechRecognizer {
    fn start_capture(&self, sink: Arc<dyn TranscriptSink + Send + Sync>) -> Option<CaptureHandle>;
}

/// No-op backend for headless use and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSpeech;

impl SpeechSynthesizer for NullSpeech {
    fn synthesize(&self, text: &str) {
        tracing::debug!(chars = text.len(), "speech synthesis unavailable, ignoring");
    }
}

impl SpeechRecognizer for NullSpeech {
    fn start_capture(
        &self,
        _sink: Arc<dyn TranscriptSink + Send + Sync>,
    ) -> Option<CaptureHandle> {
        tracing::debug!("speech recognition unavailable");
        None
    }
}

// === Capture gate ===

/// Process-wide exclusivity for microphone capture. `try_start` yields a
/// handle only when no other capture is active; dropping the handle releases
/// the gate.
#[derive(Debug, Clone, Default)]
pub struct CaptureGate {
    active: Arc<AtomicBool>,
}

impl CaptureGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn try_start(&self) -> Option<CaptureHandle> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(CaptureHandle {
                active: Arc::clone(&self.active),
            })
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Held for the duration of one capture session.
#[derive(Debug)]
pub struct CaptureHandle {
    active: Arc<AtomicBool>,
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}
