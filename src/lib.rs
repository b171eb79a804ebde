//! Streaming conversation state engine for a multi-surface generative AI
//! client.
//!
//! Three independent surfaces (chat, image lab, file analysis) share one
//! submission pipeline: compose the outgoing parts, append the user message,
//! stream or batch the provider response into the conversation, and persist
//! the whole set after every mutation. See [`orchestrator::Orchestrator`] for
//! the entry point.

pub mod accumulator;
pub mod client;
pub mod composer;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod speech;
pub mod store;

pub use accumulator::{StreamPhase, StreamingAccumulator, StreamingSession};
pub use client::{FragmentStream, GeminiClient, GeneratedImage, GenerationClient};
pub use composer::{AttachmentInput, compose};
pub use config::Config;
pub use error::{
    CompositionError, PersistenceError, ProviderError, StoreError, SubmitError,
};
pub use models::{
    AspectRatio, ConversationSet, ImageOptions, Message, Part, Role, Surface,
};
pub use orchestrator::Orchestrator;
pub use persistence::{FileStorage, HistoryPersistence, KeyedStorage, MemoryStorage};
pub use speech::{
    CaptureGate, CaptureHandle, NullSpeech, SpeechRecognizer, SpeechSynthesizer, TranscriptSink,
};
pub use store::MessageStore;
