//! Generation orchestration: one submission pipeline across every surface.
//!
//! `submit` composes the outgoing parts, appends the user message, routes to
//! the provider (streaming text or batch images), folds the response into the
//! conversation, and persists the full set after every mutation. Provider
//! failures are recorded in-conversation as the surface's fixed failure text
//! and additionally returned to the caller.
//!
//! Conversation state lives behind a `std::sync::Mutex` whose guard is never
//! held across an await, so a second submission on the same surface during an
//! active stream simply supersedes it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;

use crate::accumulator::StreamingAccumulator;
use crate::client::{FragmentStream, GenerationClient};
use crate::composer::{AttachmentInput, compose};
use crate::error::{CompositionError, ProviderError, SubmitError};
use crate::models::{ConversationSet, ImageOptions, Message, Part, Surface};
use crate::persistence::{HistoryPersistence, KeyedStorage};
use crate::speech::SpeechSynthesizer;
use crate::store::MessageStore;

// === Types ===

#[derive(Debug, Default)]
struct EngineState {
    store: MessageStore,
    accumulator: StreamingAccumulator,
}

/// Session-scoped conversation engine for one identity.
#[must_use]
pub struct Orchestrator<C, S, V>
where
    C: GenerationClient,
    S: KeyedStorage,
    V: SpeechSynthesizer,
{
    client: C,
    speech: V,
    persistence: HistoryPersistence<S>,
    identity: Option<String>,
    voice_output: AtomicBool,
    image_options: Mutex<ImageOptions>,
    document: Mutex<Option<String>>,
    state: Mutex<EngineState>,
}

// === Orchestrator ===

impl<C, S, V> Orchestrator<C, S, V>
where
    C: GenerationClient,
    S: KeyedStorage,
    V: SpeechSynthesizer,
{
    /// Create an engine for an identity, loading its persisted history.
    pub fn new(client: C, storage: S, speech: V, identity: Option<String>) -> Self {
        let persistence = HistoryPersistence::new(storage);
        let store = MessageStore::from_set(persistence.load(identity.as_deref()));
        Self {
            client,
            speech,
            persistence,
            identity,
            voice_output: AtomicBool::new(false),
            image_options: Mutex::new(ImageOptions::default()),
            document: Mutex::new(None),
            state: Mutex::new(EngineState {
                store,
                accumulator: StreamingAccumulator::new(),
            }),
        }
    }

    /// Submit user input on a surface and drive the response to completion.
    ///
    /// Returns only after the response has settled or failed. Provider
    /// failures have already been recorded as the surface's failure text by
    /// the time the error is returned.
    pub async fn submit(
        &self,
        surface: Surface,
        text: &str,
        attachments: Vec<AttachmentInput>,
    ) -> Result<(), SubmitError> {
        let parts = compose(text, &attachments)?;
        let prompt = text.trim().to_string();

        let document = match surface {
            Surface::FileAnalysis => {
                let document = self.lock_document().clone();
                Some(document.ok_or(CompositionError::MissingDocument)?)
            }
            Surface::Chat | Surface::ImageLab => None,
        };

        let user_message = Message::user(parts);

        // Append the user message and snapshot the provider context,
        // excluding any in-flight placeholder on this surface.
        let context = {
            let mut state = self.lock_state();
            let pending = state.accumulator.pending_index(surface);
            let context: Vec<Message> = state
                .store
                .get(surface)
                .iter()
                .enumerate()
                .filter(|(index, _)| Some(*index) != pending)
                .map(|(_, message)| message.clone())
                .collect();
            state.store.append(surface, user_message.clone());
            context
        };
        self.persist();

        match surface {
            Surface::ImageLab => self.run_image_batch(&prompt).await,
            Surface::Chat => {
                let stream = self.client.stream_chat(&context, &user_message).await;
                self.run_text_stream(surface, stream).await
            }
            Surface::FileAnalysis => {
                let document = document.unwrap_or_default();
                let stream = self
                    .client
                    .stream_document_answer(&document, &prompt)
                    .await;
                self.run_text_stream(surface, stream).await
            }
        }
    }

    async fn run_image_batch(&self, prompt: &str) -> Result<(), SubmitError> {
        let options = *self.lock_image_options();
        match self.client.generate_images(prompt, &options).await {
            Ok(images) => {
                let parts: Vec<Part> = images
                    .into_iter()
                    .map(|image| Part::attachment(image.mime_type, image.data))
                    .collect();
                let message = Message::model(parts).with_origin_prompt(prompt);
                self.lock_state().store.append(Surface::ImageLab, message);
                self.persist();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "image generation failed");
                self.lock_state().store.append(
                    Surface::ImageLab,
                    Message::model_text(Surface::ImageLab.failure_text()),
                );
                self.persist();
                Err(SubmitError::Provider(e))
            }
        }
    }

    async fn run_text_stream(
        &self,
        surface: Surface,
        stream: Result<FragmentStream, ProviderError>,
    ) -> Result<(), SubmitError> {
        // A failed request never created a placeholder; append the failure
        // text directly.
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(surface = %surface, error = %e, "stream request failed");
                self.lock_state()
                    .store
                    .append(surface, Message::model_text(surface.failure_text()));
                self.persist();
                return Err(SubmitError::Provider(e));
            }
        };

        let mut session = {
            let mut state = self.lock_state();
            let state = &mut *state;
            state.accumulator.begin(&mut state.store, surface)
        };
        self.persist();

        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    let applied = {
                        let mut state = self.lock_state();
                        let state = &mut *state;
                        state
                            .accumulator
                            .apply(&mut state.store, &mut session, &fragment)
                    };
                    match applied {
                        Ok(true) => self.persist(),
                        Ok(false) => {
                            // Superseded mid-stream; nothing further to record.
                            return Ok(());
                        }
                        Err(e) => {
                            tracing::warn!(surface = %surface, error = %e, "placeholder vanished mid-stream");
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(surface = %surface, error = %e, "stream failed mid-response");
                    let failed = {
                        let mut state = self.lock_state();
                        let state = &mut *state;
                        state
                            .accumulator
                            .fail(&mut state.store, &mut session, surface.failure_text())
                    };
                    if let Err(store_err) = failed {
                        tracing::warn!(surface = %surface, error = %store_err, "failed to record failure text");
                    }
                    self.persist();
                    return Err(SubmitError::Provider(e));
                }
            }
        }

        let settled = {
            let mut state = self.lock_state();
            state.accumulator.settle(&mut session)
        };
        self.persist();

        if let Some(text) = settled
            && surface == Surface::Chat
            && self.voice_output.load(Ordering::Relaxed)
            && !text.is_empty()
        {
            self.speech.synthesize(&text);
        }
        Ok(())
    }

    /// Clear one surface's conversation. An in-flight stream on the surface
    /// is invalidated so its late fragments are dropped.
    pub fn new_conversation(&self, surface: Surface) {
        {
            let mut state = self.lock_state();
            state.accumulator.invalidate(surface);
            state.store.clear(surface);
        }
        self.persist();
    }

    /// Load a document for analysis, resetting the analysis conversation.
    pub fn load_document(&self, text: impl Into<String>) {
        *self.lock_document() = Some(text.into());
        self.new_conversation(Surface::FileAnalysis);
    }

    #[must_use]
    pub fn document_loaded(&self) -> bool {
        self.lock_document().is_some()
    }

    /// Snapshot of one surface's messages.
    #[must_use]
    pub fn messages(&self, surface: Surface) -> Vec<Message> {
        self.lock_state().store.get(surface).to_vec()
    }

    pub fn set_voice_output(&self, enabled: bool) {
        self.voice_output.store(enabled, Ordering::Relaxed);
    }

    #[must_use]
    pub fn voice_output(&self) -> bool {
        self.voice_output.load(Ordering::Relaxed)
    }

    pub fn set_image_options(&self, options: ImageOptions) {
        *self.lock_image_options() = options;
    }

    #[must_use]
    pub fn image_options(&self) -> ImageOptions {
        *self.lock_image_options()
    }

    fn persist(&self) {
        let snapshot: ConversationSet = self.lock_state().store.snapshot();
        self.persistence.save(self.identity.as_deref(), &snapshot);
    }

    // Guards are always dropped before the next await point.
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_document(&self) -> MutexGuard<'_, Option<String>> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_image_options(&self) -> MutexGuard<'_, ImageOptions> {
        self.image_options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
