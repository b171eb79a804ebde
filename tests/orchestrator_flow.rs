//! End-to-end submission flows against a scripted provider client.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use aihub_core::{
    AspectRatio, AttachmentInput, CompositionError, FragmentStream, GeneratedImage,
    GenerationClient, ImageOptions, MemoryStorage, Message, NullSpeech, Orchestrator, Part,
    ProviderError, Role, SpeechSynthesizer, SubmitError, Surface,
};

// === Test doubles ===

enum Script {
    Fragments(Vec<Result<String, ProviderError>>),
    Fail(ProviderError),
    Channel(mpsc::UnboundedReceiver<Result<String, ProviderError>>),
}

impl Script {
    fn into_stream(self) -> Result<FragmentStream, ProviderError> {
        match self {
            Script::Fragments(items) => Ok(Box::pin(tokio_stream::iter(items))),
            Script::Fail(e) => Err(e),
            Script::Channel(rx) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
        }
    }
}

#[derive(Clone, Default)]
struct ScriptedClient {
    chat: Arc<Mutex<VecDeque<Script>>>,
    document: Arc<Mutex<VecDeque<Script>>>,
    images: Arc<Mutex<VecDeque<Result<Vec<GeneratedImage>, ProviderError>>>>,
    document_calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedClient {
    fn script_chat(&self, script: Script) {
        self.chat.lock().unwrap().push_back(script);
    }

    fn script_document(&self, script: Script) {
        self.document.lock().unwrap().push_back(script);
    }

    fn script_images(&self, result: Result<Vec<GeneratedImage>, ProviderError>) {
        self.images.lock().unwrap().push_back(result);
    }
}

impl GenerationClient for ScriptedClient {
    async fn stream_chat(
        &self,
        _history: &[Message],
        _new_message: &Message,
    ) -> Result<FragmentStream, ProviderError> {
        let script = self
            .chat
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected stream_chat call");
        script.into_stream()
    }

    async fn generate_images(
        &self,
        _prompt: &str,
        _options: &ImageOptions,
    ) -> Result<Vec<GeneratedImage>, ProviderError> {
        self.images
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected generate_images call")
    }

    async fn stream_document_answer(
        &self,
        document: &str,
        question: &str,
    ) -> Result<FragmentStream, ProviderError> {
        self.document_calls
            .lock()
            .unwrap()
            .push((document.to_string(), question.to_string()));
        let script = self
            .document
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected stream_document_answer call");
        script.into_stream()
    }
}

#[derive(Clone, Default)]
struct RecordingSpeech {
    spoken: Arc<Mutex<Vec<String>>>,
}

impl SpeechSynthesizer for RecordingSpeech {
    fn synthesize(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
}

fn new_engine(
    client: ScriptedClient,
) -> Orchestrator<ScriptedClient, MemoryStorage, NullSpeech> {
    Orchestrator::new(client, MemoryStorage::new(), NullSpeech, None)
}

async fn wait_until<F>(mut predicate: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..400 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// === Chat ===

#[tokio::test]
async fn chat_exchange_appends_user_then_settled_response() {
    let client = ScriptedClient::default();
    client.script_chat(Script::Fragments(vec![
        Ok("Hi".to_string()),
        Ok(" there!".to_string()),
    ]));
    let engine = new_engine(client);

    engine.submit(Surface::Chat, "hello", Vec::new()).await.unwrap();

    let messages = engine.messages(Surface::Chat);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].text(), "hello");
    assert_eq!(messages[1].role, Role::Model);
    assert_eq!(messages[1].text(), "Hi there!");
}

#[tokio::test]
async fn attachments_precede_text_in_the_user_message() {
    let client = ScriptedClient::default();
    client.script_chat(Script::Fragments(vec![Ok("ok".to_string())]));
    let engine = new_engine(client);

    let attachments = vec![AttachmentInput::new("image/png", b"pixels".to_vec())];
    engine
        .submit(Surface::Chat, "what is this?", attachments)
        .await
        .unwrap();

    let messages = engine.messages(Surface::Chat);
    assert!(matches!(messages[0].parts[0], Part::Attachment { .. }));
    assert!(matches!(messages[0].parts[1], Part::Text { .. }));
}

#[tokio::test]
async fn empty_submission_is_rejected_without_mutation() {
    let engine = new_engine(ScriptedClient::default());

    let err = engine
        .submit(Surface::Chat, "   ", Vec::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SubmitError::Composition(CompositionError::EmptySubmission)
    );
    assert!(engine.messages(Surface::Chat).is_empty());
}

#[tokio::test]
async fn mid_stream_error_replaces_partial_text_with_failure_text() {
    let client = ScriptedClient::default();
    client.script_chat(Script::Fragments(vec![
        Ok("par".to_string()),
        Err(ProviderError::Stream("connection reset".to_string())),
    ]));
    let engine = new_engine(client);

    let err = engine
        .submit(Surface::Chat, "hello", Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Provider(ProviderError::Stream(_))));

    let messages = engine.messages(Surface::Chat);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].text(), Surface::Chat.failure_text());
}

#[tokio::test]
async fn failed_request_appends_failure_text_without_a_placeholder() {
    let client = ScriptedClient::default();
    client.script_chat(Script::Fail(ProviderError::Api {
        status: 500,
        message: "boom".to_string(),
    }));
    let engine = new_engine(client);

    let err = engine
        .submit(Surface::Chat, "hello", Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Provider(ProviderError::Api { .. })));

    let messages = engine.messages(Surface::Chat);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Model);
    assert_eq!(messages[1].text(), Surface::Chat.failure_text());
}

// === Image lab ===

#[tokio::test]
async fn image_batch_appends_attachments_with_origin_prompt() {
    let client = ScriptedClient::default();
    client.script_images(Ok(vec![
        GeneratedImage {
            mime_type: "image/jpeg".to_string(),
            data: "YQ==".to_string(),
        },
        GeneratedImage {
            mime_type: "image/jpeg".to_string(),
            data: "Yg==".to_string(),
        },
    ]));
    let engine = new_engine(client);
    engine.set_image_options(ImageOptions {
        aspect_ratio: AspectRatio::Wide,
        count: 2,
    });

    engine
        .submit(Surface::ImageLab, "a red fox", Vec::new())
        .await
        .unwrap();

    let messages = engine.messages(Surface::ImageLab);
    assert_eq!(messages.len(), 2);
    let response = &messages[1];
    assert_eq!(response.parts.len(), 2);
    assert!(response
        .parts
        .iter()
        .all(|part| matches!(part, Part::Attachment { .. })));
    assert_eq!(response.origin_prompt.as_deref(), Some("a red fox"));
}

#[tokio::test]
async fn image_failure_records_the_image_failure_text() {
    let client = ScriptedClient::default();
    client.script_images(Err(ProviderError::Api {
        status: 429,
        message: "quota".to_string(),
    }));
    let engine = new_engine(client);

    let err = engine
        .submit(Surface::ImageLab, "a red fox", Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Provider(_)));

    let messages = engine.messages(Surface::ImageLab);
    assert_eq!(messages[1].text(), Surface::ImageLab.failure_text());
}

// === File analysis ===

#[tokio::test]
async fn analysis_requires_a_loaded_document() {
    let engine = new_engine(ScriptedClient::default());

    let err = engine
        .submit(Surface::FileAnalysis, "summarize", Vec::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SubmitError::Composition(CompositionError::MissingDocument)
    );
    assert!(engine.messages(Surface::FileAnalysis).is_empty());
}

#[tokio::test]
async fn analysis_passes_the_document_and_question_to_the_provider() {
    let client = ScriptedClient::default();
    client.script_document(Script::Fragments(vec![Ok("It is a report.".to_string())]));
    let engine = new_engine(client.clone());

    engine.load_document("quarterly numbers");
    engine
        .submit(Surface::FileAnalysis, "what is this?", Vec::new())
        .await
        .unwrap();

    let calls = client.document_calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![("quarterly numbers".to_string(), "what is this?".to_string())]
    );
    let messages = engine.messages(Surface::FileAnalysis);
    assert_eq!(messages[1].text(), "It is a report.");
}

#[tokio::test]
async fn loading_a_new_document_resets_the_analysis_conversation() {
    let client = ScriptedClient::default();
    client.script_document(Script::Fragments(vec![Ok("answer".to_string())]));
    let engine = new_engine(client);

    engine.load_document("first document");
    engine
        .submit(Surface::FileAnalysis, "question", Vec::new())
        .await
        .unwrap();
    assert_eq!(engine.messages(Surface::FileAnalysis).len(), 2);

    engine.load_document("second document");
    assert!(engine.messages(Surface::FileAnalysis).is_empty());
}

// === Conversation management ===

#[tokio::test]
async fn new_conversation_clears_only_the_target_surface() {
    let client = ScriptedClient::default();
    client.script_chat(Script::Fragments(vec![Ok("hi".to_string())]));
    client.script_images(Ok(vec![GeneratedImage {
        mime_type: "image/jpeg".to_string(),
        data: "YQ==".to_string(),
    }]));
    let engine = new_engine(client);

    engine.submit(Surface::Chat, "hello", Vec::new()).await.unwrap();
    engine
        .submit(Surface::ImageLab, "a fox", Vec::new())
        .await
        .unwrap();

    engine.new_conversation(Surface::Chat);
    assert!(engine.messages(Surface::Chat).is_empty());
    assert_eq!(engine.messages(Surface::ImageLab).len(), 2);
}

// === Supersession ===

#[tokio::test]
async fn second_submission_supersedes_the_active_stream() {
    let client = ScriptedClient::default();
    let (first_tx, first_rx) = mpsc::unbounded_channel();
    let (second_tx, second_rx) = mpsc::unbounded_channel();
    client.script_chat(Script::Channel(first_rx));
    client.script_chat(Script::Channel(second_rx));

    let engine = Arc::new(new_engine(client));

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.submit(Surface::Chat, "first", Vec::new()).await }
    });
    wait_until(|| engine.messages(Surface::Chat).len() == 2).await;

    first_tx.send(Ok("Hel".to_string())).unwrap();
    wait_until(|| engine.messages(Surface::Chat)[1].text() == "Hel").await;

    let second = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.submit(Surface::Chat, "second", Vec::new()).await }
    });
    wait_until(|| engine.messages(Surface::Chat).len() == 4).await;

    second_tx.send(Ok("done".to_string())).unwrap();
    drop(second_tx);
    second.await.unwrap().unwrap();

    // Late fragments for the superseded stream must not land anywhere.
    first_tx.send(Ok("lo, stale".to_string())).unwrap();
    drop(first_tx);
    first.await.unwrap().unwrap();

    let messages = engine.messages(Surface::Chat);
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[1].text(), "Hel");
    assert_eq!(messages[3].text(), "done");
}

// === Voice output ===

#[tokio::test]
async fn settled_chat_responses_are_spoken_when_voice_output_is_enabled() {
    let client = ScriptedClient::default();
    client.script_chat(Script::Fragments(vec![Ok("Hi there!".to_string())]));
    let speech = RecordingSpeech::default();
    let engine = Orchestrator::new(client, MemoryStorage::new(), speech.clone(), None);

    engine.set_voice_output(true);
    engine.submit(Surface::Chat, "hello", Vec::new()).await.unwrap();

    assert_eq!(speech.spoken.lock().unwrap().clone(), vec!["Hi there!"]);
}

#[tokio::test]
async fn voice_output_is_silent_when_disabled_and_off_chat() {
    let client = ScriptedClient::default();
    client.script_chat(Script::Fragments(vec![Ok("quiet".to_string())]));
    client.script_document(Script::Fragments(vec![Ok("answer".to_string())]));
    let speech = RecordingSpeech::default();
    let engine = Orchestrator::new(client, MemoryStorage::new(), speech.clone(), None);

    engine.submit(Surface::Chat, "hello", Vec::new()).await.unwrap();

    engine.set_voice_output(true);
    engine.load_document("doc");
    engine
        .submit(Surface::FileAnalysis, "question", Vec::new())
        .await
        .unwrap();

    assert!(speech.spoken.lock().unwrap().is_empty());
}

// === Persistence ===

#[tokio::test]
async fn history_survives_an_engine_restart_per_identity() {
    let storage = MemoryStorage::new();

    {
        let client = ScriptedClient::default();
        client.script_chat(Script::Fragments(vec![Ok("remembered".to_string())]));
        let engine = Orchestrator::new(
            client,
            storage.clone(),
            NullSpeech,
            Some("alice".to_string()),
        );
        engine.submit(Surface::Chat, "hello", Vec::new()).await.unwrap();
    }

    let alice = Orchestrator::new(
        ScriptedClient::default(),
        storage.clone(),
        NullSpeech,
        Some("alice".to_string()),
    );
    let messages = alice.messages(Surface::Chat);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].text(), "remembered");

    let bob = Orchestrator::new(
        ScriptedClient::default(),
        storage,
        NullSpeech,
        Some("bob".to_string()),
    );
    assert!(bob.messages(Surface::Chat).is_empty());
}
