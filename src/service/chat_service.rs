use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::db::message_store::MessageStore;
use crate::errors::AppError;
use crate::models::ChatTurn;
use crate::service::dispatcher::IntentRegistry;
use crate::service::intent::classify;

/// Items of one response stream. An `Err` ends the stream abnormally.
pub type SessionEvent = Result<ChatTurn, AppError>;

const EVENT_BUFFER: usize = 4;

#[derive(Clone)]
pub struct ChatService {
    store: MessageStore,
    registry: Arc<IntentRegistry>,
    max_prompt_length: usize,
}

impl ChatService {
    pub fn new(store: MessageStore, registry: IntentRegistry, max_prompt_length: usize) -> Self {
        Self { store, registry: Arc::new(registry), max_prompt_length }
    }

    pub async fn get_messages(&self) -> Result<Vec<ChatTurn>, AppError> {
        self.store.get_all().await
    }

    fn validate_prompt(&self, prompt: Option<String>) -> Result<String, AppError> {
        let prompt = prompt.unwrap_or_default();
        if prompt.trim().is_empty() {
            return Err(AppError::EmptyField { field_name: "prompt".to_string() });
        }
        if prompt.len() > self.max_prompt_length {
            return Err(AppError::FieldTooLong {
                field_name: "prompt".to_string(),
                max_length: self.max_prompt_length,
                actual_length: prompt.len(),
            });
        }
        Ok(prompt)
    }

    /// Starts a chat session for `prompt` and returns its event stream.
    ///
    /// Validation and the history read happen before anything is streamed, so
    /// a bad prompt or an unreadable store fails the request outright. The
    /// stream then yields the user echo, followed by the model reply (or an
    /// in-band error reply when generation fails).
    pub async fn chat(
        &self,
        prompt: Option<String>,
    ) -> Result<mpsc::Receiver<SessionEvent>, AppError> {
        let prompt = self.validate_prompt(prompt)?;
        let history = self.store.get_all().await?;

        let intent = classify(&prompt);
        let request_id = Uuid::new_v4();
        let span = info_span!("chat", %request_id, %intent);
        debug!(parent: &span, history_len = history.len(), "Classified prompt");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let svc = self.clone();
        tokio::spawn(
            async move {
                let user = ChatTurn::user(prompt);
                if tx.send(Ok(user.clone())).await.is_err() {
                    return;
                }

                let outcome = tokio::select! {
                    outcome = svc.registry.dispatch(intent, &user, &history) => outcome,
                    _ = tx.closed() => {
                        info!("Client disconnected, abandoning generation");
                        return;
                    }
                };

                match outcome {
                    Ok((reply, exchange)) => {
                        if tx.send(Ok(reply)).await.is_err() {
                            info!("Client disconnected before the reply was delivered");
                            return;
                        }
                        if let Err(e) = svc.store.append(&exchange).await {
                            error!("Failed to persist exchange: {e}");
                            let _ = tx.send(Err(e)).await;
                        }
                    }
                    Err(e) => {
                        warn!("Generation failed: {e}");
                        let _ = tx.send(Ok(ChatTurn::model_error(&e))).await;
                    }
                }
            }
            .instrument(span),
        );

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::agent::Generator;
    use crate::models::{MessageType, Role};
    use crate::schemas::fixtures::*;
    use crate::schemas::StructuredResult;
    use crate::service::dispatcher::testing::{registry_with, CannedGenerator};
    use crate::service::dispatcher::{template_for, Route};
    use crate::service::intent::Intent;

    /// Sets its flag when dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Never finishes; records when it starts and when its call is dropped.
    struct Parked {
        started: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Generator for Parked {
        async fn generate(
            &self,
            _prompt: &str,
            _history: &[ChatTurn],
        ) -> Result<StructuredResult, AppError> {
            let _guard = DropFlag(self.dropped.clone());
            self.started.store(true, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    /// Holds its reply until the gate is opened.
    struct Gated {
        gate: Arc<Notify>,
        result: StructuredResult,
    }

    #[async_trait]
    impl Generator for Gated {
        async fn generate(
            &self,
            _prompt: &str,
            _history: &[ChatTurn],
        ) -> Result<StructuredResult, AppError> {
            self.gate.notified().await;
            Ok(self.result.clone())
        }
    }

    async fn wait_for(flag: &AtomicBool) -> bool {
        for _ in 0..100 {
            if flag.load(Ordering::SeqCst) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        flag.load(Ordering::SeqCst)
    }

    async fn service_with(result: Result<StructuredResult, &str>) -> ChatService {
        let generator = match result {
            Ok(r) => CannedGenerator::ok(r),
            Err(msg) => CannedGenerator::failing(msg),
        };
        let store = MessageStore::in_memory().await.unwrap();
        ChatService::new(store, registry_with(generator), 8000)
    }

    async fn drain(mut rx: mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn success_emits_echo_then_reply_and_persists() {
        let svc = service_with(Ok(StructuredResult::TaskList(task_list(3)))).await;

        let rx = svc.chat(Some("Plan my week with 3 tasks".into())).await.unwrap();
        let events: Vec<ChatTurn> = drain(rx).await.into_iter().map(Result::unwrap).collect();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].role, Role::User);
        assert_eq!(events[0].content, "Plan my week with 3 tasks");
        assert_eq!(events[1].role, Role::Model);
        assert_eq!(
            events[1].content,
            "I've created a structured task list for you with 3 tasks."
        );

        // The channel closes only after the append finished.
        assert_eq!(svc.get_messages().await.unwrap(), events);
    }

    #[tokio::test]
    async fn failure_emits_error_turn_and_persists_nothing() {
        let svc = service_with(Err("transport error")).await;
        let before = svc.store.count().await.unwrap();

        let rx = svc.chat(Some("Review my blender".into())).await.unwrap();
        let events = drain(rx).await;

        assert_eq!(events.len(), 2);
        let reply = events[1].as_ref().unwrap();
        assert_eq!(reply.role, Role::Model);
        assert_eq!(reply.message_type, MessageType::Text);
        assert!(reply.structured_data.is_none());
        assert!(reply.content.starts_with("Sorry, I encountered an error:"));
        assert_eq!(svc.store.count().await.unwrap(), before);
    }

    #[tokio::test]
    async fn history_accumulates_across_requests() {
        let svc = service_with(Ok(StructuredResult::Weather(forecast("Paris")))).await;
        drain(svc.chat(Some("What's the weather in Paris?".into())).await.unwrap()).await;
        drain(svc.chat(Some("And tomorrow's forecast?".into())).await.unwrap()).await;

        let turns = svc.get_messages().await.unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].content, "What's the weather in Paris?");
        assert_eq!(turns[1].content, "Here's the weather forecast for Paris.");
        assert_eq!(turns[2].content, "And tomorrow's forecast?");
    }

    #[tokio::test]
    async fn missing_or_blank_prompt_is_rejected() {
        let svc = service_with(Ok(StructuredResult::PlainText("hi".into()))).await;
        for prompt in [None, Some(String::new()), Some("   ".to_string())] {
            let err = svc.chat(prompt).await.unwrap_err();
            assert!(err.is_validation());
        }
        assert_eq!(svc.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn overlong_prompt_is_rejected() {
        let store = MessageStore::in_memory().await.unwrap();
        let registry = registry_with(CannedGenerator::ok(StructuredResult::PlainText("x".into())));
        let svc = ChatService::new(store, registry, 10);
        let err = svc.chat(Some("a".repeat(11))).await.unwrap_err();
        assert!(matches!(err, AppError::FieldTooLong { actual_length: 11, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_client_abandons_generation_without_writing() {
        let started = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicBool::new(false));
        let parked = Arc::new(Parked { started: started.clone(), dropped: dropped.clone() });
        let store = MessageStore::in_memory().await.unwrap();
        let svc = ChatService::new(store, registry_with(parked), 8000);

        let mut rx = svc.chat(Some("hello there".into())).await.unwrap();
        let echo = rx.recv().await.unwrap().unwrap();
        assert_eq!(echo.role, Role::User);
        assert!(wait_for(&started).await, "generator never started");
        assert!(!dropped.load(Ordering::SeqCst));

        drop(rx);

        assert!(wait_for(&dropped).await, "generator call was not abandoned");
        assert_eq!(svc.store.count().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn generator_timeout_becomes_error_turn() {
        let slow = CannedGenerator::slow(
            StructuredResult::PlainText("too late".into()),
            Duration::from_secs(60),
        );
        let registry = IntentRegistry::empty(Some(Duration::from_secs(5)))
            .with_route(Intent::General, Route::new(template_for(Intent::General), slow));
        let store = MessageStore::in_memory().await.unwrap();
        let svc = ChatService::new(store, registry, 8000);

        let events = drain(svc.chat(Some("hello there".into())).await.unwrap()).await;

        assert_eq!(events.len(), 2);
        let reply = events[1].as_ref().unwrap();
        assert_eq!(reply.role, Role::Model);
        assert_eq!(reply.message_type, MessageType::Text);
        assert_eq!(
            reply.content,
            "Sorry, I encountered an error: generator timed out after 5s"
        );
        assert_eq!(svc.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_append_ends_stream_with_error() {
        let gate = Arc::new(Notify::new());
        let gated = Arc::new(Gated {
            gate: gate.clone(),
            result: StructuredResult::PlainText("hi!".into()),
        });
        let store = MessageStore::in_memory().await.unwrap();
        let svc = ChatService::new(store.clone(), registry_with(gated), 8000);

        let mut rx = svc.chat(Some("hello there".into())).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap().role, Role::User);

        // History was read already; the append is the next store access.
        store.execute_raw("DROP TABLE messages").await.unwrap();
        gate.notify_one();

        let reply = rx.recv().await.unwrap().unwrap();
        assert_eq!(reply.role, Role::Model);
        assert_eq!(reply.content, "hi!");
        let end = rx.recv().await.unwrap();
        assert!(matches!(end, Err(AppError::DatabaseQueryFailed { .. })));
        assert!(rx.recv().await.is_none());

        store.init().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
