use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{Local, Utc};
use tracing::{debug, info};

use crate::errors::{EngineError, Result};
use crate::generation::GenerationService;
use crate::models::{ChatMessage, Role, Subject, TutorMode, UserGrade};
use crate::store::StateStore;

/// The tutoring backend seam. [`GenerationService`] is the production
/// implementation; tests script their own.
#[async_trait]
pub trait TutorBackend: Send + Sync {
    async fn tutor_response(
        &self,
        history: &[ChatMessage],
        message: &str,
        grade: UserGrade,
        subject: Subject,
        mode: TutorMode,
    ) -> String;
}

#[async_trait]
impl TutorBackend for GenerationService {
    async fn tutor_response(
        &self,
        history: &[ChatMessage],
        message: &str,
        grade: UserGrade,
        subject: Subject,
        mode: TutorMode,
    ) -> String {
        GenerationService::tutor_response(self, history, message, grade, subject, mode).await
    }
}

/// Orchestrates tutor exchanges against the store.
///
/// Each exchange appends the student's message immediately, asks the backend
/// for a reply, then appends the reply and counts the session. Switching the
/// active subject (or starting a newer exchange) supersedes any in-flight
/// one: a superseded reply is dropped before it touches the store, so the
/// conversation never interleaves answers from an abandoned context.
pub struct TutorSession {
    store: Arc<StateStore>,
    backend: Arc<dyn TutorBackend>,
    exchange_seq: AtomicU64,
}

impl TutorSession {
    pub fn new(store: Arc<StateStore>, backend: Arc<dyn TutorBackend>) -> Self {
        Self {
            store,
            backend,
            exchange_seq: AtomicU64::new(0),
        }
    }

    /// Run one exchange. Returns `Ok(None)` when the exchange was superseded
    /// while the backend call was in flight.
    pub async fn send_message(&self, text: &str) -> Result<Option<ChatMessage>> {
        if text.trim().is_empty() {
            return Err(EngineError::Validation("empty tutor message".into()));
        }

        let state = self.store.snapshot();
        let user = state
            .user
            .as_ref()
            .ok_or_else(|| EngineError::Validation("no user profile set".into()))?;
        let subject = state
            .current_subject
            .ok_or_else(|| EngineError::Validation("no active subject".into()))?;
        let grade = user.grade;
        let mode = state.tutor_mode;
        let history = state.messages;

        self.store
            .add_message(Role::User, text.to_string(), Utc::now())?;

        let ticket = self.exchange_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let reply = self
            .backend
            .tutor_response(&history, text, grade, subject, mode)
            .await;

        if self.exchange_seq.load(Ordering::SeqCst) != ticket {
            debug!(subject = %subject, "tutor exchange superseded, dropping reply");
            return Ok(None);
        }

        let message = self.store.add_message(Role::Assistant, reply, Utc::now())?;
        self.store
            .increment_session_count(Local::now().date_naive())?;
        Ok(Some(message))
    }

    /// Change the active subject, invalidating any in-flight exchange.
    pub fn switch_subject(&self, subject: Option<Subject>) -> Result<()> {
        self.exchange_seq.fetch_add(1, Ordering::SeqCst);
        self.store.set_current_subject(subject)
    }

    pub fn set_mode(&self, mode: TutorMode) -> Result<()> {
        self.store.set_tutor_mode(mode)
    }

    /// Drain a parked dashboard query into the conversation, if the session
    /// is ready for it. Without a user profile the query stays parked for a
    /// later attempt.
    pub async fn dispatch_pending(&self) -> Result<Option<ChatMessage>> {
        if self.store.snapshot().user.is_none() {
            return Ok(None);
        }
        let Some(query) = self.store.drain_pending_query()? else {
            return Ok(None);
        };
        info!(subject = %query.target_subject, "dispatching parked query to tutor");
        // Draining already switched the active subject.
        self.exchange_seq.fetch_add(1, Ordering::SeqCst);
        self.send_message(&query.query_text).await
    }
}
