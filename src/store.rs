use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::PendingQuery;
use crate::errors::{EngineError, Result};
use crate::models::*;
use crate::persistence::PersistenceGateway;
use crate::scheduler::{INITIAL_EASE_FACTOR, ReviewOutcome, ReviewScheduler};
use crate::stats;

/// Subscribers receive the full state after every mutation.
pub type Listener = Arc<dyn Fn(&AppState) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct StoreInner {
    state: AppState,
    subscribers: Vec<(SubscriberId, Listener)>,
    next_subscriber: u64,
}

/// Single source of truth for all learner data.
///
/// Every mutation goes through [`StateStore::mutate`]: the in-memory update
/// is applied atomically, subscribers are notified synchronously with the
/// new state, and the debounced persister is signalled. Mutating the store
/// from inside a subscriber callback is rejected with
/// [`EngineError::ReentrantMutation`]; mutations from other threads during
/// a notification window are ordinary concurrent mutations and go through.
pub struct StateStore {
    inner: Mutex<StoreInner>,
    notifying_threads: Mutex<Vec<ThreadId>>,
    gateway: Arc<dyn PersistenceGateway>,
    scheduler: ReviewScheduler,
    persist_seq: watch::Sender<u64>,
}

/// Deregisters the notifying thread even if a subscriber panics.
struct NotifyGuard<'a> {
    registry: &'a Mutex<Vec<ThreadId>>,
    thread: ThreadId,
}

impl<'a> NotifyGuard<'a> {
    fn enter(registry: &'a Mutex<Vec<ThreadId>>) -> Self {
        let thread = thread::current().id();
        registry.lock().unwrap().push(thread);
        Self { registry, thread }
    }
}

impl Drop for NotifyGuard<'_> {
    fn drop(&mut self) {
        let mut threads = self.registry.lock().unwrap();
        if let Some(pos) = threads.iter().position(|t| *t == self.thread) {
            threads.remove(pos);
        }
    }
}

impl StateStore {
    /// Hydrate the store from the gateway. Never fails: a missing,
    /// unreadable, or schema-mismatched record degrades to the default
    /// state.
    pub async fn initialize(gateway: Arc<dyn PersistenceGateway>) -> Self {
        let state = match gateway.load().await {
            Ok(Some(state)) => {
                info!(
                    flashcards = state.flashcards.len(),
                    messages = state.messages.len(),
                    "hydrated learner state"
                );
                state
            }
            Ok(None) => AppState::default(),
            Err(e) => {
                warn!(error = %e, "failed to load persisted state, using defaults");
                AppState::default()
            }
        };

        let (persist_seq, _) = watch::channel(0u64);
        Self {
            inner: Mutex::new(StoreInner {
                state,
                subscribers: Vec::new(),
                next_subscriber: 0,
            }),
            notifying_threads: Mutex::new(Vec::new()),
            gateway,
            scheduler: ReviewScheduler::new(),
            persist_seq,
        }
    }

    /// Apply a mutation as a single atomic step. The closure must validate
    /// before touching the state so a failed mutation leaves nothing behind.
    fn mutate<T>(&self, f: impl FnOnce(&mut AppState) -> Result<T>) -> Result<T> {
        // Only the thread currently delivering notifications is re-entrant;
        // other threads mutating during the window are merely concurrent.
        if self
            .notifying_threads
            .lock()
            .unwrap()
            .contains(&thread::current().id())
        {
            return Err(EngineError::ReentrantMutation);
        }

        let (value, snapshot, listeners) = {
            let mut inner = self.inner.lock().unwrap();
            let value = f(&mut inner.state)?;
            let snapshot = inner.state.clone();
            let listeners: Vec<Listener> = inner
                .subscribers
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            (value, snapshot, listeners)
        };

        // Listeners run outside the state lock, in insertion order.
        {
            let _guard = NotifyGuard::enter(&self.notifying_threads);
            for listener in &listeners {
                listener(&snapshot);
            }
        }

        self.persist_seq.send_modify(|seq| *seq += 1);
        Ok(value)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> AppState {
        self.inner.lock().unwrap().state.clone()
    }

    /// The due review queue at `now`, ordered by the scheduler's tie-break
    /// rules.
    pub fn get_due_flashcards(&self, now: DateTime<Utc>) -> Vec<Flashcard> {
        let inner = self.inner.lock().unwrap();
        self.scheduler
            .due_queue(&inner.state.flashcards, now)
            .into_iter()
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    pub fn subscribe(&self, listener: Listener) -> SubscriberId {
        let mut inner = self.inner.lock().unwrap();
        let id = SubscriberId(inner.next_subscriber);
        inner.next_subscriber += 1;
        inner.subscribers.push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        inner.subscribers.len() != before
    }

    // -----------------------------------------------------------------------
    // Profile lifecycle
    // -----------------------------------------------------------------------

    pub fn set_user(&self, profile: UserProfile) -> Result<()> {
        self.mutate(|state| {
            if profile.name.trim().is_empty() {
                return Err(EngineError::Validation("user name must not be empty".into()));
            }
            if profile.subjects.is_empty() {
                return Err(EngineError::Validation(
                    "user must enroll in at least one subject".into(),
                ));
            }
            state.user = Some(profile);
            Ok(())
        })
    }

    /// Reset everything to the default state and persist the reset
    /// immediately.
    pub async fn logout(&self) -> Result<()> {
        self.mutate(|state| {
            *state = AppState::default();
            Ok(())
        })?;
        info!("learner state reset");
        self.flush().await
    }

    // -----------------------------------------------------------------------
    // Tutor conversation
    // -----------------------------------------------------------------------

    pub fn set_current_subject(&self, subject: Option<Subject>) -> Result<()> {
        self.mutate(|state| {
            state.current_subject = subject;
            Ok(())
        })
    }

    pub fn set_tutor_mode(&self, mode: TutorMode) -> Result<()> {
        self.mutate(|state| {
            state.tutor_mode = mode;
            Ok(())
        })
    }

    pub fn add_message(&self, role: Role, text: String, now: DateTime<Utc>) -> Result<ChatMessage> {
        self.mutate(|state| {
            let message = ChatMessage {
                id: Uuid::new_v4(),
                role,
                text,
                timestamp: now,
            };
            state.messages.push(message.clone());
            Ok(message)
        })
    }

    pub fn clear_messages(&self) -> Result<()> {
        self.mutate(|state| {
            state.messages.clear();
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Flashcards
    // -----------------------------------------------------------------------

    /// Insert a generated batch, assigning ids and default scheduling
    /// fields. New cards are due immediately.
    pub fn add_flashcards(
        &self,
        cards: Vec<GeneratedFlashcard>,
        subject: Subject,
        grade: UserGrade,
        now: DateTime<Utc>,
    ) -> Result<Vec<Flashcard>> {
        self.mutate(|state| {
            if cards.is_empty() {
                return Err(EngineError::Validation("empty flashcard batch".into()));
            }
            if cards
                .iter()
                .any(|c| c.front.trim().is_empty() || c.back.trim().is_empty())
            {
                return Err(EngineError::Validation(
                    "flashcard with empty front or back".into(),
                ));
            }

            let new_cards: Vec<Flashcard> = cards
                .into_iter()
                .map(|c| Flashcard {
                    id: Uuid::new_v4(),
                    front: c.front,
                    back: c.back,
                    subject,
                    grade_level: grade,
                    difficulty: c.difficulty,
                    next_review_date: now,
                    last_reviewed: None,
                    repetition_count: 0,
                    ease_factor: INITIAL_EASE_FACTOR,
                })
                .collect();

            debug!(count = new_cards.len(), subject = %subject, "adding flashcards");
            state.flashcards.extend(new_cards.clone());
            Ok(new_cards)
        })
    }

    /// Apply a review outcome to one card. Unknown ids are rejected without
    /// touching any state.
    pub fn review_flashcard(
        &self,
        id: Uuid,
        outcome: ReviewOutcome,
        now: DateTime<Utc>,
    ) -> Result<Flashcard> {
        let scheduler = self.scheduler;
        self.mutate(move |state| {
            let card = state
                .flashcards
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or(EngineError::CardNotFound(id))?;
            let updated = scheduler.apply_outcome(card, outcome, now);
            *card = updated.clone();
            Ok(updated)
        })
    }

    /// Review with a raw outcome code from the consumer surface;
    /// codes outside {1, 3} are invalid input.
    pub fn review_flashcard_by_code(
        &self,
        id: Uuid,
        code: i32,
        now: DateTime<Utc>,
    ) -> Result<Flashcard> {
        let outcome = ReviewOutcome::from_code(code).ok_or(EngineError::InvalidOutcome(code))?;
        self.review_flashcard(id, outcome, now)
    }

    /// Drop every flashcard. Individual deletion is deliberately not
    /// offered; the collection only shrinks wholesale.
    pub fn reset_flashcards(&self) -> Result<()> {
        self.mutate(|state| {
            state.flashcards.clear();
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub fn increment_study_time(&self, minutes: u32, today: NaiveDate) -> Result<()> {
        self.mutate(|state| {
            state.stats.total_study_minutes += u64::from(minutes);
            stats::record_activity(&mut state.stats, &mut state.last_activity_date, today);
            Ok(())
        })
    }

    /// One card navigation event during review, regardless of outcome.
    pub fn increment_review_count(&self, today: NaiveDate) -> Result<()> {
        self.mutate(|state| {
            state.stats.cards_reviewed += 1;
            stats::record_activity(&mut state.stats, &mut state.last_activity_date, today);
            Ok(())
        })
    }

    /// One completed request/response exchange with the tutor.
    pub fn increment_session_count(&self, today: NaiveDate) -> Result<()> {
        self.mutate(|state| {
            state.stats.tutor_sessions += 1;
            stats::record_activity(&mut state.stats, &mut state.last_activity_date, today);
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Weekly plan
    // -----------------------------------------------------------------------

    /// Store a freshly generated plan, replacing any existing one wholesale.
    pub fn set_weekly_plan(
        &self,
        tasks: Vec<GeneratedTask>,
        now: DateTime<Utc>,
    ) -> Result<WeeklyPlan> {
        self.mutate(|state| {
            if tasks.is_empty() {
                return Err(EngineError::Validation("empty weekly plan".into()));
            }

            let plan = WeeklyPlan {
                week_id: Uuid::new_v4().to_string(),
                generated_at: now,
                tasks: tasks
                    .into_iter()
                    .map(|t| PlannerTask {
                        id: Uuid::new_v4(),
                        day: t.day,
                        subject: t.subject,
                        topic: t.topic,
                        duration_minutes: t.duration_minutes,
                        completed: false,
                    })
                    .collect(),
            };
            state.weekly_plan = Some(plan.clone());
            Ok(plan)
        })
    }

    pub fn set_task_completed(&self, task_id: Uuid, completed: bool) -> Result<()> {
        self.mutate(|state| {
            let task = state
                .weekly_plan
                .as_mut()
                .and_then(|plan| plan.tasks.iter_mut().find(|t| t.id == task_id))
                .ok_or_else(|| {
                    EngineError::Validation(format!("planner task not found: {task_id}"))
                })?;
            task.completed = completed;
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Query bridge
    // -----------------------------------------------------------------------

    /// Park a question for the tutoring chat; a still-pending query is
    /// overwritten (last-offer-wins).
    pub fn offer_pending_query(&self, query_text: String, subject: Subject) -> Result<()> {
        self.mutate(|state| {
            if query_text.trim().is_empty() {
                return Err(EngineError::Validation("empty pending query".into()));
            }
            if state.bridge.is_pending() {
                debug!("overwriting pending tutor query");
            }
            state.bridge.offer(query_text, subject);
            Ok(())
        })
    }

    /// Take the pending query, if any, and switch the active subject to the
    /// one bundled with it. Draining an idle bridge mutates nothing.
    pub fn drain_pending_query(&self) -> Result<Option<PendingQuery>> {
        {
            let inner = self.inner.lock().unwrap();
            if !inner.state.bridge.is_pending() {
                return Ok(None);
            }
        }
        self.mutate(|state| {
            let query = state.bridge.drain();
            if let Some(ref q) = query {
                state.current_subject = Some(q.target_subject);
            }
            Ok(query)
        })
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write the current state to the gateway immediately.
    pub async fn flush(&self) -> Result<()> {
        let snapshot = self.snapshot();
        self.gateway
            .save(&snapshot)
            .await
            .map_err(EngineError::Persistence)
    }

    /// Run the debounced background writer. Writes are coalesced over the
    /// debounce window and flushed in order, so the last mutation always
    /// wins; the window bounds the data lost to a crash before flush.
    pub fn spawn_autoflush(self: &Arc<Self>, debounce: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let mut seq = self.persist_seq.subscribe();
        tokio::spawn(async move {
            while seq.changed().await.is_ok() {
                tokio::time::sleep(debounce).await;
                seq.borrow_and_update();
                if let Err(e) = store.flush().await {
                    warn!(error = %e, "debounced state flush failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryGateway;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;

    async fn empty_store() -> Arc<StateStore> {
        Arc::new(StateStore::initialize(Arc::new(MemoryGateway::new())).await)
    }

    fn profile() -> UserProfile {
        UserProfile {
            name: "Kofi".to_string(),
            grade: UserGrade::Jhs3,
            subjects: vec![Subject::Math, Subject::English],
            setup_complete: true,
            daily_goal_minutes: None,
        }
    }

    fn batch(n: usize) -> Vec<GeneratedFlashcard> {
        (0..n)
            .map(|i| GeneratedFlashcard {
                front: format!("Q{i}"),
                back: format!("A{i}"),
                difficulty: Difficulty::Medium,
            })
            .collect()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_with_empty_gateway_uses_defaults() {
        let store = empty_store().await;
        let state = store.snapshot();
        assert_eq!(state, AppState::default());
    }

    #[tokio::test]
    async fn test_initialize_hydrates_persisted_state() {
        let gateway = Arc::new(MemoryGateway::new());
        let store = StateStore::initialize(gateway.clone()).await;
        store.set_user(profile()).unwrap();
        store.flush().await.unwrap();

        let rehydrated = StateStore::initialize(gateway).await;
        assert_eq!(rehydrated.snapshot().user.unwrap().name, "Kofi");
    }

    #[tokio::test]
    async fn test_initialize_survives_corrupt_record() {
        let gateway = Arc::new(MemoryGateway::with_raw(b"garbage".to_vec()));
        let store = StateStore::initialize(gateway).await;
        assert_eq!(store.snapshot(), AppState::default());
    }

    #[tokio::test]
    async fn test_set_user_requires_subjects() {
        let store = empty_store().await;
        let mut p = profile();
        p.subjects.clear();
        assert!(matches!(
            store.set_user(p),
            Err(EngineError::Validation(_))
        ));
        assert!(store.snapshot().user.is_none());
    }

    #[tokio::test]
    async fn test_add_flashcards_assigns_scheduling_defaults() {
        let store = empty_store().await;
        let now = Utc::now();
        let added = store
            .add_flashcards(batch(3), Subject::Math, UserGrade::Jhs3, now)
            .unwrap();

        assert_eq!(added.len(), 3);
        for card in &added {
            assert_eq!(card.next_review_date, now);
            assert_eq!(card.repetition_count, 0);
            assert!((card.ease_factor - INITIAL_EASE_FACTOR).abs() < 1e-9);
        }
        // Newly created cards are immediately due.
        assert_eq!(store.get_due_flashcards(now).len(), 3);
    }

    #[tokio::test]
    async fn test_add_flashcards_rejects_empty_batch_without_mutation() {
        let store = empty_store().await;
        let result = store.add_flashcards(vec![], Subject::Math, UserGrade::Jhs3, Utc::now());
        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert!(store.snapshot().flashcards.is_empty());
    }

    #[tokio::test]
    async fn test_review_unknown_card_is_card_not_found() {
        let store = empty_store().await;
        let result = store.review_flashcard(Uuid::new_v4(), ReviewOutcome::Good, Utc::now());
        assert!(matches!(result, Err(EngineError::CardNotFound(_))));
    }

    #[tokio::test]
    async fn test_review_by_code_rejects_unknown_codes() {
        let store = empty_store().await;
        let now = Utc::now();
        let added = store
            .add_flashcards(batch(1), Subject::Math, UserGrade::Jhs3, now)
            .unwrap();

        let result = store.review_flashcard_by_code(added[0].id, 2, now);
        assert!(matches!(result, Err(EngineError::InvalidOutcome(2))));

        let updated = store.review_flashcard_by_code(added[0].id, 3, now).unwrap();
        assert_eq!(updated.repetition_count, 1);
    }

    #[tokio::test]
    async fn test_review_updates_stored_card() {
        let store = empty_store().await;
        let now = Utc::now();
        let added = store
            .add_flashcards(batch(1), Subject::Math, UserGrade::Jhs3, now)
            .unwrap();

        store
            .review_flashcard(added[0].id, ReviewOutcome::Good, now)
            .unwrap();

        let state = store.snapshot();
        assert_eq!(state.flashcards[0].repetition_count, 1);
        assert!(state.flashcards[0].next_review_date > now);
        assert!(store.get_due_flashcards(now).is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_run_in_insertion_order_with_full_state() {
        let store = empty_store().await;
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            store.subscribe(Arc::new(move |state: &AppState| {
                order.lock().unwrap().push((tag, state.stats.cards_reviewed));
            }));
        }

        store.increment_review_count(day(4)).unwrap();
        let seen = order.lock().unwrap().clone();
        assert_eq!(seen, vec![("first", 1), ("second", 1), ("third", 1)]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_notifications() {
        let store = empty_store().await;
        let calls = Arc::new(AtomicUsize::new(0));

        let id = {
            let calls = Arc::clone(&calls);
            store.subscribe(Arc::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }))
        };

        store.increment_review_count(day(4)).unwrap();
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.increment_review_count(day(4)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mutation_from_subscriber_is_rejected() {
        let store = empty_store().await;
        let result: Arc<Mutex<Option<Result<()>>>> = Arc::new(Mutex::new(None));

        {
            let store = Arc::clone(&store);
            let result = Arc::clone(&result);
            let weak_store = Arc::downgrade(&store);
            store.subscribe(Arc::new(move |_| {
                if let Some(store) = weak_store.upgrade() {
                    *result.lock().unwrap() = Some(store.set_tutor_mode(TutorMode::Drill));
                }
            }));
        }

        store.increment_review_count(day(4)).unwrap();
        let inner = result.lock().unwrap().take().unwrap();
        assert!(matches!(inner, Err(EngineError::ReentrantMutation)));
        // The rejected mutation left the state untouched.
        assert_eq!(store.snapshot().tutor_mode, TutorMode::Explain);
    }

    #[tokio::test]
    async fn test_mutation_from_another_thread_during_notification_succeeds() {
        let store = empty_store().await;

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);
        let first_call = AtomicBool::new(true);

        // The first notification parks inside the listener until released,
        // holding the notification window open.
        store.subscribe(Arc::new(move |_| {
            if first_call.swap(false, Ordering::SeqCst) {
                entered_tx.lock().unwrap().send(()).unwrap();
                release_rx.lock().unwrap().recv().unwrap();
            }
        }));

        let blocked = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.increment_review_count(day(4)))
        };
        entered_rx.recv().unwrap();

        // A different thread mutating mid-notification is concurrent, not
        // re-entrant, and must go through.
        store.increment_study_time(1, day(4)).unwrap();

        release_tx.send(()).unwrap();
        blocked.join().unwrap().unwrap();

        let stats = store.snapshot().stats;
        assert_eq!(stats.cards_reviewed, 1);
        assert_eq!(stats.total_study_minutes, 1);
    }

    #[tokio::test]
    async fn test_streak_across_mutation_kinds() {
        let store = empty_store().await;

        store.increment_study_time(1, day(4)).unwrap();
        assert_eq!(store.snapshot().stats.streak_days, 1);

        store.increment_review_count(day(5)).unwrap();
        assert_eq!(store.snapshot().stats.streak_days, 2);

        store.increment_session_count(day(5)).unwrap();
        assert_eq!(store.snapshot().stats.streak_days, 2);

        store.increment_study_time(1, day(8)).unwrap();
        assert_eq!(store.snapshot().stats.streak_days, 1);
    }

    #[tokio::test]
    async fn test_weekly_plan_is_replaced_wholesale() {
        let store = empty_store().await;
        let now = Utc::now();
        let first = store
            .set_weekly_plan(
                vec![GeneratedTask {
                    day: "Monday".into(),
                    subject: "Mathematics".into(),
                    topic: "Algebra".into(),
                    duration_minutes: 30,
                }],
                now,
            )
            .unwrap();

        let second = store
            .set_weekly_plan(
                vec![
                    GeneratedTask {
                        day: "Tuesday".into(),
                        subject: "Physics".into(),
                        topic: "Waves".into(),
                        duration_minutes: 45,
                    },
                    GeneratedTask {
                        day: "Wednesday".into(),
                        subject: "Physics".into(),
                        topic: "Optics".into(),
                        duration_minutes: 45,
                    },
                ],
                now,
            )
            .unwrap();

        let plan = store.snapshot().weekly_plan.unwrap();
        assert_ne!(first.week_id, second.week_id);
        assert_eq!(plan.tasks.len(), 2);
        assert!(plan.tasks.iter().all(|t| !t.completed));
    }

    #[tokio::test]
    async fn test_set_task_completed() {
        let store = empty_store().await;
        let plan = store
            .set_weekly_plan(
                vec![GeneratedTask {
                    day: "Friday".into(),
                    subject: "History".into(),
                    topic: "Independence".into(),
                    duration_minutes: 20,
                }],
                Utc::now(),
            )
            .unwrap();

        store.set_task_completed(plan.tasks[0].id, true).unwrap();
        assert!(store.snapshot().weekly_plan.unwrap().tasks[0].completed);

        let missing = store.set_task_completed(Uuid::new_v4(), true);
        assert!(matches!(missing, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn test_drain_switches_subject_and_double_drain_is_empty() {
        let store = empty_store().await;
        store
            .offer_pending_query("Explain X".into(), Subject::Math)
            .unwrap();

        let query = store.drain_pending_query().unwrap().unwrap();
        assert_eq!(query.query_text, "Explain X");
        assert_eq!(store.snapshot().current_subject, Some(Subject::Math));

        assert!(store.drain_pending_query().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_drain_on_idle_does_not_notify() {
        let store = empty_store().await;
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            store.subscribe(Arc::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert!(store.drain_pending_query().unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_logout_resets_everything_and_persists() {
        let gateway = Arc::new(MemoryGateway::new());
        let store = StateStore::initialize(gateway.clone()).await;

        store.set_user(profile()).unwrap();
        store
            .add_flashcards(batch(2), Subject::Math, UserGrade::Jhs3, Utc::now())
            .unwrap();
        store
            .offer_pending_query("lingering".into(), Subject::Math)
            .unwrap();
        store.increment_study_time(5, day(4)).unwrap();

        store.logout().await.unwrap();

        assert_eq!(store.snapshot(), AppState::default());
        assert!(gateway.save_count() >= 1);
        assert_eq!(gateway.load().await.unwrap().unwrap(), AppState::default());
    }

    #[tokio::test]
    async fn test_flush_writes_latest_snapshot() {
        let gateway = Arc::new(MemoryGateway::new());
        let store = StateStore::initialize(gateway.clone()).await;

        store.increment_study_time(7, day(4)).unwrap();
        store.increment_study_time(3, day(4)).unwrap();
        store.flush().await.unwrap();

        let persisted = gateway.load().await.unwrap().unwrap();
        assert_eq!(persisted.stats.total_study_minutes, 10);
    }

    #[tokio::test]
    async fn test_autoflush_coalesces_mutations() {
        let gateway = Arc::new(MemoryGateway::new());
        let store = Arc::new(StateStore::initialize(gateway.clone()).await);
        let flusher = store.spawn_autoflush(Duration::from_millis(20));

        for _ in 0..10 {
            store.increment_review_count(day(4)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let persisted = gateway.load().await.unwrap().unwrap();
        assert_eq!(persisted.stats.cards_reviewed, 10);
        // All ten mutations landed within one debounce window.
        assert!(gateway.save_count() < 10);
        flusher.abort();
    }
}
