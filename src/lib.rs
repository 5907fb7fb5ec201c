//! Lexis engine: the local learning-state core of a personal study
//! companion for Ghanaian students.
//!
//! The engine owns all learner data in a single [`store::StateStore`],
//! schedules flashcard reviews with an SM-2 style scheduler, aggregates
//! study statistics with a daily streak, hands dashboard questions to the
//! tutoring chat through a single-slot query bridge, and persists the whole
//! state as one versioned JSON record with debounced writes.

pub mod bridge;
pub mod config;
pub mod errors;
pub mod generation;
pub mod llm_providers;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod tutor;

pub use bridge::{PendingQuery, QueryBridge};
pub use config::Config;
pub use errors::{EngineError, Result};
pub use generation::GenerationService;
pub use llm_providers::{LlmProvider, LlmProviderType};
pub use models::AppState;
pub use persistence::{FileGateway, MemoryGateway, PersistenceGateway};
pub use scheduler::{ReviewOutcome, ReviewScheduler};
pub use stats::StudyTicker;
pub use store::StateStore;
pub use tutor::{TutorBackend, TutorSession};
