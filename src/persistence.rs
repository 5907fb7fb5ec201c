use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::AppState;

/// Version stamp written into every persisted record. Records carrying a
/// different version are treated as absent rather than migrated.
pub const SCHEMA_VERSION: u32 = 1;

/// The single named record holding the entire learner state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub version: u32,
    pub state: AppState,
}

impl PersistedRecord {
    pub fn current(state: AppState) -> Self {
        Self {
            version: SCHEMA_VERSION,
            state,
        }
    }
}

/// Durable storage for the state blob. Implementations decode corruption
/// and schema mismatches to `Ok(None)` so hydration can fall back to the
/// default state without surfacing an error.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn load(&self) -> Result<Option<AppState>>;
    async fn save(&self, state: &AppState) -> Result<()>;
}

/// JSON-file gateway. Saves go through a temp file plus rename so a crash
/// mid-write never leaves a half-written record behind. Each save gets its
/// own temp file so overlapping saves cannot steal each other's rename.
pub struct FileGateway {
    path: PathBuf,
    save_seq: AtomicUsize,
}

impl FileGateway {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            save_seq: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PersistenceGateway for FileGateway {
    async fn load(&self) -> Result<Option<AppState>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file unreadable, starting fresh");
                return Ok(None);
            }
        };

        let record: PersistedRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file corrupt, starting fresh");
                return Ok(None);
            }
        };

        if record.version != SCHEMA_VERSION {
            warn!(
                path = %self.path.display(),
                found = record.version,
                expected = SCHEMA_VERSION,
                "state file schema mismatch, starting fresh"
            );
            return Ok(None);
        }

        info!(path = %self.path.display(), "loaded persisted learner state");
        Ok(Some(record.state))
    }

    async fn save(&self, state: &AppState) -> Result<()> {
        let record = PersistedRecord::current(state.clone());
        let bytes = serde_json::to_vec_pretty(&record).context("serializing state record")?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating state directory {}", parent.display()))?;
            }
        }

        let seq = self.save_seq.fetch_add(1, Ordering::SeqCst);
        let tmp = self.path.with_extension(format!("json.tmp.{seq}"));
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory gateway for deterministic tests: same JSON encoding as the
/// file gateway, no filesystem.
#[derive(Default)]
pub struct MemoryGateway {
    record: Mutex<Option<Vec<u8>>>,
    saves: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load the gateway with an already-encoded record.
    pub fn with_raw(bytes: Vec<u8>) -> Self {
        Self {
            record: Mutex::new(Some(bytes)),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn load(&self) -> Result<Option<AppState>> {
        let Some(bytes) = self.record.lock().unwrap().clone() else {
            return Ok(None);
        };
        let record: PersistedRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(_) => return Ok(None),
        };
        if record.version != SCHEMA_VERSION {
            return Ok(None);
        }
        Ok(Some(record.state))
    }

    async fn save(&self, state: &AppState) -> Result<()> {
        let record = PersistedRecord::current(state.clone());
        let bytes = serde_json::to_vec(&record)?;
        *self.record.lock().unwrap() = Some(bytes);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ChatMessage, DashboardStats, Difficulty, Flashcard, PlannerTask, Role, Subject, TutorMode,
        UserGrade, UserProfile, WeeklyPlan,
    };
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn populated_state() -> AppState {
        let now = Utc::now();
        let mut state = AppState {
            user: Some(UserProfile {
                name: "Ama".to_string(),
                grade: UserGrade::Shs2,
                subjects: vec![Subject::Math, Subject::Physics],
                setup_complete: true,
                daily_goal_minutes: Some(45),
            }),
            stats: DashboardStats {
                total_study_minutes: 320,
                cards_reviewed: 57,
                tutor_sessions: 12,
                streak_days: 4,
            },
            current_subject: Some(Subject::Physics),
            tutor_mode: TutorMode::Steps,
            messages: vec![ChatMessage {
                id: Uuid::new_v4(),
                role: Role::User,
                text: "Explain Newton's second law".to_string(),
                timestamp: now,
            }],
            flashcards: vec![Flashcard {
                id: Uuid::new_v4(),
                front: "F = ?".to_string(),
                back: "ma".to_string(),
                subject: Subject::Physics,
                grade_level: UserGrade::Shs2,
                difficulty: Difficulty::Easy,
                next_review_date: now,
                last_reviewed: Some(now),
                repetition_count: 2,
                ease_factor: 2.7,
            }],
            weekly_plan: Some(WeeklyPlan {
                week_id: Uuid::new_v4().to_string(),
                generated_at: now,
                tasks: vec![PlannerTask {
                    id: Uuid::new_v4(),
                    day: "Monday".to_string(),
                    subject: "Physics".to_string(),
                    topic: "Kinematics".to_string(),
                    duration_minutes: 60,
                    completed: false,
                }],
            }),
            bridge: Default::default(),
            last_activity_date: NaiveDate::from_ymd_opt(2024, 3, 5),
        };
        state.bridge.offer("Explain torque", Subject::Physics);
        state
    }

    #[tokio::test]
    async fn test_file_gateway_round_trip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileGateway::new(dir.path().join("state.json"));

        let state = populated_state();
        gateway.save(&state).await.unwrap();
        let loaded = gateway.load().await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_file_gateway_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileGateway::new(dir.path().join("absent.json"));
        assert!(gateway.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_gateway_corrupt_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{not json at all").await.unwrap();

        let gateway = FileGateway::new(&path);
        assert!(gateway.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_gateway_schema_mismatch_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let record = serde_json::json!({
            "version": SCHEMA_VERSION + 1,
            "state": AppState::default(),
        });
        tokio::fs::write(&path, serde_json::to_vec(&record).unwrap())
            .await
            .unwrap();

        let gateway = FileGateway::new(&path);
        assert!(gateway.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_gateway_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileGateway::new(dir.path().join("state.json"));

        gateway.save(&AppState::default()).await.unwrap();
        let newer = populated_state();
        gateway.save(&newer).await.unwrap();

        assert_eq!(gateway.load().await.unwrap().unwrap(), newer);
    }

    #[tokio::test]
    async fn test_file_gateway_overlapping_saves_all_succeed() {
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(FileGateway::new(dir.path().join("state.json")));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let gateway = Arc::clone(&gateway);
            handles.push(tokio::spawn(async move {
                gateway.save(&AppState::default()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(gateway.load().await.unwrap().unwrap(), AppState::default());
    }

    #[tokio::test]
    async fn test_memory_gateway_round_trip_and_save_count() {
        let gateway = MemoryGateway::new();
        assert!(gateway.load().await.unwrap().is_none());

        let state = populated_state();
        gateway.save(&state).await.unwrap();
        gateway.save(&state).await.unwrap();

        assert_eq!(gateway.save_count(), 2);
        assert_eq!(gateway.load().await.unwrap().unwrap(), state);
    }
}
