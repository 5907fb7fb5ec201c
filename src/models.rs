use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bridge::QueryBridge;

/// School grade levels, ordered from Basic 4 up to SHS 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UserGrade {
    #[serde(rename = "Basic 4")]
    Basic4,
    #[serde(rename = "Basic 5")]
    Basic5,
    #[serde(rename = "Basic 6")]
    Basic6,
    #[serde(rename = "JHS 1")]
    Jhs1,
    #[serde(rename = "JHS 2")]
    Jhs2,
    #[serde(rename = "JHS 3")]
    Jhs3,
    #[serde(rename = "SHS 1")]
    Shs1,
    #[serde(rename = "SHS 2")]
    Shs2,
    #[serde(rename = "SHS 3")]
    Shs3,
}

impl UserGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserGrade::Basic4 => "Basic 4",
            UserGrade::Basic5 => "Basic 5",
            UserGrade::Basic6 => "Basic 6",
            UserGrade::Jhs1 => "JHS 1",
            UserGrade::Jhs2 => "JHS 2",
            UserGrade::Jhs3 => "JHS 3",
            UserGrade::Shs1 => "SHS 1",
            UserGrade::Shs2 => "SHS 2",
            UserGrade::Shs3 => "SHS 3",
        }
    }
}

impl std::fmt::Display for UserGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subjects of the Ghanaian curriculum (Basic through SHS electives).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    #[serde(rename = "Mathematics")]
    Math,
    #[serde(rename = "Integrated Science")]
    Science,
    #[serde(rename = "English Language")]
    English,
    #[serde(rename = "Social Studies")]
    Social,
    #[serde(rename = "ICT")]
    Ict,
    #[serde(rename = "RME")]
    Rme,
    #[serde(rename = "Ghanaian Language")]
    GhanaianLanguage,
    #[serde(rename = "Creative Arts")]
    CreativeArts,
    #[serde(rename = "Career Technology")]
    CareerTech,
    #[serde(rename = "History")]
    History,
    #[serde(rename = "French")]
    French,
    #[serde(rename = "Elective Maths")]
    ElectiveMath,
    #[serde(rename = "Physics")]
    Physics,
    #[serde(rename = "Chemistry")]
    Chemistry,
    #[serde(rename = "Biology")]
    Biology,
    #[serde(rename = "Economics")]
    Economics,
    #[serde(rename = "Government")]
    Government,
    #[serde(rename = "Literature-in-English")]
    Literature,
    #[serde(rename = "Geography")]
    Geography,
    #[serde(rename = "Business Management")]
    Business,
    #[serde(rename = "Financial Accounting")]
    Accounting,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Math => "Mathematics",
            Subject::Science => "Integrated Science",
            Subject::English => "English Language",
            Subject::Social => "Social Studies",
            Subject::Ict => "ICT",
            Subject::Rme => "RME",
            Subject::GhanaianLanguage => "Ghanaian Language",
            Subject::CreativeArts => "Creative Arts",
            Subject::CareerTech => "Career Technology",
            Subject::History => "History",
            Subject::French => "French",
            Subject::ElectiveMath => "Elective Maths",
            Subject::Physics => "Physics",
            Subject::Chemistry => "Chemistry",
            Subject::Biology => "Biology",
            Subject::Economics => "Economics",
            Subject::Government => "Government",
            Subject::Literature => "Literature-in-English",
            Subject::Geography => "Geography",
            Subject::Business => "Business Management",
            Subject::Accounting => "Financial Accounting",
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interaction style for the tutoring chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TutorMode {
    #[default]
    #[serde(rename = "Explain It")]
    Explain,
    #[serde(rename = "Exam Drill")]
    Drill,
    #[serde(rename = "Step-by-Step")]
    Steps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub grade: UserGrade,
    pub subjects: Vec<Subject>,
    pub setup_complete: bool,
    pub daily_goal_minutes: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: Uuid,
    pub front: String,
    pub back: String,
    pub subject: Subject,
    pub grade_level: UserGrade,
    pub difficulty: Difficulty,
    pub next_review_date: DateTime<Utc>,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub repetition_count: u32,
    pub ease_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerTask {
    pub id: Uuid,
    pub day: String,
    pub subject: String,
    pub topic: String,
    pub duration_minutes: u32,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyPlan {
    pub week_id: String,
    pub generated_at: DateTime<Utc>,
    pub tasks: Vec<PlannerTask>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_study_minutes: u64,
    pub cards_reviewed: u64,
    pub tutor_sessions: u64,
    pub streak_days: u32,
}

/// A mock exam question as handed to the consumer; exams are not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamQuestion {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
}

// ---------------------------------------------------------------------------
// Generation payloads: what the external service returns before the core
// assigns ids and scheduling defaults.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFlashcard {
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTask {
    pub day: String,
    pub subject: String,
    pub topic: String,
    #[serde(rename = "durationMinutes")]
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedExamQuestion {
    pub question: String,
    pub options: Vec<String>,
    #[serde(rename = "correctAnswer")]
    pub correct_answer: String,
    pub explanation: String,
}

/// The full learner state: the single blob the store owns and the
/// persistence gateway reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    pub user: Option<UserProfile>,
    pub stats: DashboardStats,
    pub current_subject: Option<Subject>,
    pub tutor_mode: TutorMode,
    pub messages: Vec<ChatMessage>,
    pub flashcards: Vec<Flashcard>,
    pub weekly_plan: Option<WeeklyPlan>,
    pub bridge: QueryBridge,
    pub last_activity_date: Option<NaiveDate>,
}
