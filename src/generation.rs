use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::{EngineError, Result};
use crate::llm_providers::{LlmProvider, extract_json};
use crate::models::{
    ChatMessage, ExamQuestion, GeneratedExamQuestion, GeneratedFlashcard, GeneratedTask, Role,
    Subject, TutorMode, UserGrade,
};

const BASE_TUTOR_INSTRUCTION: &str = "\
You are an expert AI Tutor for the Ghanaian Education System (NaCCA/WAEC aligned).
Your goal is to help students from Basic 4 to SHS understand concepts, solve problems, and prepare for exams (BECE/WASSCE).

GENERAL GUIDELINES:
1. CURRICULUM ALIGNMENT: Always explain concepts using the standard Ghanaian syllabus definitions and methods.
2. TONE: Encouraging, formal yet accessible, and educational.
3. REFUSAL: If a question is unsafe or completely ambiguous, politely ask for clarification.
4. FORMAT: STRICTLY PLAIN TEXT ONLY. Do NOT use Markdown symbols like **bold**, ## headers, or *italics*. Do not use LaTeX.
   - Use double line breaks between paragraphs.
   - Use standard numbering (1., 2.) for lists.";

const EXPLAIN_INSTRUCTION: &str = "\
MODE: EXPLAIN IT
- Focus on conceptual understanding.
- Use analogies relevant to Ghana (e.g., market, trotro, local geography).
- Keep definitions simple and concise.
- End with a \"Check for understanding\" question.";

const DRILL_INSTRUCTION: &str = "\
MODE: EXAM DRILL
- Treat the user's input as a potential exam question (BECE/WASSCE style).
- Provide the answer strictly following the WAEC marking scheme format.
- State \"Marks Awarded\" logic where applicable.
- Be precise and brief, like a marking guide.";

const STEPS_INSTRUCTION: &str = "\
MODE: STEP-BY-STEP
- Break down the solution into small, numbered steps.
- Explain the \"Why\" behind each step.
- Do not give the final answer immediately; guide the student through the logic.
- Use clear headers: \"Given\", \"Formula\", \"Substitution\", \"Calculation\".";

const FLASHCARD_INSTRUCTION: &str = "\
You are an educational content generator. Create flashcards based on the provided topic or text.
Output MUST be a valid JSON array of objects.
Each object MUST strictly follow this structure:
{
  \"front\": \"The question or term\",
  \"back\": \"The concise answer or definition\",
  \"difficulty\": \"Easy\" | \"Medium\" | \"Hard\"
}
Do not wrap the output in markdown code blocks. Return only the raw JSON.";

const PLANNER_INSTRUCTION: &str = "\
You are a smart study planner. Generate a 7-day study plan (Monday to Sunday) based on the student's grade, subjects, and weak areas.
Output MUST be a valid JSON array of objects with this structure:
{
  \"day\": \"Day of the week (e.g., Monday)\",
  \"subject\": \"The subject name\",
  \"topic\": \"The topic to study\",
  \"durationMinutes\": 45
}
Return only the raw JSON.";

const LESSON_INSTRUCTION: &str = "\
You are a textbook writer. Generate a comprehensive lesson note on the given topic.
Content must be accurate to the Ghana Syllabus.
Structure:
1. Introduction/Definition
2. Key Concepts/Mechanisms
3. Local Examples (Ghanaian context)
4. Summary";

const EXAM_INSTRUCTION: &str = "\
You are a WAEC Examiner. Generate 5 mock exam Multiple Choice Questions (MCQs) for the given subject and grade.
Output MUST be a valid JSON array of objects with this structure:
{
  \"question\": \"The question text\",
  \"options\": [\"A\", \"B\", \"C\", \"D\"],
  \"correctAnswer\": \"The correct option text (must match one option)\",
  \"explanation\": \"Brief explanation of why it is correct\"
}
Return only the raw JSON.";

/// Fallback appended to the conversation when the tutor backend fails.
pub const TUTOR_FALLBACK: &str =
    "An error occurred while connecting to Lexis AI. Please try again.";

/// Client for the external generation backend: five request/response
/// contracts, no retries, failures local to the request.
#[derive(Debug, Clone)]
pub struct GenerationService {
    provider: LlmProvider,
}

impl GenerationService {
    pub fn new(provider: LlmProvider) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// One tutor exchange. A backend failure never surfaces as an error;
    /// it yields the fallback string, which the caller appends to the
    /// conversation like any other response.
    pub async fn tutor_response(
        &self,
        history: &[ChatMessage],
        message: &str,
        grade: UserGrade,
        subject: Subject,
        mode: TutorMode,
    ) -> String {
        let mode_instruction = match mode {
            TutorMode::Explain => EXPLAIN_INSTRUCTION,
            TutorMode::Drill => DRILL_INSTRUCTION,
            TutorMode::Steps => STEPS_INSTRUCTION,
        };
        let system = format!(
            "{}\n{}\nCurrent Context: Grade: {}, Subject: {}",
            BASE_TUTOR_INSTRUCTION, mode_instruction, grade, subject
        );

        let prompt = render_transcript(history, message);

        // Drills want marking-scheme precision; explanations can roam.
        let temperature = if mode == TutorMode::Drill { 0.3 } else { 0.7 };

        match self
            .provider
            .make_request(Some(system.as_str()), &prompt, temperature)
            .await
        {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!(subject = %subject, "tutor backend returned empty response");
                TUTOR_FALLBACK.to_string()
            }
            Err(e) => {
                error!(subject = %subject, error = %e, "tutor exchange failed");
                TUTOR_FALLBACK.to_string()
            }
        }
    }

    pub async fn generate_flashcards(
        &self,
        topic: &str,
        grade: UserGrade,
        subject: Subject,
    ) -> Result<Vec<GeneratedFlashcard>> {
        let prompt = format!(
            "Generate 10 high-quality flashcards for the topic: \"{}\".\n\
             Context: Grade {}, Subject {}.\n\
             Ensure the content is accurate to the Ghana syllabus.",
            topic, grade, subject
        );

        let response = self
            .provider
            .make_request(Some(FLASHCARD_INSTRUCTION), &prompt, 0.7)
            .await
            .map_err(|e| EngineError::Generation(e.to_string()))?;

        let cards = parse_flashcards(&response)?;
        info!(topic, count = cards.len(), "generated flashcards");
        Ok(cards)
    }

    pub async fn generate_lesson(
        &self,
        topic: &str,
        grade: UserGrade,
        subject: Subject,
    ) -> Result<String> {
        let prompt = format!(
            "Write a detailed lesson note on \"{}\".\nContext: Grade {}, Subject {}.",
            topic, grade, subject
        );

        let lesson = self
            .provider
            .make_request(Some(LESSON_INSTRUCTION), &prompt, 0.5)
            .await
            .map_err(|e| EngineError::Generation(e.to_string()))?;

        if lesson.trim().is_empty() {
            return Err(EngineError::Validation("empty lesson content".into()));
        }
        Ok(lesson)
    }

    pub async fn generate_weekly_plan(
        &self,
        grade: UserGrade,
        subjects: &[Subject],
        weak_areas: &str,
    ) -> Result<Vec<GeneratedTask>> {
        let subject_list = subjects
            .iter()
            .map(Subject::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let prompt = format!(
            "Create a balanced 1-week study plan.\n\
             Grade: {}\n\
             Subjects: {}\n\
             Focus/Weak Areas: {}\n\
             Typical school hours: 8am - 3pm. Schedule study times for evenings or weekends.",
            grade, subject_list, weak_areas
        );

        let response = self
            .provider
            .make_request(Some(PLANNER_INSTRUCTION), &prompt, 0.7)
            .await
            .map_err(|e| EngineError::Generation(e.to_string()))?;

        let tasks = parse_plan_tasks(&response)?;
        info!(count = tasks.len(), "generated weekly plan");
        Ok(tasks)
    }

    /// Mock exam questions with ids assigned by the core.
    pub async fn generate_mock_exam(
        &self,
        grade: UserGrade,
        subject: Subject,
    ) -> Result<Vec<ExamQuestion>> {
        let prompt = format!(
            "Generate 5 mock exam Multiple Choice Questions (MCQs) for {}, Grade {}.",
            subject, grade
        );

        let response = self
            .provider
            .make_request(Some(EXAM_INSTRUCTION), &prompt, 0.7)
            .await
            .map_err(|e| EngineError::Generation(e.to_string()))?;

        let questions = parse_exam_questions(&response)?;
        info!(subject = %subject, count = questions.len(), "generated mock exam");
        Ok(questions)
    }
}

fn render_transcript(history: &[ChatMessage], new_message: &str) -> String {
    let mut transcript = String::new();
    for message in history {
        let speaker = match message.role {
            Role::User => "Student",
            Role::Assistant => "Tutor",
        };
        transcript.push_str(speaker);
        transcript.push_str(": ");
        transcript.push_str(&message.text);
        transcript.push('\n');
    }
    transcript.push_str("Student: ");
    transcript.push_str(new_message);
    transcript
}

/// Parse a generated flashcard payload. Accepts a bare array or an object
/// with a `flashcards` key, since backends wrap arrays inconsistently.
pub fn parse_flashcards(response: &str) -> Result<Vec<GeneratedFlashcard>> {
    let json = extract_json(response);

    let cards: Vec<GeneratedFlashcard> = match serde_json::from_str(json) {
        Ok(cards) => cards,
        Err(_) => {
            #[derive(serde::Deserialize)]
            struct Wrapper {
                flashcards: Vec<GeneratedFlashcard>,
            }
            serde_json::from_str::<Wrapper>(json)
                .map(|w| w.flashcards)
                .map_err(|e| {
                    EngineError::Validation(format!("unparseable flashcard payload: {e}"))
                })?
        }
    };

    if cards.is_empty() {
        return Err(EngineError::Validation("generated zero flashcards".into()));
    }
    Ok(cards)
}

pub fn parse_plan_tasks(response: &str) -> Result<Vec<GeneratedTask>> {
    let json = extract_json(response);
    let tasks: Vec<GeneratedTask> = serde_json::from_str(json)
        .map_err(|e| EngineError::Validation(format!("unparseable plan payload: {e}")))?;
    if tasks.is_empty() {
        return Err(EngineError::Validation("generated an empty plan".into()));
    }
    Ok(tasks)
}

pub fn parse_exam_questions(response: &str) -> Result<Vec<ExamQuestion>> {
    let json = extract_json(response);
    let questions: Vec<GeneratedExamQuestion> = serde_json::from_str(json)
        .map_err(|e| EngineError::Validation(format!("unparseable exam payload: {e}")))?;
    if questions.is_empty() {
        return Err(EngineError::Validation("generated zero questions".into()));
    }
    Ok(questions
        .into_iter()
        .map(|q| ExamQuestion {
            id: Uuid::new_v4(),
            question: q.question,
            options: q.options,
            correct_answer: q.correct_answer,
            explanation: q.explanation,
        })
        .collect())
}
