use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Enum-based provider client for the generation backend.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    OpenAi(OpenAiProvider),
    Gemini(GeminiProvider),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LlmProviderType {
    OpenAi,
    Gemini,
}

impl LlmProvider {
    pub fn create(
        provider_type: LlmProviderType,
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Self {
        match provider_type {
            LlmProviderType::OpenAi => {
                LlmProvider::OpenAi(OpenAiProvider::new(api_key, base_url, model))
            }
            LlmProviderType::Gemini => {
                LlmProvider::Gemini(GeminiProvider::new(api_key, base_url, model))
            }
        }
    }

    /// One request/response round trip. `temperature` is per request
    /// because exam-drill prompts run cooler than explanations.
    pub async fn make_request(
        &self,
        system_message: Option<&str>,
        prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        match self {
            LlmProvider::OpenAi(provider) => {
                provider.make_request(system_message, prompt, temperature).await
            }
            LlmProvider::Gemini(provider) => {
                provider.make_request(system_message, prompt, temperature).await
            }
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi(_) => "OpenAI",
            LlmProvider::Gemini(_) => "Gemini",
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            LlmProvider::OpenAi(provider) => &provider.model,
            LlmProvider::Gemini(provider) => &provider.model,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
        }
    }

    async fn make_request(
        &self,
        system_message: Option<&str>,
        prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(sys_msg) = system_message {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: sys_msg.to_string(),
            });
        }
        messages.push(OpenAiMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let request_body = OpenAiRequest {
            model: self.model.clone(),
            messages,
            temperature,
        };

        info!(
            provider = "OpenAI",
            model = %self.model,
            prompt_length = prompt.len(),
            "making generation request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            error!(provider = "OpenAI", status = %status, error = %error_text, "generation request failed");
            return Err(anyhow::anyhow!("OpenAI request failed: {}", error_text));
        }

        let parsed: OpenAiResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("no choices in OpenAI response"))?;

        info!(provider = "OpenAI", response_length = content.len(), "generation response received");
        Ok(content)
    }
}

#[derive(Debug, Clone, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i32,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            model: model.unwrap_or_else(|| "gemini-2.5-flash".to_string()),
        }
    }

    async fn make_request(
        &self,
        system_message: Option<&str>,
        prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        // Gemini carries the system instruction inline with the prompt.
        let full_prompt = match system_message {
            Some(sys_msg) => format!("{}\n\n{}", sys_msg, prompt),
            None => prompt.to_string(),
        };

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: full_prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature,
                max_output_tokens: 2048,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        info!(
            provider = "Gemini",
            model = %self.model,
            prompt_length = prompt.len(),
            "making generation request"
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            error!(provider = "Gemini", status = %status, error = %error_text, "generation request failed");
            return Err(anyhow::anyhow!("Gemini request failed: {}", error_text));
        }

        let parsed: GeminiResponse = response.json().await?;
        let content = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| anyhow::anyhow!("empty Gemini response"))?;

        info!(provider = "Gemini", response_length = content.len(), "generation response received");
        Ok(content)
    }
}

/// Pulls the JSON payload out of a response that may be wrapped in
/// markdown fences or surrounded by prose.
pub fn extract_json(content: &str) -> &str {
    if let Some(start) = content.find("```json") {
        if let Some(end) = content[start + 7..].find("```") {
            return content[start + 7..start + 7 + end].trim();
        }
    }

    if let Some(start) = content.find("```") {
        if let Some(end) = content[start + 3..].find("```") {
            let candidate = content[start + 3..start + 3 + end].trim();
            if candidate.starts_with('{') || candidate.starts_with('[') {
                return candidate;
            }
        }
    }

    // Bare arrays are checked before objects: generated payloads here are
    // arrays, and an array of objects also contains '{'.
    if let (Some(start), Some(end)) = (content.find('['), content.rfind(']')) {
        if end > start {
            return &content[start..=end];
        }
    }

    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if end > start {
            return &content[start..=end];
        }
    }

    content.trim()
}
