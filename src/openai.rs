//! Model client for our three call shapes.
//!
//! `Collaborator` is the seam the rest of the service talks to; `OpenAI` implements it
//! over chat.completions. Solve and corrective analysis use the strong model, image
//! transcription uses the fast one. Calls are instrumented and log model names,
//! latencies and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::domain::{CorrectionRequest, ImageInput, ProblemInput};
use crate::error::AppError;
use crate::prompt::{correction_prompt, solve_prompt};
use crate::util::{image_data_url, trunc_for_log};

/// External text-generation service. Every call either yields text or a
/// human-readable failure; nothing is retried here.
#[async_trait]
pub trait Collaborator: Send + Sync {
  async fn generate_solution(&self, input: &ProblemInput) -> Result<String, AppError>;
  async fn generate_corrective_analysis(&self, req: &CorrectionRequest) -> Result<String, AppError>;
  async fn extract_text_from_image(&self, image: &ImageInput) -> Result<String, AppError>;
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
  pub prompts: Prompts,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY (or API_KEY); otherwise return None.
  pub fn from_env(prompts: Prompts) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY")
      .or_else(|_| std::env::var("API_KEY"))
      .ok()?;
    match Self::with_api_key(&api_key, prompts) {
      Ok(oa) => Some(oa),
      Err(e) => {
        error!(target: "grandmaster_backend", error = %e, "Could not build OpenAI client");
        None
      }
    }
  }

  /// Build a client for `api_key`; endpoint, models and timeout come from the environment.
  pub fn with_api_key(api_key: &str, prompts: Prompts) -> Result<Self, AppError> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
      return Err(AppError::Validation("API key cannot be empty.".into()));
    }
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());
    let timeout_secs = std::env::var("OPENAI_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .unwrap_or(120);

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(timeout_secs))
      .build()
      .map_err(|e| AppError::Collaborator(format!("HTTP client setup failed: {e}")))?;

    Ok(Self { client, api_key: api_key.to_string(), base_url, fast_model, strong_model, prompts })
  }

  /// Chat completion returning the first choice's text.
  #[instrument(level = "info", skip(self, system, content), fields(model = %model))]
  async fn chat(
    &self,
    model: &str,
    system: Option<&str>,
    content: MessageContent,
    temperature: f32,
  ) -> Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
      messages.push(ChatMessageReq { role: "system".into(), content: MessageContent::Text(system.into()) });
    }
    messages.push(ChatMessageReq { role: "user".into(), content });
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages,
      temperature,
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "grandmaster-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 300));
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| format!("Malformed response: {e}"))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();

    let elapsed = start.elapsed();
    if text.is_empty() {
      error!(?elapsed, "Model returned an empty response");
      return Err("The model returned an empty response.".into());
    }
    info!(?elapsed, response_len = text.len(), "Model response received");
    Ok(text)
  }
}

#[async_trait]
impl Collaborator for OpenAI {
  #[instrument(
    level = "info",
    skip(self, input),
    fields(language = %input.language, mode = ?input.mode, problem_len = input.problem.len(), code_len = input.code.len())
  )]
  async fn generate_solution(&self, input: &ProblemInput) -> Result<String, AppError> {
    let p = solve_prompt(&self.prompts, input);
    self.chat(&self.strong_model, Some(&p.system), MessageContent::Text(p.user), 0.4)
      .await
      .map_err(|e| AppError::Collaborator(format!("An error occurred while communicating with the AI: {e}")))
  }

  #[instrument(
    level = "info",
    skip(self, req),
    fields(language = %req.language, incorrect_len = req.incorrect_code.len(), accepted_len = req.accepted_code.len())
  )]
  async fn generate_corrective_analysis(&self, req: &CorrectionRequest) -> Result<String, AppError> {
    let p = correction_prompt(&self.prompts, req);
    self.chat(&self.strong_model, Some(&p.system), MessageContent::Text(p.user), 0.3)
      .await
      .map_err(|e| AppError::Collaborator(format!("An error occurred while learning from the mistake: {e}")))
  }

  #[instrument(level = "info", skip(self, image), fields(mime = %image.mime, bytes = image.bytes.len()))]
  async fn extract_text_from_image(&self, image: &ImageInput) -> Result<String, AppError> {
    let content = MessageContent::Parts(vec![
      ContentPart::Text { text: self.prompts.ocr_instruction.clone() },
      ContentPart::ImageUrl { image_url: ImageUrl { url: image_data_url(image) } },
    ]);
    self.chat(&self.fast_model, None, content, 0.0)
      .await
      .map_err(|e| AppError::Extraction(format!("An error occurred while extracting text from the image: {e}")))
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: MessageContent }

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
  Text(String),
  Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
  Text { text: String },
  ImageUrl { image_url: ImageUrl },
}
#[derive(Serialize)]
struct ImageUrl { url: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
