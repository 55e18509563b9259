/*
 * Chatter - Discord Auto-Chat & Auto-Reply Companion
 * File Path: src/llm.rs
 * Responsibility: Gemini text generation and the bounded-retry reply writer
 */

use crate::config::GeminiConfig;
use crate::persona::Persona;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_CLIENT_HEADER: &str = "google-cloud-sdk vscode_cloudshelleditor/0.1";

const HARM_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// A single, unretried completion call.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

#[async_trait]
impl<M: TextModel + ?Sized> TextModel for Arc<M> {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        (**self).complete(prompt).await
    }
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: Option<u32>,
    safety_threshold: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(API_CLIENT_HEADER)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: model_path(&config.model),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            safety_threshold: config.safety_threshold.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut generation_config = json!({ "temperature": self.temperature });
        if let Some(max) = self.max_output_tokens {
            generation_config["maxOutputTokens"] = json!(max);
        }

        let mut payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": generation_config
        });

        if let Some(threshold) = &self.safety_threshold {
            let settings: Vec<Value> = HARM_CATEGORIES
                .iter()
                .map(|category| json!({ "category": category, "threshold": threshold }))
                .collect();
            payload["safetySettings"] = Value::Array(settings);
        }
        payload
    }

    /// Fetch models that support `generateContent`, short names only.
    pub async fn list_models(&self) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/models?key={}", GEMINI_API_BASE, self.api_key);
        let response = self
            .http
            .get(url)
            .header("X-Goog-Api-Client", API_CLIENT_HEADER)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow::anyhow!("Gemini API Error: {}", error_text));
        }

        let res_json: Value = response.json().await?;
        Ok(parse_model_list(&res_json))
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_BASE, self.model, self.api_key
        );

        let response = self
            .http
            .post(url)
            .header("X-Goog-Api-Client", API_CLIENT_HEADER)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Gemini API Error (Model: {}, Status: {}): {}",
                self.model,
                status,
                error_text
            ));
        }

        let res_json: Value = response.json().await?;
        extract_text(&res_json)
    }
}

/// Accept both `gemini-pro` and `models/gemini-pro`.
fn model_path(model: &str) -> String {
    let model = model.trim();
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

fn extract_text(res_json: &Value) -> anyhow::Result<String> {
    let text: String = res_json["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    let text = text.trim();
    if !text.is_empty() {
        return Ok(text.to_string());
    }

    if let Some(block) = res_json["promptFeedback"]["blockReason"].as_str() {
        return Err(anyhow::anyhow!("Gemini blocked the prompt: {}", block));
    }
    let reason = res_json["candidates"][0]["finishReason"]
        .as_str()
        .unwrap_or("UNKNOWN");
    if reason == "SAFETY" {
        Err(anyhow::anyhow!(
            "Gemini blocked the response due to SAFETY filters."
        ))
    } else {
        Err(anyhow::anyhow!(
            "Gemini returned no content. Finish Reason: {}",
            reason
        ))
    }
}

fn parse_model_list(res_json: &Value) -> Vec<String> {
    let mut models = Vec::new();
    if let Some(list) = res_json["models"].as_array() {
        for m in list {
            let Some(name) = m["name"].as_str() else { continue };
            let supports_generate = m["supportedGenerationMethods"]
                .as_array()
                .is_some_and(|methods| methods.iter().any(|v| v.as_str() == Some("generateContent")));
            if supports_generate {
                models.push(name.strip_prefix("models/").unwrap_or(name).to_string());
            }
        }
    }
    models
}

/// Turns a chat message into reply text: persona prompt, bounded retry, and
/// an empty string once the attempts are spent.
pub struct ReplyWriter<M> {
    model: M,
    persona: Persona,
    retry: RetryPolicy,
}

impl<M: TextModel> ReplyWriter<M> {
    pub fn new(model: M, persona: Persona, retry: RetryPolicy) -> Self {
        Self { model, persona, retry }
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// Empty means "no reply"; callers skip the candidate.
    pub async fn generate(&self, message: &str) -> String {
        let prompt = self.persona.prompt_for(message);
        let prompt = prompt.as_str();
        let model = &self.model;
        match self
            .retry
            .run("Gemini generation", move || model.complete(prompt))
            .await
        {
            Ok(text) => {
                debug!("🧠 Generated {} chars", text.len());
                text.trim().to_string()
            }
            Err(e) => {
                warn!("🔕 Giving up on generation, skipping reply: {:#}", e);
                String::new()
            }
        }
    }
}
