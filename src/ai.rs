use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::models::Source;

// --- Provider trait ---

/// Free text returned by a research call, plus the web pages it was grounded on.
#[derive(Debug, Clone, Default)]
pub struct Research {
    pub text: String,
    pub sources: Vec<Source>,
}

pub trait ResearchProvider {
    fn research(&self, prompt: &str) -> Result<Research, ResearchError>;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub model_id: String,
    pub short_name: String,
}

pub const DEFAULT_MODEL: &str = "flash";

pub fn resolve_model(name: &str) -> Result<ModelSpec> {
    let model = |model_id: &str, short_name: &str| ModelSpec {
        model_id: model_id.to_string(),
        short_name: short_name.to_string(),
    };
    match name {
        "flash" | "gemini-flash" => Ok(model("gemini-3-flash-preview", "flash")),
        "pro" | "gemini-pro" => Ok(model("gemini-3-pro-preview", "pro")),
        "2.5-flash" => Ok(model("gemini-2.5-flash", "2.5-flash")),
        "2.5-pro" => Ok(model("gemini-2.5-pro", "2.5-pro")),
        // Full model ids pass through untouched
        id if id.starts_with("gemini-") => Ok(model(id, id)),
        _ => Err(anyhow!(
            "Unknown model '{}'. Available: flash (default), pro, 2.5-flash, 2.5-pro, or any gemini-* model id",
            name
        )),
    }
}

// --- Gemini provider ---

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
const EMPTY_TEXT: &str = "Failed to generate content.";

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiTool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    tools: Vec<GeminiTool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

impl GeminiResponse {
    fn into_research(self) -> Research {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Research {
                text: EMPTY_TEXT.to_string(),
                sources: Vec::new(),
            };
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        let sources = candidate
            .grounding_metadata
            .map(|m| m.grounding_chunks)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|chunk| chunk.web)
            .filter_map(|web| {
                let uri = web.uri?;
                let title = web.title.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| uri.clone());
                Some(Source { title, uri })
            })
            .collect();

        Research {
            text: if text.trim().is_empty() { EMPTY_TEXT.to_string() } else { text },
            sources,
        }
    }
}

#[derive(Debug)]
pub struct GeminiProvider {
    api_key: String,
    model_id: String,
    base_url: String,
    client: reqwest::blocking::Client,
}

impl GeminiProvider {
    /// Reads `GEMINI_API_KEY` (and optionally `GEMINI_API_BASE`) from the environment.
    pub fn new(model_id: String, timeout: Option<Duration>) -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY")
            .context("GEMINI_API_KEY environment variable not set. Set it with: export GEMINI_API_KEY=your-key-here")?;
        let base_url = env::var("GEMINI_API_BASE").unwrap_or_else(|_| GEMINI_API_BASE.to_string());
        Self::with_base_url(api_key, model_id, &base_url, timeout)
    }

    pub fn with_base_url(
        api_key: String,
        model_id: String,
        base_url: &str,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        // No timeout unless asked for: a stalled call stalls the run
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            api_key,
            model_id,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model_id)
    }
}

impl ResearchProvider for GeminiProvider {
    fn research(&self, prompt: &str) -> Result<Research, ResearchError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            tools: vec![GeminiTool {
                google_search: GoogleSearch {},
            }],
        };

        tracing::debug!(model = %self.model_id, prompt_chars = prompt.len(), "calling Gemini");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = serde_json::from_str::<GeminiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            tracing::warn!(status = status.as_u16(), "Gemini request failed");
            return Err(ResearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text()?;
        let api_response: GeminiResponse = serde_json::from_str(&body)
            .map_err(|e| ResearchError::Other(format!("Failed to parse Gemini response: {}", e)))?;

        let research = api_response.into_research();
        tracing::debug!(sources = research.sources.len(), "Gemini call succeeded");
        Ok(research)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
