use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ModerationError;

/// The oracle's answer for one piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Verdict {
    #[serde(rename = "contain_bad_words", alias = "contains_abusive_content")]
    pub contains_abusive_content: bool,
}

impl Verdict {
    pub const CLEAN: Self = Self {
        contains_abusive_content: false,
    };
    pub const ABUSIVE: Self = Self {
        contains_abusive_content: true,
    };

    /// Parse the JSON object a model returns. Anything that is not an object
    /// with a boolean verdict field is rejected.
    pub fn parse(raw: &str) -> Result<Self, ModerationError> {
        serde_json::from_str(raw.trim())
            .map_err(|e| ModerationError::MalformedVerdict(format!("{e}: {raw}")))
    }
}

/// External content classifier. May fail; callers decide what a failure means.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Verdict, ModerationError>;
}

#[async_trait]
impl Classifier for Box<dyn Classifier> {
    async fn classify(&self, text: &str) -> Result<Verdict, ModerationError> {
        (**self).classify(text).await
    }
}

// -- Gemini --

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiErrorDetail,
}

/// Classifier backed by Gemini's `generateContent`, asked for a JSON-only
/// answer of the form `{"contain_bad_words": <bool>}`.
pub struct GeminiClassifier {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClassifier {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, GEMINI_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The key travels in a header so it never appears in URLs, logs or errors.
    fn build_request(&self, text: &str) -> Result<reqwest::Request, ModerationError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: Self::prompt(text),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.0,
            },
        };

        let mut api_key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| ModerationError::Config("Gemini API key is not a valid header value"))?;
        api_key.set_sensitive(true);

        self.client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .build()
            .map_err(transport)
    }

    fn prompt(text: &str) -> String {
        format!(
            "Using this JSON schema: response = {{ \"contain_bad_words\": <bool> }}\n\
             Return a response - analysis if content has presence of obscene language, insults, etc\n\
             content: {text}"
        )
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, text: &str) -> Result<Verdict, ModerationError> {
        let request = self.build_request(text)?;
        let response = self.client.execute(request).await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<GeminiErrorResponse>(&error_text) {
                Ok(parsed) => parsed.error.message,
                Err(_) => error_text,
            };
            return Err(ModerationError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let response: GenerateContentResponse = response.json().await.map_err(transport)?;

        let raw = response
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or_else(|| ModerationError::MalformedVerdict("no candidate text".into()))?;

        debug!("Gemini verdict payload: {}", raw);
        Verdict::parse(&raw)
    }
}

/// reqwest errors carry the request URL; strip it before the error is logged.
fn transport(e: reqwest::Error) -> ModerationError {
    ModerationError::Classifier(e.without_url())
}

// -- Keyword list --

/// Offline classifier matching whole words against a blocklist. Used when no
/// model API key is configured.
pub struct KeywordClassifier {
    blocked: Vec<String>,
}

impl KeywordClassifier {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let blocked = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { blocked }
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }

    fn matches(&self, text: &str) -> bool {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .any(|w| {
                let w = w.to_lowercase();
                self.blocked.iter().any(|b| *b == w)
            })
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<Verdict, ModerationError> {
        Ok(if self.matches(text) {
            Verdict::ABUSIVE
        } else {
            Verdict::CLEAN
        })
    }
}
