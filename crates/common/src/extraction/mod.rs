//! Candidate term extraction
//!
//! Turns a free-text audience description into candidate terms for one
//! semantic role. Providers:
//! - OpenAI-compatible chat completion endpoints
//! - A deterministic mock for tests and offline runs

mod parse;

pub use parse::parse_term_list;

use crate::config::ExtractionConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Semantic role a candidate term is proposed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermRole {
    Title,
    Industry,
    Location,
    Category,
}

impl TermRole {
    pub const ALL: [TermRole; 4] = [
        TermRole::Title,
        TermRole::Industry,
        TermRole::Location,
        TermRole::Category,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TermRole::Title => "title",
            TermRole::Industry => "industry",
            TermRole::Location => "location",
            TermRole::Category => "category",
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            TermRole::Title => {
                "List the job titles of the people described. Include common \
                 variants and seniorities a recruiter database would use."
            }
            TermRole::Industry => {
                "List the industries the described people or companies work in, \
                 using standard industry names."
            }
            TermRole::Location => {
                "List the places mentioned (cities as \"City, State\" where the \
                 state is known, otherwise regions or metro areas). Return an \
                 empty array if no place is mentioned."
            }
            TermRole::Category => {
                "List the business categories of the described businesses, using \
                 short directory-style category names."
            }
        }
    }
}

/// Trait for candidate extraction
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Propose candidate terms for `role` from `description`
    async fn extract(&self, description: &str, role: TermRole) -> Result<Vec<String>>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Trim, drop blanks, dedupe case-insensitively keeping first occurrence, cap
pub fn normalize_terms(terms: Vec<String>, max_terms: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .take(max_terms)
        .collect()
}

/// OpenAI chat completion extractor
pub struct OpenAIExtractor {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_retries: u32,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
    content: Option<String>,
}

impl OpenAIExtractor {
    /// Create a new OpenAI extractor
    pub fn new(config: &ExtractionConfig, api_key: String) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_retries: config.max_retries,
            timeout,
        })
    }

    fn build_request<'a>(&'a self, description: &str, role: TermRole) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: format!(
                        "You extract search terms for a people and business database. {} \
                         Respond with a JSON array of strings only.",
                        role.instruction()
                    ),
                },
                ChatMessage {
                    role: "user",
                    content: description.to_string(),
                },
            ],
            temperature: 0.0,
        }
    }

    /// Make request with retry on transient failures
    async fn request_with_retry(&self, description: &str, role: TermRole) -> Result<String> {
        let policy = ExponentialBackoff {
            current_interval: Duration::from_millis(200),
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: Some(self.timeout * (self.max_retries + 1)),
            ..ExponentialBackoff::default()
        };

        let mut attempt = 0u32;
        backoff::future::retry(policy, || {
            attempt += 1;
            let current = attempt;
            async move {
                match self.make_request(description, role).await {
                    Ok(content) => Ok(content),
                    Err(e) if current <= self.max_retries && is_transient(&e) => {
                        tracing::warn!(
                            attempt = current,
                            max_retries = self.max_retries,
                            error = %e,
                            "Extraction request failed, retrying"
                        );
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await
    }

    async fn make_request(&self, description: &str, role: TermRole) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.build_request(description, role))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::ExtractionTimeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    AppError::ExtractionUnreachable {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("API error {}: {}", status, body);
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                AppError::ServiceUnavailable { message }
            } else {
                AppError::ExtractionError { message }
            });
        }

        let result: ChatResponse = response.json().await.map_err(|e| AppError::ExtractionError {
            message: format!("Failed to parse response: {}", e),
        })?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::ExtractionError {
                message: "Empty response".to_string(),
            })
    }
}

fn is_transient(err: &AppError) -> bool {
    matches!(
        err,
        AppError::ServiceUnavailable { .. }
            | AppError::ExtractionTimeout { .. }
            | AppError::ExtractionUnreachable { .. }
    )
}

#[async_trait]
impl Extractor for OpenAIExtractor {
    async fn extract(&self, description: &str, role: TermRole) -> Result<Vec<String>> {
        let content = self.request_with_retry(description, role).await.map_err(|e| match e {
            AppError::ServiceUnavailable { message } => AppError::ExtractionError { message },
            other => other,
        })?;
        Ok(parse_term_list(&content))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock extractor for testing
#[derive(Debug, Clone, Default)]
pub struct MockExtractor {
    terms: HashMap<TermRole, Vec<String>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `terms` whenever `role` is requested
    pub fn with_terms(mut self, role: TermRole, terms: &[&str]) -> Self {
        self.terms
            .insert(role, terms.iter().map(|t| t.to_string()).collect());
        self
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(&self, _description: &str, role: TermRole) -> Result<Vec<String>> {
        Ok(self.terms.get(&role).cloned().unwrap_or_default())
    }

    fn model_name(&self) -> &str {
        "mock-extractor"
    }
}

/// Create an extractor based on configuration
pub fn create_extractor(config: &ExtractionConfig) -> Result<Arc<dyn Extractor>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "OpenAI API key required for extraction".to_string(),
            })?;
            Ok(Arc::new(OpenAIExtractor::new(config, key)?))
        }
        "mock" => Ok(Arc::new(MockExtractor::new())),
        other => {
            tracing::warn!(provider = other, "Unknown extraction provider, using mock");
            Ok(Arc::new(MockExtractor::new()))
        }
    }
}
