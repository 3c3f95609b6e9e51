//! Language-model inference boundary.
//!
//! This module defines the request/reply contract and the pluggable client
//! trait; [`HttpInferenceClient`] is the production implementation.  The
//! transport is deliberately thin — one POST, one bounded timeout, no inline
//! retry.  A timeout or a malformed reply is a tier failure the resolver
//! falls through from, never an error surfaced to the batch.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request / reply contract
// ---------------------------------------------------------------------------

/// What the resolver knows about a merchant when it asks for help.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest {
    pub merchant_name: String,
    pub category_hint: Option<String>,
}

impl InferenceRequest {
    pub fn new(merchant_name: impl Into<String>, category_hint: Option<String>) -> Self {
        Self {
            merchant_name: merchant_name.into(),
            category_hint,
        }
    }
}

/// Render the natural-language prompt sent alongside the structured fields.
pub fn render_prompt(req: &InferenceRequest) -> String {
    let mut prompt = format!(
        "Identify the publicly traded parent company for the merchant \
         \"{}\" and reply with JSON: {{\"ticker\", \"company_name\", \
         \"confidence\", \"reasoning\"}}. Confidence is a number in [0, 1]. \
         If the merchant is private or unidentifiable, use confidence 0.",
        req.merchant_name
    );
    if let Some(hint) = &req.category_hint {
        prompt.push_str(&format!(" Purchase category hint: \"{hint}\"."));
    }
    prompt
}

/// The structured reply the endpoint must produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceReply {
    pub ticker: String,
    pub company_name: String,
    pub confidence: f64,
    pub reasoning: Option<String>,
}

/// A successful call: the raw body (kept verbatim for the audit log) plus
/// the parsed reply.
#[derive(Debug, Clone)]
pub struct InferenceExchange {
    pub raw: String,
    pub reply: InferenceReply,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors an [`InferenceClient`] implementation may return.
#[derive(Debug)]
pub enum InferenceError {
    /// Network or transport failure.
    Transport(String),
    /// The bounded request timeout elapsed.
    Timeout { secs: u64 },
    /// The endpoint returned an application-level error status.
    Api { status: u16, message: String },
    /// The body was not the required JSON shape.  Carries the raw body so
    /// the audit record can preserve it.
    Decode { raw: String, message: String },
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceError::Transport(msg) => write!(f, "inference transport error: {msg}"),
            InferenceError::Timeout { secs } => {
                write!(f, "inference request timed out after {secs}s")
            }
            InferenceError::Api { status, message } => {
                write!(f, "inference api error status={status}: {message}")
            }
            InferenceError::Decode { message, .. } => {
                write!(f, "inference reply decode failed: {message}")
            }
        }
    }
}

impl std::error::Error for InferenceError {}

impl InferenceError {
    /// The raw body, when the failure happened after one was received.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            InferenceError::Decode { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Pluggable inference endpoint.
#[async_trait::async_trait]
pub trait InferenceClient: Send + Sync {
    fn endpoint_name(&self) -> &'static str;

    async fn infer(&self, req: &InferenceRequest) -> Result<InferenceExchange, InferenceError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// HTTP-backed inference client.
///
/// The API key (when required by the deployment) is read by the caller and
/// passed in; it is never logged.
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct WirePayload<'a> {
    merchant_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    category_hint: Option<&'a str>,
    prompt: String,
}

impl HttpInferenceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn resolve_url(&self) -> String {
        format!("{}/v1/resolve", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl InferenceClient for HttpInferenceClient {
    fn endpoint_name(&self) -> &'static str {
        "http"
    }

    async fn infer(&self, req: &InferenceRequest) -> Result<InferenceExchange, InferenceError> {
        let payload = WirePayload {
            merchant_name: &req.merchant_name,
            category_hint: req.category_hint.as_deref(),
            prompt: render_prompt(req),
        };

        let mut request = self
            .http
            .post(self.resolve_url())
            .timeout(self.timeout)
            .json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    secs: self.timeout.as_secs(),
                }
            } else {
                InferenceError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    secs: self.timeout.as_secs(),
                }
            } else {
                InferenceError::Transport(e.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(InferenceError::Api {
                status: status.as_u16(),
                message: truncate(&body, 200),
            });
        }

        parse_reply_body(&body)
    }
}

/// Parse a reply body into the required shape, tolerating code-fence
/// wrapping.  Any other deviation is a decode failure.
pub fn parse_reply_body(body: &str) -> Result<InferenceExchange, InferenceError> {
    let stripped = strip_code_fences(body);
    let reply: InferenceReply =
        serde_json::from_str(stripped).map_err(|e| InferenceError::Decode {
            raw: body.to_string(),
            message: e.to_string(),
        })?;

    if reply.ticker.trim().is_empty() {
        return Err(InferenceError::Decode {
            raw: body.to_string(),
            message: "ticker is empty".to_string(),
        });
    }
    if !reply.confidence.is_finite() || !(0.0..=1.0).contains(&reply.confidence) {
        return Err(InferenceError::Decode {
            raw: body.to_string(),
            message: format!("confidence {} outside [0, 1]", reply.confidence),
        });
    }

    Ok(InferenceExchange {
        raw: body.to_string(),
        reply,
    })
}

/// Strip a leading/trailing Markdown code fence (with optional `json` tag).
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_merchant_and_optional_hint() {
        let bare = render_prompt(&InferenceRequest::new("Trader Joe's", None));
        assert!(bare.contains("Trader Joe's"));
        assert!(!bare.contains("category hint"));

        let hinted = render_prompt(&InferenceRequest::new(
            "Trader Joe's",
            Some("Groceries".to_string()),
        ));
        assert!(hinted.contains("Groceries"));
    }

    #[test]
    fn strips_fenced_json() {
        let body = "```json\n{\"ticker\":\"SBUX\"}\n```";
        assert_eq!(strip_code_fences(body), "{\"ticker\":\"SBUX\"}");
        assert_eq!(strip_code_fences("plain"), "plain");
        assert_eq!(strip_code_fences("```\nx\n```"), "x");
    }

    #[test]
    fn parses_reply_with_and_without_fences() {
        let raw = r#"{"ticker":"SBUX","company_name":"Starbucks","confidence":0.97,"reasoning":"coffee chain"}"#;
        let parsed = parse_reply_body(raw).unwrap();
        assert_eq!(parsed.reply.ticker, "SBUX");
        assert_eq!(parsed.raw, raw);

        let fenced = format!("```json\n{raw}\n```");
        assert_eq!(parse_reply_body(&fenced).unwrap().reply.ticker, "SBUX");
    }

    #[test]
    fn rejects_malformed_replies() {
        assert!(matches!(
            parse_reply_body("I think it's Starbucks"),
            Err(InferenceError::Decode { .. })
        ));
        assert!(matches!(
            parse_reply_body(r#"{"ticker":"","company_name":"x","confidence":0.9,"reasoning":null}"#),
            Err(InferenceError::Decode { .. })
        ));
        assert!(matches!(
            parse_reply_body(r#"{"ticker":"SBUX","company_name":"x","confidence":1.4,"reasoning":null}"#),
            Err(InferenceError::Decode { .. })
        ));
    }
}
