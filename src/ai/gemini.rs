//! Gemini `generateContent` client.
//!
//! Posts through `curl` via `std::process::Command`, the same way the binary
//! fetches anything else over HTTP, so no HTTP client crate is needed.

use std::io::Write;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use super::GenerativeClient;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Request<'a> {
    contents: [Content<'a>; 1],
    generation_config: &'a GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Deserialize)]
struct ReplyPart {
    #[serde(default)]
    text: String,
}

pub struct GeminiClient {
    api_key: String,
    /// e.g. `https://generativelanguage.googleapis.com/v1beta`
    endpoint: String,
    model: String,
    generation: GenerationConfig,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        endpoint: String,
        model: String,
        generation: GenerationConfig,
    ) -> Self {
        GeminiClient {
            api_key,
            endpoint,
            model,
            generation,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }

    /// Header lines fed to `curl -H @-`.
    fn key_header(&self) -> String {
        format!("x-goog-api-key: {}\n", self.api_key)
    }

    fn curl_args(&self, body: &str) -> Vec<String> {
        [
            "-sS",
            "--fail-with-body",
            "-X",
            "POST",
            "-H",
            "Content-Type: application/json",
            "-H",
            "@-",
            "--data-binary",
            body,
            self.url().as_str(),
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }

    fn request_body(&self, prompt: &str) -> Result<String> {
        let request = Request {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
            generation_config: &self.generation,
        };
        Ok(serde_json::to_string(&request)?)
    }
}

/// First text part of the first candidate.
fn reply_text(raw: &str) -> Result<String> {
    let response: Response = serde_json::from_str(raw)
        .map_err(|e| Error::AiService(format!("unreadable response: {e}")))?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().next())
        .map(|p| p.text)
        .ok_or_else(|| Error::AiService("no candidates in response".into()))
}

impl GenerativeClient for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let body = self.request_body(prompt)?;
        tracing::debug!("POST {} ({} byte prompt)", self.url(), prompt.len());

        let mut child = Command::new("curl")
            .args(self.curl_args(&body))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::AiService(format!("failed to run curl: {e}")))?;
        // The key travels on stdin so it never shows up in the process list.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(self.key_header().as_bytes())
                .map_err(|e| Error::AiService(format!("failed to pass headers to curl: {e}")))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| Error::AiService(format!("failed to run curl: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::AiService(format!(
                "request failed ({}): {} {}",
                output.status.code().unwrap_or(-1),
                stderr.trim(),
                stdout.trim()
            )));
        }
        reply_text(&stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GeminiClient {
        GeminiClient::new(
            "k".into(),
            "https://generativelanguage.googleapis.com/v1beta/".into(),
            "gemini-2.0-flash".into(),
            GenerationConfig::default(),
        )
    }

    #[test]
    fn url_joins_endpoint_and_model() {
        assert_eq!(
            client().url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn request_body_shape() {
        let body: serde_json::Value =
            serde_json::from_str(&client().request_body("hello").unwrap()).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn api_key_stays_out_of_argv() {
        let client = GeminiClient::new(
            "secret-key".into(),
            "https://generativelanguage.googleapis.com/v1beta".into(),
            "gemini-2.0-flash".into(),
            GenerationConfig::default(),
        );
        let args = client.curl_args("{}");
        assert!(args.iter().all(|a| !a.contains("secret-key")));
        assert!(args.windows(2).any(|w| w[0] == "-H" && w[1] == "@-"));
        assert_eq!(client.key_header(), "x-goog-api-key: secret-key\n");
    }

    #[test]
    fn reply_text_takes_first_candidate() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"hi"}]}}]}"#;
        assert_eq!(reply_text(raw).unwrap(), "hi");
        assert!(reply_text(r#"{"candidates":[]}"#).is_err());
        assert!(reply_text("not json").is_err());
    }
}
