//! Chat model clients
//!
//! Streaming chat completion against OpenAI-compatible and Ollama
//! APIs. Both decoders carry a line buffer across network reads, so a
//! delta split over two reads is reassembled instead of dropped.

use async_trait::async_trait;
use docchat_core::{DocChatError, LlmConfig, LlmProvider, Result};
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trait for streaming chat completion
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start a completion and return the stream of text deltas.
    /// Dropping the stream aborts the upstream request.
    async fn stream_chat(&self, system: &str, user: &str)
        -> Result<BoxStream<'static, Result<String>>>;
}

// ============================================================================
// OpenAI Chat Model
// ============================================================================

/// OpenAI chat completions client
pub struct OpenAiChatModel {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

impl OpenAiChatModel {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            max_tokens,
            temperature,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| DocChatError::Config("OpenAI API key required".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocChatError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.clone(),
            base_url: config
                .openai_base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn stream_chat(
        &self,
        system: &str,
        user: &str,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| DocChatError::StreamUpstream(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocChatError::StreamUpstream(format!(
                "OpenAI error ({status}): {error_text}"
            )));
        }

        Ok(decode_sse_stream(response.bytes_stream()))
    }
}

/// Decode an OpenAI SSE byte stream into text deltas.
///
/// Lines are accumulated in a carry-over buffer, so `data:` frames that
/// arrive split across reads still parse; a final frame without a
/// trailing newline is flushed when the stream ends. `[DONE]` and
/// non-delta frames are skipped.
fn decode_sse_stream<S, B, E>(bytes: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let decoded = bytes
        .map(Some)
        .chain(futures::stream::iter(std::iter::once(None)))
        .scan(String::new(), |buffer, read| {
            let items: Vec<Result<String>> = match read {
                Some(Ok(chunk)) => {
                    buffer.push_str(&String::from_utf8_lossy(chunk.as_ref()));
                    let mut deltas = Vec::new();
                    while let Some(pos) = buffer.find('\n') {
                        let line: String = buffer.drain(..=pos).collect();
                        if let Some(delta) = parse_sse_line(line.trim_end()) {
                            deltas.push(Ok(delta));
                        }
                    }
                    deltas
                }
                Some(Err(e)) => vec![Err(DocChatError::StreamUpstream(format!(
                    "stream read failed: {e}"
                )))],
                // stream ended: flush an unterminated final line
                None => {
                    let rest = std::mem::take(buffer);
                    parse_sse_line(rest.trim_end()).map(Ok).into_iter().collect()
                }
            };
            futures::future::ready(Some(items))
        })
        .flat_map(futures::stream::iter);

    Box::pin(decoded)
}

/// Extract the text delta from one SSE line, if it carries one
fn parse_sse_line(line: &str) -> Option<String> {
    let data = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
    let data = data.trim();
    if data == "[DONE]" {
        return None;
    }
    let parsed: StreamResponse = serde_json::from_str(data).ok()?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
}

// ============================================================================
// Ollama Chat Model
// ============================================================================

/// Ollama generate API client
pub struct OllamaChatModel {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct OllamaResponse {
    response: String,
    done: bool,
}

impl OllamaChatModel {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.ollama_url.clone(), config.model.clone())
    }
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    async fn stream_chat(
        &self,
        system: &str,
        user: &str,
    ) -> Result<BoxStream<'static, Result<String>>> {
        // Ollama's generate endpoint takes a single prompt
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: format!("{system}\n\n{user}"),
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| DocChatError::StreamUpstream(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocChatError::StreamUpstream(format!(
                "Ollama error: {error_text}"
            )));
        }

        Ok(decode_ndjson_stream(response.bytes_stream()))
    }
}

/// Decode Ollama's newline-delimited JSON stream into text deltas,
/// with the same carry-over buffering and end-of-stream flush as the
/// SSE decoder
fn decode_ndjson_stream<S, B, E>(bytes: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let decoded = bytes
        .map(Some)
        .chain(futures::stream::iter(std::iter::once(None)))
        .scan(String::new(), |buffer, read| {
            let items: Vec<Result<String>> = match read {
                Some(Ok(chunk)) => {
                    buffer.push_str(&String::from_utf8_lossy(chunk.as_ref()));
                    let mut deltas = Vec::new();
                    while let Some(pos) = buffer.find('\n') {
                        let line: String = buffer.drain(..=pos).collect();
                        if let Some(delta) = parse_ndjson_line(&line) {
                            deltas.push(Ok(delta));
                        }
                    }
                    deltas
                }
                Some(Err(e)) => vec![Err(DocChatError::StreamUpstream(format!(
                    "stream read failed: {e}"
                )))],
                None => {
                    let rest = std::mem::take(buffer);
                    parse_ndjson_line(&rest).map(Ok).into_iter().collect()
                }
            };
            futures::future::ready(Some(items))
        })
        .flat_map(futures::stream::iter);

    Box::pin(decoded)
}

fn parse_ndjson_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let parsed: OllamaResponse = serde_json::from_str(line).ok()?;
    Some(parsed.response).filter(|r| !r.is_empty())
}

// ============================================================================
// Factory function
// ============================================================================

/// Create a chat model client from config
pub fn create_chat_model(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Box::new(OpenAiChatModel::from_config(config)?)),
        LlmProvider::Ollama => Ok(Box::new(OllamaChatModel::from_config(config))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn reads(parts: &[&str]) -> impl Stream<Item = std::result::Result<Vec<u8>, String>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(p.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    fn delta_frame(text: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{text}\"}}}}]}}\n\n"
        )
    }

    #[tokio::test]
    async fn test_sse_decodes_deltas_in_order() {
        let frames = format!(
            "{}{}data: [DONE]\n\n",
            delta_frame("Hello"),
            delta_frame(" world")
        );
        let out: Vec<_> = decode_sse_stream(reads(&[&frames])).collect().await;
        let texts: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Hello", " world"]);
    }

    #[tokio::test]
    async fn test_sse_frame_split_across_reads_is_reassembled() {
        let frame = delta_frame("split delta");
        let (head, tail) = frame.split_at(20);
        let out: Vec<_> = decode_sse_stream(reads(&[head, tail])).collect().await;
        let texts: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["split delta"]);
    }

    #[tokio::test]
    async fn test_sse_read_error_surfaces() {
        let parts: Vec<std::result::Result<Vec<u8>, String>> = vec![
            Ok(delta_frame("ok").into_bytes()),
            Err("connection reset".to_string()),
        ];
        let out: Vec<_> = decode_sse_stream(stream::iter(parts)).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "ok");
        assert!(matches!(out[1], Err(DocChatError::StreamUpstream(_))));
    }

    #[test]
    fn test_sse_line_skips_done_and_empty() {
        assert_eq!(parse_sse_line("data: [DONE]"), None);
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keepalive"), None);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            None
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#),
            Some("hi".to_string())
        );
    }

    #[tokio::test]
    async fn test_sse_unterminated_final_frame_is_flushed() {
        // upstream closed without a trailing newline
        let frame = r#"data: {"choices":[{"delta":{"content":"tail"}}]}"#;
        let out: Vec<_> = decode_sse_stream(reads(&[frame])).collect().await;
        let texts: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["tail"]);
    }

    #[tokio::test]
    async fn test_ndjson_unterminated_final_line_is_flushed() {
        let line = r#"{"response":"tail","done":true}"#;
        let out: Vec<_> = decode_ndjson_stream(reads(&[line])).collect().await;
        let texts: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["tail"]);
    }

    #[tokio::test]
    async fn test_ndjson_decodes_split_lines() {
        let line = r#"{"response":"Hel","done":false}"#.to_string() + "\n";
        let second = r#"{"response":"lo","done":true}"#.to_string() + "\n";
        let (head, tail) = line.split_at(10);
        let out: Vec<_> = decode_ndjson_stream(reads(&[head, tail, &second]))
            .collect()
            .await;
        let texts: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Hel", "lo"]);
    }

    #[test]
    fn test_config_requires_api_key_for_openai() {
        let config = LlmConfig::default();
        assert!(OpenAiChatModel::from_config(&config).is_err());
    }
}
