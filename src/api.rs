use crate::error::ChatError;
use crate::models::GenerationRequest;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{future, stream, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// Alias for the stream type providers return
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// Interface every streaming backend adapter implements.
///
/// The returned stream yields text deltas in arrival order. A recoverable
/// (malformed-chunk) problem is logged and skipped inside the adapter; an
/// `Err` item is terminal for the session. No retries happen at this layer.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn stream_request(
        &self,
        request: &GenerationRequest,
        credential: &str,
    ) -> Result<DeltaStream, ChatError>;
}

/// One decoded unit of an in-flight stream, before session folding.
enum Frame {
    Delta(String),
    /// Unusable chunk, already logged; the stream continues.
    Skip,
    /// Backend-signalled end of generation.
    Done,
    /// Terminal failure; surfaced to the session as an `Err` item.
    Fail(ChatError),
}

fn frames_to_deltas(
    frames: impl Stream<Item = Frame> + Send + 'static,
) -> DeltaStream {
    let deltas = frames
        .take_while(|frame| future::ready(!matches!(frame, Frame::Done)))
        .filter_map(|frame| async move {
            match frame {
                Frame::Delta(text) => Some(Ok(text)),
                Frame::Skip => None,
                Frame::Done => None,
                Frame::Fail(e) => Some(Err(e)),
            }
        });
    Box::pin(deltas)
}

async fn reject_on_error_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    log::error!("Provider request failed with status {}: {}", status, body);
    Err(ChatError::Provider(format!("status {}: {}", status, body)))
}

// --- OpenAI-style chat completions (shared by OpenAI and Groq) ---

#[derive(Serialize, Debug)]
struct ChatCompletionsBody {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

/// Decode one `data:` payload from a chat-completions SSE stream. Malformed
/// JSON never fails the session; the line is logged and skipped.
fn parse_chat_completions_data(data: &str) -> Frame {
    if data == "[DONE]" {
        return Frame::Done;
    }
    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => match chunk.choices.first().and_then(|c| c.delta.content.clone()) {
            Some(content) => Frame::Delta(content),
            None => Frame::Skip,
        },
        Err(e) => {
            log::warn!("Skipping malformed stream chunk ({}): {}", e, data);
            Frame::Skip
        }
    }
}

async fn open_chat_completions_stream(
    client: &Client,
    url: &str,
    api_key: &str,
    request: &GenerationRequest,
) -> Result<DeltaStream, ChatError> {
    let body = ChatCompletionsBody {
        model: request.model.model_id.clone(),
        messages: vec![WireMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        }],
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        stream: true,
    };

    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await?;
    let response = reject_on_error_status(response).await?;

    let frames = response.bytes_stream().eventsource().map(|event_result| {
        match event_result {
            Ok(event) => parse_chat_completions_data(event.data.trim()),
            Err(e) => Frame::Fail(ChatError::Provider(format!("stream read failed: {}", e))),
        }
    });
    Ok(frames_to_deltas(frames))
}

/// OpenAI chat completions, SSE `data:` lines terminated by `[DONE]`.
pub struct OpenAiProvider {
    client: Client,
}

impl OpenAiProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn stream_request(
        &self,
        request: &GenerationRequest,
        credential: &str,
    ) -> Result<DeltaStream, ChatError> {
        log::info!("Starting OpenAI stream for model {}", request.model.model_id);
        open_chat_completions_stream(&self.client, OPENAI_CHAT_URL, credential, request).await
    }
}

/// Groq speaks the same chat-completions wire protocol on its own endpoint.
pub struct GroqProvider {
    client: Client,
}

impl GroqProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    async fn stream_request(
        &self,
        request: &GenerationRequest,
        credential: &str,
    ) -> Result<DeltaStream, ChatError> {
        log::info!("Starting Groq stream for model {}", request.model.model_id);
        open_chat_completions_stream(&self.client, GROQ_CHAT_URL, credential, request).await
    }
}

// --- Anthropic messages API ---

#[derive(Serialize, Debug)]
struct AnthropicBody {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct AnthropicStreamEvent {
    delta: Option<AnthropicDelta>,
}

#[derive(Deserialize, Debug)]
struct AnthropicDelta {
    text: Option<String>,
}

/// Decode one named SSE event from the Anthropic messages stream. An `error`
/// event degrades to a single terminal failure rather than unwinding.
fn parse_anthropic_event(event_name: &str, data: &str) -> Frame {
    match event_name {
        "content_block_delta" => match serde_json::from_str::<AnthropicStreamEvent>(data) {
            Ok(event) => match event.delta.and_then(|d| d.text) {
                Some(text) => Frame::Delta(text),
                None => Frame::Skip,
            },
            Err(e) => {
                log::warn!("Skipping malformed Anthropic chunk ({}): {}", e, data);
                Frame::Skip
            }
        },
        "message_stop" => Frame::Done,
        "error" => Frame::Fail(ChatError::Provider(data.to_string())),
        // ping, message_start, content_block_start/stop, message_delta
        _ => Frame::Skip,
    }
}

pub struct AnthropicProvider {
    client: Client,
}

impl AnthropicProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn stream_request(
        &self,
        request: &GenerationRequest,
        credential: &str,
    ) -> Result<DeltaStream, ChatError> {
        log::info!("Starting Anthropic stream for model {}", request.model.model_id);
        let body = AnthropicBody {
            model: request.model.model_id.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![WireMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            stream: true,
        };

        let response = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", credential)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;
        let response = reject_on_error_status(response).await?;

        let frames = response.bytes_stream().eventsource().map(|event_result| {
            match event_result {
                Ok(event) => parse_anthropic_event(&event.event, event.data.trim()),
                Err(e) => Frame::Fail(ChatError::Provider(format!("stream read failed: {}", e))),
            }
        });
        Ok(frames_to_deltas(frames))
    }
}

// --- Ollama generate API ---

#[derive(Serialize, Debug)]
struct OllamaBody {
    model: String,
    prompt: String,
    options: OllamaOptions,
}

#[derive(Serialize, Debug)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct OllamaLine {
    #[serde(default)]
    done: bool,
    response: Option<String>,
}

/// Decode one newline-delimited JSON object from an Ollama generate stream.
fn parse_ollama_line(line: &str) -> Frame {
    match serde_json::from_str::<OllamaLine>(line) {
        Ok(parsed) if parsed.done => Frame::Done,
        Ok(parsed) => match parsed.response {
            Some(text) => Frame::Delta(text),
            None => Frame::Skip,
        },
        Err(e) => {
            log::warn!("Skipping malformed Ollama line ({}): {}", e, line);
            Frame::Skip
        }
    }
}

/// Split a raw byte stream into NDJSON frames, buffering partial lines
/// across chunk boundaries.
fn ndjson_frames(
    bytes: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Frame> + Send + 'static {
    bytes
        .scan(String::new(), |buffer, chunk_result| {
            let frames = match chunk_result {
                Ok(chunk) => {
                    buffer.push_str(&String::from_utf8_lossy(&chunk));
                    let mut out = Vec::new();
                    while let Some(newline) = buffer.find('\n') {
                        let line = buffer[..newline].trim().to_string();
                        buffer.drain(..=newline);
                        if !line.is_empty() {
                            out.push(parse_ollama_line(&line));
                        }
                    }
                    out
                }
                Err(e) => vec![Frame::Fail(ChatError::Transport(e))],
            };
            future::ready(Some(stream::iter(frames)))
        })
        .flatten()
}

pub struct OllamaProvider {
    client: Client,
}

impl OllamaProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn stream_request(
        &self,
        request: &GenerationRequest,
        credential: &str,
    ) -> Result<DeltaStream, ChatError> {
        // The credential for Ollama is the host, not a key.
        let url = format!("http://{}:11434/api/generate", credential);
        log::info!("Starting Ollama stream for model {} at {}", request.model.model_id, url);
        let body = OllamaBody {
            model: request.model.model_id.clone(),
            prompt: request.prompt.clone(),
            options: OllamaOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
            },
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let response = reject_on_error_status(response).await?;

        Ok(frames_to_deltas(ndjson_frames(response.bytes_stream())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_completions_delta_is_extracted() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert!(matches!(
            parse_chat_completions_data(data),
            Frame::Delta(ref t) if t == "Hel"
        ));
    }

    #[test]
    fn chat_completions_done_sentinel_ends_stream() {
        assert!(matches!(parse_chat_completions_data("[DONE]"), Frame::Done));
    }

    #[test]
    fn chat_completions_malformed_chunk_is_skipped() {
        assert!(matches!(parse_chat_completions_data("{not json"), Frame::Skip));
        // A role-only first chunk carries no content and is also skipped
        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(matches!(parse_chat_completions_data(role_only), Frame::Skip));
    }

    #[test]
    fn anthropic_text_delta_is_extracted() {
        let data = r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"hi"}}"#;
        assert!(matches!(
            parse_anthropic_event("content_block_delta", data),
            Frame::Delta(ref t) if t == "hi"
        ));
    }

    #[test]
    fn anthropic_lifecycle_events_are_skipped() {
        assert!(matches!(parse_anthropic_event("ping", "{}"), Frame::Skip));
        assert!(matches!(parse_anthropic_event("message_start", "{}"), Frame::Skip));
        assert!(matches!(parse_anthropic_event("message_stop", ""), Frame::Done));
    }

    #[test]
    fn anthropic_error_event_is_terminal() {
        let frame = parse_anthropic_event("error", r#"{"type":"overloaded_error"}"#);
        assert!(matches!(frame, Frame::Fail(ChatError::Provider(_))));
    }

    #[test]
    fn ollama_line_parsing() {
        assert!(matches!(
            parse_ollama_line(r#"{"response":"tok","done":false}"#),
            Frame::Delta(ref t) if t == "tok"
        ));
        assert!(matches!(parse_ollama_line(r#"{"done":true}"#), Frame::Done));
        assert!(matches!(parse_ollama_line("garbage"), Frame::Skip));
    }

    #[tokio::test]
    async fn ndjson_frames_handle_split_lines() {
        let chunks: Vec<Result<bytes::Bytes, reqwest::Error>> = vec![
            Ok(bytes::Bytes::from(r#"{"response":"a","#)),
            Ok(bytes::Bytes::from("\"done\":false}\n{\"response\":\"b\",\"done\":false}\n")),
            Ok(bytes::Bytes::from("{\"done\":true}\n")),
        ];
        let deltas: Vec<_> = frames_to_deltas(ndjson_frames(stream::iter(chunks)))
            .collect()
            .await;
        let texts: Vec<String> = deltas.into_iter().map(|d| d.unwrap()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn malformed_chunk_does_not_end_stream() {
        let frames = stream::iter(vec![
            Frame::Delta("x".to_string()),
            Frame::Skip,
            Frame::Delta("y".to_string()),
            Frame::Done,
        ]);
        let deltas: Vec<_> = frames_to_deltas(frames).collect().await;
        let texts: Vec<String> = deltas.into_iter().map(|d| d.unwrap()).collect();
        assert_eq!(texts, vec!["x", "y"]);
    }
}
