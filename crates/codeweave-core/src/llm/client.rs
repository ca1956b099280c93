//! HTTP client for OpenAI-compatible LLM services (vLLM, OpenAI, etc.)

use super::cache::{CacheKey, CacheKind, LLMCache};
use crate::config::LLMServiceConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for LLM service clients
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate chat completion
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String>;

    /// Generate chat completion as a stream of text deltas
    async fn chat_completion_stream(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<BoxStream<'static, Result<String>>>;

    /// Generate embeddings for multiple texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimensions
    fn embedding_dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Chat message for completion requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// API metrics for monitoring
#[derive(Debug, Default)]
pub struct APIMetrics {
    pub total_requests: AtomicU64,
    pub total_errors: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub total_latency_ms: AtomicU64,
}

/// Snapshot of API metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub avg_latency_ms: f64,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// vLLM/OpenAI-compatible client
pub struct VLLMClient {
    http_client: reqwest::Client,
    config: LLMServiceConfig,
    embedding_dimensions: usize,
    cache: LLMCache,
    metrics: Arc<APIMetrics>,
}

impl VLLMClient {
    /// Create new client from configuration
    pub fn new(config: LLMServiceConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let embedding_dimensions = config.embedding_dimensions.unwrap_or(384);

        Ok(Self {
            http_client,
            config,
            embedding_dimensions,
            cache: LLMCache::new(),
            metrics: Arc::new(APIMetrics::default()),
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(LLMServiceConfig::default())
    }

    /// Get current API metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        let total = self.metrics.total_requests.load(Ordering::Relaxed);
        MetricsSnapshot {
            total_requests: total,
            total_errors: self.metrics.total_errors.load(Ordering::Relaxed),
            cache_hits: self.metrics.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.metrics.cache_misses.load(Ordering::Relaxed),
            avg_latency_ms: if total > 0 {
                self.metrics.total_latency_ms.load(Ordering::Relaxed) as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<reqwest::Response> {
        let mut req = self.http_client.post(url).json(body);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await.map_err(|e| {
            self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
            Error::Http(e)
        })?;

        if !response.status().is_success() {
            self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ExternalError(format!(
                "LLM service error (HTTP {}) at {}: {}",
                status, url, body
            )));
        }
        Ok(response)
    }

    fn record_latency(&self, start: Instant) {
        self.metrics
            .total_latency_ms
            .fetch_add(start.elapsed().as_millis() as u64, Ordering::Relaxed);
    }
}

impl Drop for VLLMClient {
    fn drop(&mut self) {
        let metrics = self.metrics();
        if metrics.total_requests > 0 {
            tracing::debug!(
                model = %self.config.model,
                requests = metrics.total_requests,
                errors = metrics.total_errors,
                cache_hits = metrics.cache_hits,
                cache_misses = metrics.cache_misses,
                avg_latency_ms = metrics.avg_latency_ms,
                "llm client usage"
            );
        }
    }
}

#[async_trait]
impl LLMClient for VLLMClient {
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let start = Instant::now();
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        let messages_json = serde_json::to_string(&messages)?;
        let cache_key = CacheKey::new(CacheKind::Chat, &self.config.model, &messages_json);
        if let Some(cached) = self.cache.get(&cache_key) {
            tracing::debug!("Cache hit for chat completion");
            self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached);
        }
        self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);

        let request = ChatRequest {
            model: &self.config.model,
            messages: &messages,
            temperature: 0.2,
            max_tokens: 1024,
            stream: false,
        };
        let url = format!("{}/v1/chat/completions", self.config.url);
        let response = self.post_json(&url, &request).await?;

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
            Error::Http(e)
        })?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
                Error::Llm("No response from LLM".to_string())
            })?
            .message
            .content;

        self.cache.insert(cache_key, content.clone());
        self.record_latency(start);
        Ok(content)
    }

    async fn chat_completion_stream(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<BoxStream<'static, Result<String>>> {
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        let request = ChatRequest {
            model: &self.config.model,
            messages: &messages,
            temperature: 0.2,
            max_tokens: 1024,
            stream: true,
        };
        let url = format!("{}/v1/chat/completions", self.config.url);
        let response = self.post_json(&url, &request).await?;

        Ok(sse_deltas(response.bytes_stream().boxed()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut uncached_texts = Vec::new();
        let mut uncached_indices = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let cache_key =
                CacheKey::new(CacheKind::Embedding, &self.config.embedding_model, text);
            if let Some(embedding) = self
                .cache
                .get(&cache_key)
                .and_then(|cached| serde_json::from_str::<Vec<f32>>(&cached).ok())
            {
                results.push(Some(embedding));
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
            results.push(None);
            uncached_texts.push(text.clone());
            uncached_indices.push(i);
        }

        if !uncached_texts.is_empty() {
            tracing::debug!(
                "Embedding batch: {} cached, {} to fetch",
                texts.len() - uncached_texts.len(),
                uncached_texts.len()
            );

            #[derive(Serialize)]
            struct EmbedRequest<'a> {
                model: &'a str,
                input: &'a [String],
            }

            #[derive(Deserialize)]
            struct EmbedResponse {
                data: Vec<EmbedData>,
            }

            #[derive(Deserialize)]
            struct EmbedData {
                embedding: Vec<f32>,
            }

            let request = EmbedRequest {
                model: &self.config.embedding_model,
                input: &uncached_texts,
            };
            let url = format!("{}/v1/embeddings", self.config.embeddings_url());
            let response = self.post_json(&url, &request).await?;
            let embed_response: EmbedResponse = response.json().await.map_err(|e| {
                self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
                Error::Http(e)
            })?;

            if embed_response.data.len() != uncached_texts.len() {
                self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
                return Err(Error::Llm(format!(
                    "embedding service returned {} vectors for {} inputs",
                    embed_response.data.len(),
                    uncached_texts.len()
                )));
            }

            for (i, data) in embed_response.data.into_iter().enumerate() {
                let cache_key = CacheKey::new(
                    CacheKind::Embedding,
                    &self.config.embedding_model,
                    &uncached_texts[i],
                );
                if let Ok(json) = serde_json::to_string(&data.embedding) {
                    self.cache.insert(cache_key, json);
                }
                results[uncached_indices[i]] = Some(data.embedding);
            }
        }

        self.record_latency(start);
        let dims = self.embedding_dimensions;
        Ok(results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| vec![0.0; dims]))
            .collect())
    }

    fn embedding_dimensions(&self) -> usize {
        self.embedding_dimensions
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
            Some(text) if !text.is_empty() => SseLine::Delta(text),
            _ => SseLine::Skip,
        },
        Err(e) => {
            tracing::debug!("Skipping unparseable stream chunk: {}", e);
            SseLine::Skip
        }
    }
}

type ByteStream = BoxStream<'static, std::result::Result<bytes::Bytes, reqwest::Error>>;

/// Turn a server-sent-events body into content deltas
fn sse_deltas(bytes: ByteStream) -> BoxStream<'static, Result<String>> {
    futures::stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        |(mut bytes, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    match parse_sse_line(line.trim()) {
                        SseLine::Delta(text) => return Some((Ok(text), (bytes, buffer, false))),
                        SseLine::Done => return None,
                        SseLine::Skip => continue,
                    }
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => return Some((Err(Error::Http(e)), (bytes, buffer, true))),
                    None => {
                        if buffer.is_empty() {
                            return None;
                        }
                        buffer.push(b'\n');
                    }
                }
            }
        },
    )
    .boxed()
}

/// Slice from the first `{` to the last `}`, tolerating markdown fences around JSON
pub(crate) fn extract_json(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}
