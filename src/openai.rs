use crate::chat::{ChatMessage, ChatModel};
use crate::config::OpenAiConfig;
use crate::embeddings::{Embedder, Embedding};
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

/// Client for an OpenAI-compatible embeddings and chat-completions API
#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(config: OpenAiConfig) -> Self {
        let client = reqwest::Client::new();
        OpenAiClient { config, client }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: for<'de> Deserialize<'de>,
    {
        let url = self.endpoint(path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "API request failed: {} {}",
                status,
                error_text
            ));
        }

        response
            .json()
            .await
            .with_context(|| format!("Invalid response body from {}", url))
    }
}

impl Embedder for OpenAiClient {
    /// Generate embeddings for a text
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: text,
        };

        let response_data: EmbeddingResponse = self.post("embeddings", &request).await?;

        response_data
            .data
            .into_iter()
            .next()
            .map(|d| Embedding {
                values: d.embedding,
            })
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }
}

impl ChatModel for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages,
            temperature: 0.0,
        };

        let response_data: ChatResponse = self.post("chat/completions", &request).await?;

        // Extract the generated text from the response
        response_data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("No response generated"))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: Option<String>,
}
