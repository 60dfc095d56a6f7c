use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::quiz::LanguageModel;
use crate::retrieval::Embedder;

const EMBED_CHAR_BUDGETS: [usize; 6] = [2000, 1500, 1000, 700, 500, 300];

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let input = text.trim();
        if input.is_empty() {
            anyhow::bail!("cannot embed empty text input");
        }

        let err = match self.embed_any_endpoint(model, input).await {
            Ok(vector) => return Ok(vector),
            Err(err) if is_context_length_error(&err) => err,
            Err(err) => return Err(err),
        };

        let char_count = input.chars().count();
        let mut last_err = err;
        for budget in EMBED_CHAR_BUDGETS {
            if char_count <= budget {
                continue;
            }

            let truncated = truncate_to_char_limit(input, budget);
            tracing::debug!(budget, "retrying embedding with truncated input");
            match self.embed_any_endpoint(model, truncated).await {
                Ok(vector) => return Ok(vector),
                Err(next) if is_context_length_error(&next) => last_err = next,
                Err(next) => return Err(next),
            }
        }

        Err(anyhow::anyhow!(
            "ollama embedding exceeded context length even after truncation \
             (chars={char_count}). last error: {last_err}"
        ))
    }

    async fn embed_any_endpoint(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        // /api/embed on current servers, /api/embeddings on older ones.
        let modern_err = match self.embed_modern(model, text).await {
            Ok(vector) => return Ok(vector),
            Err(err) => err,
        };

        self.embed_legacy(model, text).await.map_err(|legacy_err| {
            anyhow::anyhow!(
                "ollama embedding failed via /api/embed and /api/embeddings. \
                 modern error: {modern_err}; legacy error: {legacy_err}; \
                 is the model pulled? (`ollama pull {model}`)"
            )
        })
    }

    async fn embed_modern(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct EmbedReq<'a> {
            model: &'a str,
            input: &'a str,
        }

        #[derive(Deserialize)]
        struct EmbedResp {
            embeddings: Vec<Vec<f32>>,
        }

        let response: EmbedResp = self
            .post_json("/api/embed", &EmbedReq { model, input: text })
            .await?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("ollama /api/embed returned empty embeddings array"))
    }

    async fn embed_legacy(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct EmbeddingReq<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct EmbeddingResp {
            embedding: Vec<f32>,
        }

        let response: EmbeddingResp = self
            .post_json(
                "/api/embeddings",
                &EmbeddingReq {
                    model,
                    prompt: text,
                },
            )
            .await?;
        Ok(response.embedding)
    }

    pub async fn generate_text(
        &self,
        model: &str,
        prompt: &str,
        num_predict: usize,
        temperature: f32,
    ) -> Result<String> {
        #[derive(Serialize)]
        struct GenerateReq<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
            options: GenerateOptions,
        }

        #[derive(Serialize)]
        struct GenerateOptions {
            num_predict: usize,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct GenerateResp {
            response: String,
        }

        let response: GenerateResp = self
            .post_json(
                "/api/generate",
                &GenerateReq {
                    model,
                    prompt,
                    stream: false,
                    options: GenerateOptions {
                        num_predict,
                        temperature,
                    },
                },
            )
            .await?;

        let text = response.response.trim();
        if text.is_empty() {
            anyhow::bail!("ollama model {model} returned an empty completion");
        }
        Ok(text.to_string())
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to call ollama {path}"))?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("ollama {path} returned {status}: {}", normalize_err_body(&body));
        }

        response
            .json::<R>()
            .await
            .with_context(|| format!("failed to decode ollama {path} response"))
    }
}

#[derive(Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.client.embed(&self.model, text).await
    }
}

#[derive(Clone)]
pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
    num_predict: usize,
    temperature: f32,
}

impl OllamaGenerator {
    pub fn new(client: OllamaClient, model: impl Into<String>, num_predict: usize) -> Self {
        Self {
            client,
            model: model.into(),
            num_predict,
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

impl LanguageModel for OllamaGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.client
            .generate_text(&self.model, prompt, self.num_predict, self.temperature)
            .await
    }
}

fn normalize_err_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|json| json.get("error").and_then(|v| v.as_str()).map(str::to_string))
        .unwrap_or_else(|| trimmed.to_string())
}

fn is_context_length_error(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("input length exceeds the context length")
        || (msg.contains("context length") && msg.contains("input length"))
}

fn truncate_to_char_limit(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_error_field_from_json_body() {
        assert_eq!(
            normalize_err_body(r#"{"error":"model \"x\" not found"}"#),
            "model \"x\" not found"
        );
        assert_eq!(normalize_err_body("  "), "<empty body>");
        assert_eq!(normalize_err_body("plain failure"), "plain failure");
    }

    #[test]
    fn recognises_context_length_errors() {
        let err = anyhow::anyhow!("the input length exceeds the context length");
        assert!(is_context_length_error(&err));
        assert!(!is_context_length_error(&anyhow::anyhow!("connection refused")));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_to_char_limit("배열의 길이", 3), "배열의");
        assert_eq!(truncate_to_char_limit("int", 10), "int");
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_any_request() {
        let client = OllamaClient::new("http://127.0.0.1:9");
        let err = client.embed("model", "   ").await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
