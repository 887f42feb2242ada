//! Backend for Ollama's native API.
//!
//! [`OllamaBackend`] sends normalized [`LlmRequest`]s to `/api/generate`
//! with `stream: false` and reads the `response` field.

use super::{Backend, LlmRequest, LlmResponse};
use crate::error::{ExtractError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Backend for Ollama's `/api/generate` endpoint.
#[derive(Debug, Clone, Default)]
pub struct OllamaBackend;

impl OllamaBackend {
    /// The `options` object: temperature and token limit, then any custom options.
    fn build_options(request: &LlmRequest) -> Value {
        let mut opts = json!({
            "temperature": request.temperature,
            "num_predict": request.max_tokens,
        });
        if let (Some(base), Some(extra)) = (
            opts.as_object_mut(),
            request.options.as_ref().and_then(Value::as_object),
        ) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        opts
    }

    fn build_generate_body(request: &LlmRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": Self::build_options(request),
        });
        if request.json_mode {
            body["format"] = json!("json");
        }
        body
    }

    /// Retry-After in integer seconds.
    fn parse_retry_after(value: &str) -> Option<Duration> {
        value.trim().parse::<u64>().ok().map(Duration::from_secs)
    }

    fn extract_metadata(json_resp: &Value) -> Option<Value> {
        let meta: Map<String, Value> = [
            "total_duration",
            "eval_count",
            "eval_duration",
            "prompt_eval_count",
            "model",
        ]
        .iter()
        .filter_map(|k| json_resp.get(*k).map(|v| (k.to_string(), v.clone())))
        .collect();
        if meta.is_empty() {
            None
        } else {
            Some(Value::Object(meta))
        }
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        let url = format!("{}/api/generate", base_url.trim_end_matches('/'));
        let body = Self::build_generate_body(request);

        let resp = client.post(&url).json(&body).send().await?;
        let status = resp.status().as_u16();

        if !resp.status().is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(Self::parse_retry_after);
            let text = resp.text().await.unwrap_or_default();
            return Err(ExtractError::HttpError {
                status,
                body: text,
                retry_after,
            });
        }

        let json_resp: Value = resp.json().await?;
        let text = json_resp
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        Ok(LlmResponse {
            text,
            status,
            metadata: Self::extract_metadata(&json_resp),
        })
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OracleConfig;

    fn test_request() -> LlmRequest {
        LlmRequest::from_config(
            &OracleConfig::default().with_model("llama3.2"),
            "Extract the pericardium findings.",
        )
    }

    #[test]
    fn test_generate_payload() {
        let body = OllamaBackend::build_generate_body(&test_request());
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["prompt"], "Extract the pericardium findings.");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.0);
        assert_eq!(body["options"]["num_predict"], 4096);
        assert!(body.get("format").is_none());
    }

    #[test]
    fn test_json_mode_sets_format() {
        let mut request = test_request();
        request.json_mode = true;
        let body = OllamaBackend::build_generate_body(&request);
        assert_eq!(body["format"], "json");
    }

    #[test]
    fn test_custom_options_merge() {
        let mut request = test_request();
        request.options = Some(json!({"top_p": 0.9, "seed": 42}));
        let body = OllamaBackend::build_generate_body(&request);
        assert_eq!(body["options"]["top_p"], 0.9);
        assert_eq!(body["options"]["seed"], 42);
        assert_eq!(body["options"]["num_predict"], 4096);
    }

    #[test]
    fn test_metadata_and_retry_after() {
        let meta = OllamaBackend::extract_metadata(&json!({"eval_count": 12, "response": "x"}));
        assert_eq!(meta, Some(json!({"eval_count": 12})));
        assert!(OllamaBackend::extract_metadata(&json!({"response": "x"})).is_none());
        assert_eq!(OllamaBackend::parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
        assert_eq!(OllamaBackend::parse_retry_after("soon"), None);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_request_error() {
        let err = OllamaBackend
            .complete(&Client::new(), "http://127.0.0.1:9", &test_request())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Request(_)));
    }
}
