//! Transports performing a single blocking exchange with the model service.

use super::types::{InferenceRequest, InferenceResponse, Role, StopReason};
use crate::errors::InferenceError;
use serde::{Deserialize, Serialize};

/// One blocking request/response exchange with the model service.
///
/// Implementations are shared across concurrent runs and must not keep
/// per-request state.
pub trait ModelTransport: Send + Sync + std::fmt::Debug {
    /// Sends the request and waits for the response.
    fn converse(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct WireText {
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: Role,
    content: Vec<WireText>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireInferenceConfig {
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    messages: Vec<WireMessage>,
    system: Vec<WireText>,
    inference_config: WireInferenceConfig,
}

#[derive(Debug, Deserialize)]
struct WireOutput {
    message: WireMessage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    output: WireOutput,
    stop_reason: String,
    #[serde(default)]
    usage: WireUsage,
}

fn to_wire(request: &InferenceRequest) -> WireRequest {
    WireRequest {
        messages: request
            .turns
            .iter()
            .map(|turn| WireMessage {
                role: turn.role,
                content: vec![WireText {
                    text: turn.text.clone(),
                }],
            })
            .collect(),
        system: vec![WireText {
            text: request.system.clone(),
        }],
        inference_config: WireInferenceConfig {
            max_tokens: request.params.max_tokens,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
        },
    }
}

fn from_wire(body: &str) -> Result<InferenceResponse, InferenceError> {
    let wire: WireResponse = serde_json::from_str(body)
        .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

    let text = wire
        .output
        .message
        .content
        .into_iter()
        .next()
        .map(|c| c.text)
        .ok_or_else(|| InferenceError::MalformedResponse("response has no content".into()))?;

    let mut response = InferenceResponse::new(text, StopReason::from_wire(&wire.stop_reason));
    response.raw_stop_reason = Some(wire.stop_reason);
    response.input_tokens = wire.usage.input_tokens;
    response.output_tokens = wire.usage.output_tokens;
    Ok(response)
}

/// JSON-over-HTTP transport speaking the Converse wire shape.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[cfg(feature = "http")]
impl HttpTransport {
    /// Builds a transport from the inference configuration.
    pub fn from_config(config: &crate::config::InferenceConfig) -> Result<Self, InferenceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.read_timeout())
            .build()
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.resolved_endpoint().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, model_id: &str) -> String {
        format!("{}/model/{}/converse", self.endpoint, model_id)
    }
}

#[cfg(feature = "http")]
impl ModelTransport for HttpTransport {
    fn converse(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        let started = std::time::Instant::now();
        let mut builder = self.client.post(self.url(&request.model_id)).json(&to_wire(request));
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().map_err(|e| {
            if e.is_timeout() {
                InferenceError::Transport(format!("request timed out: {e}"))
            } else {
                InferenceError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(InferenceError::Service {
                status: status.as_u16(),
                message: body,
            });
        }

        let mut parsed = from_wire(&body)?;
        parsed.latency_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
        tracing::debug!(
            model = %request.model_id,
            stop_reason = ?parsed.raw_stop_reason,
            latency_ms = parsed.latency_ms,
            "Converse call returned"
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::{GenerationParams, Turn};

    #[test]
    fn test_request_wire_shape() {
        let request = InferenceRequest {
            model_id: "m".into(),
            system: "be terse".into(),
            turns: vec![Turn::user("convert this"), Turn::assistant("ok")],
            params: GenerationParams::default(),
        };

        let json = serde_json::to_value(to_wire(&request)).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][1]["content"][0]["text"], "ok");
        assert_eq!(json["system"][0]["text"], "be terse");
        assert_eq!(json["inferenceConfig"]["maxTokens"], 4096);
        assert!(json["inferenceConfig"].get("topP").is_some());
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "output": {"message": {"role": "assistant", "content": [{"text": "public class A {}"}]}},
            "stopReason": "max_tokens",
            "usage": {"inputTokens": 12, "outputTokens": 4096}
        }"#;

        let response = from_wire(body).unwrap();
        assert_eq!(response.text, "public class A {}");
        assert_eq!(response.stop_reason, StopReason::LengthTruncated);
        assert_eq!(response.raw_stop_reason.as_deref(), Some("max_tokens"));
        assert_eq!(response.output_tokens, Some(4096));
    }

    #[test]
    fn test_response_without_content_is_malformed() {
        let body = r#"{"output": {"message": {"role": "assistant", "content": []}}, "stopReason": "end_turn"}"#;
        assert!(matches!(from_wire(body), Err(InferenceError::MalformedResponse(_))));
        assert!(matches!(from_wire("not json"), Err(InferenceError::MalformedResponse(_))));
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_http_transport_url() {
        let config = crate::config::InferenceConfig::default().with_endpoint("http://localhost:9000/");
        let transport = HttpTransport::from_config(&config).unwrap();
        assert_eq!(transport.url("model-x"), "http://localhost:9000/model/model-x/converse");
    }
}
