//! Model transport that replays canned responses.

use crate::errors::InferenceError;
use crate::inference::{InferenceRequest, InferenceResponse, ModelTransport};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A transport that answers from a script and records every request.
///
/// Once the script runs out, requests fail with [`InferenceError::Transport`]
/// unless the transport was built with [`ScriptedTransport::repeating`].
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<InferenceResponse>>,
    repeat: Option<InferenceResponse>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedTransport {
    /// Creates a transport answering with `responses` in order.
    #[must_use]
    pub fn new(responses: Vec<InferenceResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates a transport answering every request with `response`.
    #[must_use]
    pub fn repeating(response: InferenceResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Self::default()
        }
    }

    /// Number of requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().clone()
    }
}

impl ModelTransport for ScriptedTransport {
    fn converse(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        self.requests.lock().push(request.clone());
        if let Some(response) = self.script.lock().pop_front() {
            return Ok(response);
        }
        self.repeat
            .clone()
            .ok_or_else(|| InferenceError::Transport("script exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{GenerationParams, StopReason, Turn};

    fn request() -> InferenceRequest {
        InferenceRequest {
            model_id: "m".into(),
            system: "s".into(),
            turns: vec![Turn::user("hi")],
            params: GenerationParams::default(),
        }
    }

    #[test]
    fn test_replays_then_fails() {
        let transport = ScriptedTransport::new(vec![InferenceResponse::new("one", StopReason::Complete)]);

        assert_eq!(transport.converse(&request()).unwrap().text, "one");
        assert!(matches!(
            transport.converse(&request()),
            Err(InferenceError::Transport(_))
        ));
        assert_eq!(transport.call_count(), 2);
    }

    #[test]
    fn test_repeating() {
        let transport = ScriptedTransport::repeating(InferenceResponse::new("again", StopReason::Complete));
        for _ in 0..3 {
            assert_eq!(transport.converse(&request()).unwrap().text, "again");
        }
        assert_eq!(transport.requests().len(), 3);
    }
}
