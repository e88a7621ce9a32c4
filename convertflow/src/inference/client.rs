//! Inference client with continuation handling.
//!
//! The model service truncates output at a token budget. [`InferenceClient::generate`]
//! keeps asking the model to continue until it finishes, priming each
//! continuation with a transient assistant turn built from the tail of the
//! previous fragment, then stitches the fragments into one document.
//!
//! Every transport call is blocking and runs on tokio's blocking pool, gated
//! by a semaphore sized independently of any batch concurrency limit.

use super::stitch::{continuation_prefill, DropLastLine, StitchPolicy};
use super::transport::ModelTransport;
use super::types::{GenerationParams, Generation, InferenceRequest, InferenceResponse, Turn};
use crate::config::InferenceConfig;
use crate::errors::InferenceError;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Client shared read-only by every stage and every concurrent run.
#[derive(Debug)]
pub struct InferenceClient {
    transport: Arc<dyn ModelTransport>,
    model_id: String,
    params: GenerationParams,
    continue_prompt: String,
    max_continuations: usize,
    stitcher: Arc<dyn StitchPolicy>,
    workers: Arc<Semaphore>,
}

impl InferenceClient {
    /// Creates a client over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn ModelTransport>, config: &InferenceConfig) -> Self {
        info!(model = %config.model_id, workers = config.worker_pool_size, "Initialized inference client");
        Self {
            transport,
            model_id: config.model_id.clone(),
            params: GenerationParams {
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                top_p: config.top_p,
            },
            continue_prompt: config.continue_prompt.clone(),
            max_continuations: config.max_continuations,
            stitcher: Arc::new(DropLastLine),
            workers: Arc::new(Semaphore::new(config.worker_pool_size.max(1))),
        }
    }

    /// Creates a client backed by the HTTP transport.
    ///
    /// The blocking HTTP client must not be created or dropped on an async
    /// worker thread; call this before entering the runtime or from
    /// `spawn_blocking`.
    #[cfg(feature = "http")]
    pub fn from_config(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let transport = super::transport::HttpTransport::from_config(config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Replaces the stitching policy.
    #[must_use]
    pub fn with_stitcher(mut self, stitcher: Arc<dyn StitchPolicy>) -> Self {
        self.stitcher = stitcher;
        self
    }

    /// Returns the model identifier.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Sends one request with the given history.
    ///
    /// The blocking transport call runs on the blocking pool once a worker
    /// permit is available.
    pub async fn generate(
        &self,
        system: &str,
        turns: &[Turn],
    ) -> Result<InferenceResponse, InferenceError> {
        let request = InferenceRequest {
            model_id: self.model_id.clone(),
            system: system.to_string(),
            turns: turns.to_vec(),
            params: self.params,
        };

        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|e| InferenceError::Worker(e.to_string()))?;

        let transport = Arc::clone(&self.transport);
        tokio::task::spawn_blocking(move || transport.converse(&request))
            .await
            .map_err(|e| InferenceError::Worker(e.to_string()))?
    }

    /// Single round trip; returns the text even when it was truncated.
    pub async fn simple_generate(&self, prompt: &str, system: &str) -> Result<String, InferenceError> {
        let response = self.generate(system, &[Turn::user(prompt)]).await?;
        if response.stop_reason.is_truncated() {
            warn!(
                model = %self.model_id,
                "Response was truncated; use continuation generation for longer output"
            );
        }
        Ok(response.text)
    }

    /// Runs the continuation protocol and returns the raw fragments.
    pub async fn generate_fragments(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<Generation, InferenceError> {
        let mut history = vec![Turn::user(prompt)];
        let mut response = self.generate(system, &history).await?;
        let mut fragments = vec![response.text.clone()];

        while response.stop_reason.is_truncated() {
            if fragments.len() > self.max_continuations {
                warn!(
                    round_trips = fragments.len(),
                    max_continuations = self.max_continuations,
                    "Continuation limit reached; stitching partial output"
                );
                break;
            }
            info!(round_trip = fragments.len(), "Response truncated, continuing generation");

            let prefill = continuation_prefill(&response.text);
            history.push(Turn::assistant(response.text));
            history.push(Turn::user(self.continue_prompt.clone()));

            let has_prefill = !prefill.is_empty();
            if has_prefill {
                history.push(Turn::assistant(prefill));
            }

            let result = self.generate(system, &history).await;
            // The prefill only biases this one request.
            if has_prefill {
                history.pop();
            }

            response = result?;
            debug!(
                round_trip = fragments.len(),
                chars = response.text.len(),
                stop_reason = %response.stop_reason,
                "Received continuation fragment"
            );
            fragments.push(response.text.clone());
        }

        Ok(Generation {
            fragments,
            final_stop: response.stop_reason,
        })
    }

    /// Runs the continuation protocol and stitches the fragments into one document.
    pub async fn generate_stitched(&self, prompt: &str, system: &str) -> Result<String, InferenceError> {
        let generation = self.generate_fragments(prompt, system).await?;
        if generation.round_trips() > 1 {
            info!(round_trips = generation.round_trips(), "Stitching continued output");
        }
        Ok(self.stitcher.stitch(&generation.fragments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::stitch::Concatenate;
    use crate::inference::types::{Role, StopReason};
    use crate::testing::ScriptedTransport;
    use pretty_assertions::assert_eq;

    fn client(transport: &Arc<ScriptedTransport>) -> InferenceClient {
        let config = InferenceConfig::default().with_model_id("test-model");
        InferenceClient::new(Arc::clone(transport) as Arc<dyn ModelTransport>, &config)
    }

    #[tokio::test]
    async fn test_simple_generate_returns_first_fragment() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            InferenceResponse::new("partial\noutput", StopReason::LengthTruncated),
            InferenceResponse::new("never requested", StopReason::Complete),
        ]));

        let text = client(&transport).simple_generate("prompt", "system").await.unwrap();

        assert_eq!(text, "partial\noutput");
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_single_round_trip_is_verbatim() {
        let transport = Arc::new(ScriptedTransport::new(vec![InferenceResponse::new(
            "class A {}\n",
            StopReason::Complete,
        )]));

        let text = client(&transport).generate_stitched("prompt", "system").await.unwrap();
        assert_eq!(text, "class A {}\n");
    }

    #[tokio::test]
    async fn test_continuation_stitches_fragments() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            InferenceResponse::new("A\nB\nC", StopReason::LengthTruncated),
            InferenceResponse::new("X\nY", StopReason::LengthTruncated),
            InferenceResponse::new("Z", StopReason::Complete),
        ]));

        let text = client(&transport).generate_stitched("prompt", "system").await.unwrap();

        assert_eq!(text, "A\nBXZ");
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_prefill_turn_never_persists() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            InferenceResponse::new("l1\nl2\nl3\nl4", StopReason::LengthTruncated),
            InferenceResponse::new("m1\nm2\nm3", StopReason::LengthTruncated),
            InferenceResponse::new("done", StopReason::Complete),
        ]));

        client(&transport).generate_fragments("convert", "system").await.unwrap();
        let requests = transport.requests();
        assert_eq!(requests.len(), 3);

        // Round trip 2: user, assistant(fragment 0), continue, prefill
        let second = &requests[1].turns;
        assert_eq!(second.len(), 4);
        assert_eq!(second[1], Turn::assistant("l1\nl2\nl3\nl4"));
        assert_eq!(second[2].role, Role::User);
        assert_eq!(second[3], Turn::assistant("l2\nl3"));

        // Round trip 3 carries no trace of the earlier prefill
        let third = &requests[2].turns;
        assert!(!third.contains(&Turn::assistant("l2\nl3")));
        assert_eq!(third[1], Turn::assistant("l1\nl2\nl3\nl4"));
        assert_eq!(third[3], Turn::assistant("m1\nm2\nm3"));
        assert_eq!(third.last(), Some(&Turn::assistant("m2")));
        assert_eq!(third.len(), 6);
    }

    #[tokio::test]
    async fn test_empty_prefill_is_not_sent() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            InferenceResponse::new("one line", StopReason::LengthTruncated),
            InferenceResponse::new(" more", StopReason::Complete),
        ]));

        client(&transport).generate_fragments("p", "s").await.unwrap();
        let second = &transport.requests()[1].turns;
        assert_eq!(second.len(), 3);
        assert_eq!(second[2].role, Role::User);
    }

    #[tokio::test]
    async fn test_continuation_cap() {
        let transport = Arc::new(ScriptedTransport::repeating(InferenceResponse::new(
            "a\nb\nc",
            StopReason::LengthTruncated,
        )));
        let config = InferenceConfig::default().with_max_continuations(2);
        let client = InferenceClient::new(Arc::clone(&transport) as Arc<dyn ModelTransport>, &config);

        let generation = client.generate_fragments("p", "s").await.unwrap();
        assert_eq!(generation.round_trips(), 3);
        assert_eq!(generation.final_stop, StopReason::LengthTruncated);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let transport = Arc::new(ScriptedTransport::new(vec![InferenceResponse::new(
            "a\nb\nc",
            StopReason::LengthTruncated,
        )]));

        // Script runs out on the continuation request.
        let err = client(&transport).generate_stitched("p", "s").await.unwrap_err();
        assert!(matches!(err, InferenceError::Transport(_)));
    }

    #[tokio::test]
    async fn test_custom_stitch_policy() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            InferenceResponse::new("A\nB", StopReason::LengthTruncated),
            InferenceResponse::new("C", StopReason::Complete),
        ]));
        let client = client(&transport).with_stitcher(Arc::new(Concatenate));

        let text = client.generate_stitched("p", "s").await.unwrap();
        assert_eq!(text, "A\nBC");
    }

    #[tokio::test]
    async fn test_request_carries_generation_params() {
        let transport = Arc::new(ScriptedTransport::new(vec![InferenceResponse::new(
            "ok",
            StopReason::Complete,
        )]));
        client(&transport).simple_generate("p", "sys").await.unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.model_id, "test-model");
        assert_eq!(request.system, "sys");
        assert_eq!(request.params.max_tokens, 4096);
    }

    /// Transport that sleeps on every call and records peak concurrency.
    #[derive(Debug, Default)]
    struct SlowTransport {
        active: std::sync::atomic::AtomicUsize,
        peak: std::sync::atomic::AtomicUsize,
    }

    impl ModelTransport for SlowTransport {
        fn converse(&self, _request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
            use std::sync::atomic::Ordering;

            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(40));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(InferenceResponse::new("ok", StopReason::Complete))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_pool_bounds_blocking_calls() {
        let transport = Arc::new(SlowTransport::default());
        let config = InferenceConfig::default().with_worker_pool_size(2);
        let client = Arc::new(InferenceClient::new(
            Arc::clone(&transport) as Arc<dyn ModelTransport>,
            &config,
        ));

        let calls = (0..6).map(|i| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.simple_generate(&format!("p{i}"), "s").await })
        });
        for result in futures::future::join_all(calls).await {
            assert_eq!(result.unwrap().unwrap(), "ok");
        }

        let peak = transport.peak.load(std::sync::atomic::Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak blocking calls = {peak}");
    }
}
