//! Adapter that replays a fixed script of replies.
//!
//! Used by tests and offline runs of the controller. Every request it
//! receives is recorded so callers can assert on what the model was shown.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, InferenceRequest, ModelAdapter, ModelReply,
};

/// Model adapter returning pre-recorded replies in order.
#[derive(Debug)]
pub struct ScriptedAdapter {
    metadata: AdapterMetadata,
    script: Mutex<VecDeque<AdapterResult<ModelReply>>>,
    fallback: Option<ModelReply>,
    delay: Option<Duration>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedAdapter {
    /// Creates an adapter that answers with `replies`, one per round.
    #[must_use]
    pub fn new(replies: impl IntoIterator<Item = ModelReply>) -> Self {
        Self {
            metadata: AdapterMetadata::new("scripted", "scripted"),
            script: Mutex::new(replies.into_iter().map(Ok).collect()),
            fallback: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues an error after the replies queued so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn then_fail(self, error: AdapterError) -> Self {
        self.script
            .lock()
            .expect("scripted adapter poisoned")
            .push_back(Err(error));
        self
    }

    /// Queues a reply after the outcomes queued so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn then_reply(self, reply: ModelReply) -> Self {
        self.script
            .lock()
            .expect("scripted adapter poisoned")
            .push_back(Ok(reply));
        self
    }

    /// Reply repeated once the script is exhausted.
    #[must_use]
    pub fn with_fallback(mut self, reply: ModelReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Sleeps before every reply.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns every request received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests
            .lock()
            .expect("scripted adapter poisoned")
            .clone()
    }
}

#[async_trait]
impl ModelAdapter for ScriptedAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn infer(&self, request: InferenceRequest) -> AdapterResult<ModelReply> {
        self.requests
            .lock()
            .expect("scripted adapter poisoned")
            .push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .script
            .lock()
            .expect("scripted adapter poisoned")
            .pop_front();
        match next {
            Some(outcome) => outcome,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| AdapterError::response("scripted adapter has no replies left")),
        }
    }
}
