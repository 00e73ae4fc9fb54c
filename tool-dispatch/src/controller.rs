//! Instruction dispatch: model rounds interleaved with tool calls.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::timeout;
use tool_adapters::traits::{
    AdapterError, InferenceRequest, ModelAdapter, ModelReply, ToolCallProposal,
};
use tool_discovery::{DiscoveryClient, DiscoveryConfig, ToolInvoker};
use tool_primitives::{ErrorKind, InvocationRequest, InvocationResult, ToolCatalogEntry};
use tracing::{debug, info, warn};

use crate::error::{DispatchError, DispatchResult};
use crate::observer::{
    DispatchObserver, Exchange, ExchangeOutcome, ToolCallRecord, TracingDispatchObserver,
};
use crate::session::{SessionEvent, SessionLifecycle, SessionState};
use crate::transcript::{ConversationTurn, Transcript};

/// Default number of model rounds allowed per instruction.
pub const DEFAULT_MAX_ITERATIONS: NonZeroUsize = match NonZeroUsize::new(8) {
    Some(value) => value,
    None => unreachable!(),
};

/// Default timeout for one model round.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for one tool call.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Controller settings.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    max_iterations: NonZeroUsize,
    model_timeout: Duration,
    tool_timeout: Duration,
    temperature: Option<f32>,
    system_prompt: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            temperature: Some(0.0),
            system_prompt: None,
        }
    }
}

impl DispatchConfig {
    /// Sets the per-instruction model round limit.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: NonZeroUsize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the model round timeout.
    #[must_use]
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Sets the tool call timeout.
    #[must_use]
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Sets the sampling temperature; `None` leaves it to the adapter.
    #[must_use]
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets a system prompt sent with every round.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Returns the per-instruction model round limit.
    #[must_use]
    pub const fn max_iterations(&self) -> NonZeroUsize {
        self.max_iterations
    }

    /// Returns the model round timeout.
    #[must_use]
    pub const fn model_timeout(&self) -> Duration {
        self.model_timeout
    }

    /// Returns the tool call timeout.
    #[must_use]
    pub const fn tool_timeout(&self) -> Duration {
        self.tool_timeout
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] when a timeout is zero or the
    /// temperature is outside `0.0..=2.0`.
    pub fn validate(&self) -> DispatchResult<()> {
        if self.model_timeout.is_zero() {
            return Err(DispatchError::InvalidConfig(
                "model timeout must be greater than zero",
            ));
        }
        if self.tool_timeout.is_zero() {
            return Err(DispatchError::InvalidConfig(
                "tool timeout must be greater than zero",
            ));
        }
        if self
            .temperature
            .is_some_and(|temperature| !(0.0..=2.0).contains(&temperature))
        {
            return Err(DispatchError::InvalidConfig(
                "temperature must be between 0.0 and 2.0",
            ));
        }
        Ok(())
    }
}

/// Builds sessions that share one model adapter and one set of tools.
#[derive(Clone)]
pub struct DispatchController {
    adapter: Arc<dyn ModelAdapter>,
    tools: Arc<dyn ToolInvoker>,
    observer: Arc<dyn DispatchObserver>,
    config: DispatchConfig,
}

impl fmt::Debug for DispatchController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchController")
            .field("provider", &self.adapter.metadata().provider())
            .field("model", &self.adapter.metadata().model())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DispatchController {
    /// Creates a controller over an existing tool invoker.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] if the configuration is invalid.
    pub fn new(
        adapter: Arc<dyn ModelAdapter>,
        tools: Arc<dyn ToolInvoker>,
        config: DispatchConfig,
    ) -> DispatchResult<Self> {
        config.validate()?;
        Ok(Self {
            adapter,
            tools,
            observer: Arc::new(TracingDispatchObserver),
            config,
        })
    }

    /// Discovers the supplied servers and creates a controller over them.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] for an invalid configuration
    /// and [`DispatchError::Discovery`] if any server cannot be discovered.
    pub async fn connect<I, N, U>(
        adapter: Arc<dyn ModelAdapter>,
        servers: I,
        config: DispatchConfig,
    ) -> DispatchResult<Self>
    where
        I: IntoIterator<Item = (N, U)>,
        N: Into<String>,
        U: AsRef<str>,
    {
        config.validate()?;
        let client =
            DiscoveryClient::discover(servers, DiscoveryConfig::new(config.tool_timeout)).await?;
        info!(tools = client.len(), "tool discovery complete");
        Self::new(adapter, Arc::new(client), config)
    }

    /// Replaces the exchange observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the tools the model may choose from.
    #[must_use]
    pub fn catalog(&self) -> Vec<ToolCatalogEntry> {
        self.tools.catalog()
    }

    /// Starts a new session with an empty transcript.
    #[must_use]
    pub fn session(&self) -> DispatchSession {
        DispatchSession {
            controller: self.clone(),
            catalog: self.tools.catalog(),
            lifecycle: SessionLifecycle::new(),
            transcript: Transcript::new(),
            checkpoint: 0,
            next_call: 0,
        }
    }
}

/// One conversation between a caller and the controller.
///
/// Sessions are sequential: each [`submit`](Self::submit) completes before
/// the next may start. A submission whose future is dropped is abandoned,
/// and the next one discards its partial turns.
pub struct DispatchSession {
    controller: DispatchController,
    catalog: Vec<ToolCatalogEntry>,
    lifecycle: SessionLifecycle,
    transcript: Transcript,
    /// Transcript length before the instruction in flight.
    checkpoint: usize,
    next_call: u64,
}

impl fmt::Debug for DispatchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchSession")
            .field("state", &self.lifecycle.state())
            .field("turns", &self.transcript.len())
            .field("tools", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

impl DispatchSession {
    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    /// Returns the transcript so far.
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Ends the session and returns its transcript.
    pub fn end(&mut self) -> &Transcript {
        // End is accepted from every state.
        let _ = self.lifecycle.transition(SessionEvent::End);
        &self.transcript
    }

    /// Consumes the session, returning its transcript.
    #[must_use]
    pub fn into_transcript(self) -> Transcript {
        self.transcript
    }

    /// Processes one instruction to a final answer.
    ///
    /// Tool failures are fed back to the model rather than returned. The
    /// session returns to [`SessionState::Idle`] on success and on model
    /// failure, and ends when the round limit is exceeded. If an earlier
    /// submission was cancelled mid-round, its turns are dropped first.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SessionEnded`] after the session ended,
    /// [`DispatchError::ModelTimeout`] or [`DispatchError::Model`] when a model
    /// round fails, and [`DispatchError::MaxIterationsExceeded`] when no answer
    /// arrives within the round limit.
    pub async fn submit(&mut self, instruction: impl Into<String>) -> DispatchResult<String> {
        let instruction = instruction.into();
        if matches!(
            self.lifecycle.state(),
            SessionState::AwaitingModel | SessionState::AwaitingTool
        ) {
            self.abandon_interrupted()?;
        }
        self.lifecycle.transition(SessionEvent::Submit)?;
        self.checkpoint = self.transcript.len();
        self.transcript.push(ConversationTurn::User {
            content: instruction.clone(),
        });
        debug!(instruction = %instruction, "instruction submitted");

        let mut tool_calls = Vec::new();
        let mut rounds = 0;
        let outcome = self.run(&mut rounds, &mut tool_calls).await;

        let exchange = Exchange {
            instruction,
            tool_calls,
            model_rounds: rounds,
            outcome: match &outcome {
                Ok(answer) => ExchangeOutcome::Answered(answer.clone()),
                Err(err) => ExchangeOutcome::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                },
            },
        };
        self.controller.observer.on_exchange(&exchange);
        outcome
    }

    fn abandon_interrupted(&mut self) -> DispatchResult<()> {
        let dropped = self.transcript.len().saturating_sub(self.checkpoint);
        warn!(
            state = %self.lifecycle.state(),
            dropped_turns = dropped,
            "previous instruction was cancelled; discarding its turns"
        );
        self.lifecycle.transition(SessionEvent::Cancelled)?;
        self.transcript.rewind(self.checkpoint);
        Ok(())
    }

    async fn run(
        &mut self,
        rounds: &mut usize,
        tool_calls: &mut Vec<ToolCallRecord>,
    ) -> DispatchResult<String> {
        let limit = self.controller.config.max_iterations.get();
        loop {
            if *rounds == limit {
                self.lifecycle.transition(SessionEvent::LimitReached)?;
                warn!(limit, "model round limit exceeded; ending session");
                return Err(DispatchError::MaxIterationsExceeded { limit });
            }
            *rounds += 1;

            let reply = match self.query_model().await {
                Ok(reply) => reply,
                Err(err) => {
                    self.lifecycle.transition(SessionEvent::ModelFailed)?;
                    return Err(err);
                }
            };

            match reply {
                ModelReply::Answer(answer) => {
                    self.lifecycle.transition(SessionEvent::Answered)?;
                    self.transcript.push(ConversationTurn::Assistant {
                        content: answer.clone(),
                    });
                    return Ok(answer);
                }
                ModelReply::ToolCall(proposal) => {
                    self.lifecycle.transition(SessionEvent::ToolProposed)?;
                    let proposal = self.correlate(proposal);
                    self.transcript.push(ConversationTurn::ToolCall {
                        proposal: proposal.clone(),
                    });

                    let result = self.call_tool(&proposal).await;
                    self.transcript.push(ConversationTurn::Tool {
                        call_id: proposal.id().to_owned(),
                        tool: proposal.name().to_owned(),
                        result: result.clone(),
                    });
                    tool_calls.push(ToolCallRecord {
                        tool: proposal.name().to_owned(),
                        arguments: proposal.arguments().clone(),
                        result,
                    });
                    self.lifecycle.transition(SessionEvent::ToolReturned)?;
                }
            }
        }
    }

    async fn query_model(&self) -> DispatchResult<ModelReply> {
        let config = &self.controller.config;
        let adapter = &self.controller.adapter;
        let metadata = adapter.metadata();
        let model_error = |source: AdapterError| DispatchError::Model {
            provider: metadata.provider(),
            model: metadata.model().to_owned(),
            source,
        };

        let mut request = InferenceRequest::new(self.transcript.prompt_messages())
            .map_err(model_error)?
            .with_tools(self.catalog.clone());
        if let Some(temperature) = config.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(prompt) = &config.system_prompt {
            request = request.with_system_prompt(prompt.clone());
        }

        let timed_out = || DispatchError::ModelTimeout {
            model: metadata.model().to_owned(),
            after: config.model_timeout,
        };
        match timeout(config.model_timeout, adapter.infer(request)).await {
            Err(_) | Ok(Err(AdapterError::Timeout { .. })) => Err(timed_out()),
            Ok(Err(err)) => Err(model_error(err)),
            Ok(Ok(reply)) => Ok(reply),
        }
    }

    /// Gives the proposal a call id when the model did not supply one.
    fn correlate(&mut self, proposal: ToolCallProposal) -> ToolCallProposal {
        self.next_call += 1;
        if proposal.id().is_empty() {
            ToolCallProposal::new(
                format!("call_{}", self.next_call),
                proposal.name(),
                proposal.arguments().clone(),
            )
        } else {
            proposal
        }
    }

    async fn call_tool(&self, proposal: &ToolCallProposal) -> InvocationResult {
        let arguments = match proposal.arguments() {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return InvocationResult::error(
                    ErrorKind::InvalidArguments,
                    format!("arguments must be a JSON object, got {other}"),
                );
            }
        };

        let after = self.controller.config.tool_timeout;
        let request = InvocationRequest::new(proposal.name(), arguments);
        let result = match timeout(after, self.controller.tools.call(request)).await {
            Ok(result) => result,
            Err(_) => InvocationResult::error(
                ErrorKind::Timeout,
                format!("tool `{}` did not answer within {after:?}", proposal.name()),
            ),
        };

        match &result {
            InvocationResult::Ok { .. } => debug!(tool = proposal.name(), "tool call succeeded"),
            InvocationResult::Error { kind, message } => {
                warn!(tool = proposal.name(), %kind, error = %message, "tool call failed");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use serde_json::json;
    use tool_adapters::scripted::ScriptedAdapter;
    use tool_adapters::traits::MessageRole;
    use tool_discovery::LocalInvoker;
    use tool_primitives::{ParamType, ParameterSpec};
    use tool_registry::{ToolArguments, ToolDefinition, ToolFailure, ToolRegistry};

    use crate::observer::CollectingObserver;

    fn currency_registry(calls: Arc<AtomicUsize>) -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry
            .register(
                ToolDefinition::builder("get_currency_value")
                    .unwrap()
                    .description("Value of a currency in USD")
                    .parameter(ParameterSpec::required("currency_code", ParamType::String))
                    .unwrap()
                    .handler(move |args: ToolArguments| {
                        let calls = Arc::clone(&calls);
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            let value = match args.str("currency_code")?.to_uppercase().as_str() {
                                "USD" => 1.0,
                                "INR" => 0.012,
                                "EUR" => 1.09,
                                _ => 0.0,
                            };
                            Ok::<Value, ToolFailure>(json!(value))
                        }
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                ToolDefinition::builder("slow_tool")
                    .unwrap()
                    .handler(|_args: ToolArguments| async move {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok::<Value, ToolFailure>(Value::Null)
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn controller(adapter: Arc<ScriptedAdapter>, config: DispatchConfig) -> DispatchController {
        let tools = LocalInvoker::new(currency_registry(Arc::new(AtomicUsize::new(0))));
        DispatchController::new(adapter, Arc::new(tools), config).unwrap()
    }

    fn call(id: &str, name: &str, arguments: Value) -> ModelReply {
        ModelReply::ToolCall(ToolCallProposal::new(id, name, arguments))
    }

    #[tokio::test]
    async fn answers_usd_question_through_tool() {
        let adapter = Arc::new(ScriptedAdapter::new([
            call("call_1", "get_currency_value", json!({"currency_code": "USD"})),
            ModelReply::Answer("The value of USD is 1.0".into()),
        ]));
        let observer = CollectingObserver::new();
        let controller = controller(Arc::clone(&adapter), DispatchConfig::default())
            .with_observer(observer.clone());

        let mut session = controller.session();
        let answer = session
            .submit("What is the value of USD currency?")
            .await
            .unwrap();
        assert_eq!(answer, "The value of USD is 1.0");
        assert_eq!(session.state(), SessionState::Idle);

        let turns = session.transcript().turns();
        assert_eq!(turns.len(), 4);
        assert!(matches!(
            &turns[2],
            ConversationTurn::Tool { result, .. } if *result == InvocationResult::ok(1.0)
        ));

        let requests = adapter.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools().len(), 2);
        assert_eq!(requests[0].temperature(), Some(0.0));
        let fed_back = requests[1].messages().last().unwrap();
        assert_eq!(fed_back.role(), MessageRole::Tool);
        assert_eq!(fed_back.content(), "1.0");
        assert_eq!(fed_back.tool_call_id(), Some("call_1"));

        let exchanges = observer.drain();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].model_rounds, 2);
        assert_eq!(exchanges[0].tool_calls.len(), 1);
        assert_eq!(
            exchanges[0].outcome,
            ExchangeOutcome::Answered("The value of USD is 1.0".into())
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_fed_back() {
        let adapter = Arc::new(ScriptedAdapter::new([
            call("call_1", "get_stock_price", json!({"ticker": "ACME"})),
            ModelReply::Answer("I cannot look up stock prices.".into()),
        ]));
        let mut session = controller(Arc::clone(&adapter), DispatchConfig::default()).session();

        let answer = session.submit("What is ACME trading at?").await.unwrap();
        assert_eq!(answer, "I cannot look up stock prices.");

        let fed_back = adapter.requests()[1].messages().last().unwrap().clone();
        assert_eq!(fed_back.role(), MessageRole::Tool);
        assert!(fed_back.content().starts_with("error (unknown_tool)"));
    }

    #[tokio::test]
    async fn invalid_arguments_skip_the_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tools = LocalInvoker::new(currency_registry(Arc::clone(&calls)));
        let adapter = Arc::new(ScriptedAdapter::new([
            call("call_1", "get_currency_value", json!({})),
            call("call_2", "get_currency_value", json!(["USD"])),
            ModelReply::Answer("Which currency?".into()),
        ]));
        let controller =
            DispatchController::new(adapter.clone(), Arc::new(tools), DispatchConfig::default())
                .unwrap();

        let mut session = controller.session();
        session.submit("value?").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let kinds: Vec<_> = session
            .transcript()
            .turns()
            .iter()
            .filter_map(|turn| match turn {
                ConversationTurn::Tool { result, .. } => result.error_kind(),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![ErrorKind::InvalidArguments, ErrorKind::InvalidArguments]
        );
    }

    #[tokio::test]
    async fn unparsable_argument_text_is_fed_back_as_invalid_arguments() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tools = LocalInvoker::new(currency_registry(Arc::clone(&calls)));
        let adapter = Arc::new(ScriptedAdapter::new([
            call(
                "call_1",
                "get_currency_value",
                Value::String(r#"{"currency_code": "USD""#.into()),
            ),
            call("call_2", "get_currency_value", json!({"currency_code": "USD"})),
            ModelReply::Answer("The value of USD is 1.0".into()),
        ]));
        let controller =
            DispatchController::new(adapter.clone(), Arc::new(tools), DispatchConfig::default())
                .unwrap();

        let mut session = controller.session();
        let answer = session.submit("What is the value of USD?").await.unwrap();
        assert_eq!(answer, "The value of USD is 1.0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let first_reply = adapter.requests()[1].messages().last().unwrap().clone();
        assert_eq!(first_reply.tool_call_id(), Some("call_1"));
        assert!(first_reply.content().starts_with("error (invalid_arguments)"));
    }

    #[tokio::test]
    async fn cancelled_submit_leaves_session_usable() {
        let adapter = Arc::new(
            ScriptedAdapter::new([ModelReply::Answer("second answer".into())])
                .with_delay(Duration::from_millis(200)),
        );
        let mut session = controller(Arc::clone(&adapter), DispatchConfig::default()).session();

        let cancelled = timeout(Duration::from_millis(20), session.submit("first")).await;
        assert!(cancelled.is_err());
        assert_eq!(session.state(), SessionState::AwaitingModel);

        let answer = session.submit("second").await.unwrap();
        assert_eq!(answer, "second answer");
        assert_eq!(session.state(), SessionState::Idle);
        let turns = session.transcript().turns();
        assert_eq!(turns.len(), 2);
        assert!(matches!(&turns[0], ConversationTurn::User { content } if content == "second"));
    }

    #[tokio::test]
    async fn cancelled_tool_call_is_discarded_from_transcript() {
        let adapter = Arc::new(ScriptedAdapter::new([
            call("call_1", "slow_tool", json!({})),
            ModelReply::Answer("done".into()),
        ]));
        let mut session = controller(adapter, DispatchConfig::default()).session();
        let cancelled = timeout(Duration::from_millis(50), session.submit("run it")).await;
        assert!(cancelled.is_err());
        assert_eq!(session.state(), SessionState::AwaitingTool);
        assert_eq!(session.transcript().len(), 2);

        let answer = session.submit("never mind").await.unwrap();
        assert_eq!(answer, "done");
        let turns = session.transcript().turns();
        assert_eq!(turns.len(), 2);
        assert!(turns.iter().all(|turn| !matches!(turn, ConversationTurn::ToolCall { .. })));
    }

    #[tokio::test]
    async fn tool_timeout_is_recorded_without_hanging() {
        let adapter = Arc::new(ScriptedAdapter::new([
            call("call_1", "slow_tool", json!({})),
            ModelReply::Answer("The tool was too slow.".into()),
        ]));
        let config = DispatchConfig::default().with_tool_timeout(Duration::from_millis(50));
        let mut session = controller(adapter, config).session();

        let started = Instant::now();
        let answer = session.submit("run the slow tool").await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(answer, "The tool was too slow.");
        assert!(session.transcript().turns().iter().any(|turn| matches!(
            turn,
            ConversationTurn::Tool { result, .. } if result.error_kind() == Some(ErrorKind::Timeout)
        )));
    }

    #[tokio::test]
    async fn round_limit_ends_session() {
        let adapter = Arc::new(ScriptedAdapter::new([]).with_fallback(call(
            "",
            "get_currency_value",
            json!({"currency_code": "EUR"}),
        )));
        let config =
            DispatchConfig::default().with_max_iterations(NonZeroUsize::new(3).unwrap());
        let observer = CollectingObserver::new();
        let mut session = controller(Arc::clone(&adapter), config)
            .with_observer(observer.clone())
            .session();

        let err = session.submit("loop forever").await.expect_err("limit");
        assert!(matches!(err, DispatchError::MaxIterationsExceeded { limit: 3 }));
        assert_eq!(err.kind(), Some(ErrorKind::MaxIterationsExceeded));
        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(adapter.requests().len(), 3);

        // Generated ids are unique per call.
        let ids: Vec<_> = session
            .transcript()
            .turns()
            .iter()
            .filter_map(|turn| match turn {
                ConversationTurn::Tool { call_id, .. } => Some(call_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["call_1", "call_2", "call_3"]);

        let err = session.submit("again").await.expect_err("ended");
        assert!(matches!(err, DispatchError::SessionEnded));

        let exchanges = observer.drain();
        assert_eq!(exchanges.len(), 1);
        assert!(matches!(
            exchanges[0].outcome,
            ExchangeOutcome::Failed {
                kind: Some(ErrorKind::MaxIterationsExceeded),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn model_timeout_returns_to_idle() {
        let adapter = Arc::new(
            ScriptedAdapter::new([ModelReply::Answer("late".into())])
                .with_delay(Duration::from_millis(500)),
        );
        let config = DispatchConfig::default().with_model_timeout(Duration::from_millis(20));
        let mut session = controller(adapter, config).session();

        let err = session.submit("hello").await.expect_err("timeout");
        assert!(matches!(err, DispatchError::ModelTimeout { .. }));
        assert_eq!(err.kind(), Some(ErrorKind::Timeout));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn model_failure_allows_retry() {
        let adapter = Arc::new(
            ScriptedAdapter::new([])
                .then_fail(AdapterError::transport("connection reset"))
                .then_reply(ModelReply::Answer("hi there".into())),
        );
        let mut session = controller(adapter, DispatchConfig::default()).session();

        let err = session.submit("hello").await.expect_err("model failure");
        assert!(matches!(err, DispatchError::Model { .. }));
        assert_eq!(session.state(), SessionState::Idle);

        assert_eq!(session.submit("hello again").await.unwrap(), "hi there");
        let transcript = session.end().clone();
        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(transcript.last_answer(), Some("hi there"));
        assert_eq!(transcript.turns()[0].content(), "hello");
    }

    #[test]
    fn config_validation() {
        assert!(DispatchConfig::default().validate().is_ok());
        assert_eq!(DispatchConfig::default().max_iterations().get(), 8);
        assert!(
            DispatchConfig::default()
                .with_model_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            DispatchConfig::default()
                .with_tool_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            DispatchConfig::default()
                .with_temperature(Some(3.5))
                .validate()
                .is_err()
        );
    }
}
