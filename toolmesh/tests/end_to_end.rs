use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use toolmesh::adapters::scripted::ScriptedAdapter;
use toolmesh::adapters::traits::{MessageRole, ModelReply, ToolCallProposal};
use toolmesh::discovery::DiscoveryError;
use toolmesh::dispatch::{
    CollectingObserver, ConversationTurn, DispatchConfig, DispatchController, DispatchError,
    SessionState,
};
use toolmesh::primitives::{ErrorKind, InvocationResult, ParamType, ParameterSpec};
use toolmesh::registry::{ToolArguments, ToolDefinition, ToolFailure, ToolRegistry};
use toolmesh::server::{ServerHandle, ToolServer};

fn localhost() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn currency_tool() -> ToolDefinition {
    ToolDefinition::builder("get_currency_value")
        .unwrap()
        .description("Value of a currency in USD")
        .parameter(ParameterSpec::required("currency_code", ParamType::String))
        .unwrap()
        .handler(|args: ToolArguments| async move {
            let value = match args.str("currency_code")?.to_uppercase().as_str() {
                "USD" => 1.0,
                "INR" => 0.012,
                "EUR" => 1.09,
                _ => 0.0,
            };
            Ok::<Value, ToolFailure>(json!(value))
        })
        .build()
        .unwrap()
}

fn flaky_weather_tool() -> ToolDefinition {
    ToolDefinition::builder("get_weather")
        .unwrap()
        .description("Current weather for a location")
        .parameter(ParameterSpec::required("location", ParamType::String))
        .unwrap()
        .handler(|args: ToolArguments| async move {
            let location = args.str("location")?;
            if location == "Atlantis" {
                return Err(ToolFailure::new("location not found"));
            }
            Ok::<Value, ToolFailure>(json!(format!("{location}: +31°C")))
        })
        .build()
        .unwrap()
}

fn send_email_tool() -> ToolDefinition {
    ToolDefinition::builder("send_email")
        .unwrap()
        .description("Send an email")
        .parameter(ParameterSpec::required("to", ParamType::String))
        .unwrap()
        .parameter(ParameterSpec::required("subject", ParamType::String))
        .unwrap()
        .parameter(ParameterSpec::required("body", ParamType::String))
        .unwrap()
        .handler(|args: ToolArguments| async move {
            Ok::<Value, ToolFailure>(json!(format!("Email sent to {}", args.str("to")?)))
        })
        .build()
        .unwrap()
}

fn serve(tools: Vec<ToolDefinition>) -> ServerHandle {
    let registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool).unwrap();
    }
    ToolServer::new(Arc::new(registry))
        .with_base_path("/mcp")
        .bind(localhost())
        .unwrap()
        .spawn()
}

fn mcp_url(handle: &ServerHandle) -> String {
    format!("{}/mcp", handle.url())
}

fn call(id: &str, name: &str, arguments: Value) -> ModelReply {
    ModelReply::ToolCall(ToolCallProposal::new(id, name, arguments))
}

struct Deployment {
    weather: ServerHandle,
    email: ServerHandle,
}

impl Deployment {
    fn start() -> Self {
        Self {
            weather: serve(vec![flaky_weather_tool(), currency_tool()]),
            email: serve(vec![send_email_tool()]),
        }
    }

    fn servers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("weather", mcp_url(&self.weather)),
            ("email", mcp_url(&self.email)),
        ]
    }

    async fn stop(self) {
        self.weather.shutdown().await.unwrap();
        self.email.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn usd_question_is_answered_through_remote_tool() {
    let deployment = Deployment::start();
    let adapter = Arc::new(ScriptedAdapter::new([
        call(
            "call_usd",
            "get_currency_value",
            json!({"currency_code": "USD"}),
        ),
        ModelReply::Answer("The value of USD is 1.0.".into()),
    ]));
    let observer = CollectingObserver::new();
    let controller = DispatchController::connect(
        adapter.clone(),
        deployment.servers(),
        DispatchConfig::default(),
    )
    .await
    .unwrap()
    .with_observer(observer.clone());

    let names: Vec<String> = controller
        .catalog()
        .iter()
        .map(|entry| entry.name().to_string())
        .collect();
    assert_eq!(names, ["send_email", "get_weather", "get_currency_value"]);

    let mut session = controller.session();
    let answer = session.submit("What is the value of USD?").await.unwrap();
    assert_eq!(answer, "The value of USD is 1.0.");

    let requests = adapter.requests();
    assert_eq!(requests[0].tools().len(), 3);
    let fed_back = requests[1].messages().last().unwrap();
    assert_eq!(fed_back.role(), MessageRole::Tool);
    assert_eq!(fed_back.content(), "1.0");

    let exchanges = observer.drain();
    assert_eq!(exchanges.len(), 1);
    assert_eq!(
        exchanges[0].tool_calls[0].result,
        InvocationResult::ok(1.0)
    );

    session.end();
    assert_eq!(session.state(), SessionState::Ended);
    deployment.stop().await;
}

#[tokio::test]
async fn handler_failure_is_fed_back_and_server_keeps_serving() {
    let deployment = Deployment::start();
    let adapter = Arc::new(
        ScriptedAdapter::new([
            call("c1", "get_weather", json!({"location": "Atlantis"})),
            ModelReply::Answer("I could not find Atlantis.".into()),
        ])
        .then_reply(call("c2", "get_weather", json!({"location": "Hyderabad"})))
        .then_reply(ModelReply::Answer("It is 31°C in Hyderabad.".into())),
    );
    let controller =
        DispatchController::connect(adapter, deployment.servers(), DispatchConfig::default())
            .await
            .unwrap();

    let mut session = controller.session();
    session.submit("Weather in Atlantis?").await.unwrap();
    let answer = session
        .submit("what is the current weather in Hyderabad?")
        .await
        .unwrap();
    assert_eq!(answer, "It is 31°C in Hyderabad.");

    let results: Vec<&InvocationResult> = session
        .transcript()
        .turns()
        .iter()
        .filter_map(|turn| match turn {
            ConversationTurn::Tool { result, .. } => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].error_kind(), Some(ErrorKind::HandlerError));
    assert_eq!(results[1], &InvocationResult::ok("Hyderabad: +31°C"));
    deployment.stop().await;
}

#[tokio::test]
async fn unknown_and_malformed_calls_are_fed_back() {
    let deployment = Deployment::start();
    let adapter = Arc::new(ScriptedAdapter::new([
        call("c1", "get_stock_price", json!({"ticker": "ACME"})),
        call("c2", "send_email", json!({"to": "ops@example.com"})),
        ModelReply::Answer("done".into()),
    ]));
    let controller =
        DispatchController::connect(adapter, deployment.servers(), DispatchConfig::default())
            .await
            .unwrap();

    let mut session = controller.session();
    session.submit("price then mail").await.unwrap();

    let kinds: Vec<Option<ErrorKind>> = session
        .transcript()
        .turns()
        .iter()
        .filter_map(|turn| match turn {
            ConversationTurn::Tool { result, .. } => Some(result.error_kind()),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        [Some(ErrorKind::UnknownTool), Some(ErrorKind::InvalidArguments)]
    );
    deployment.stop().await;
}

#[tokio::test]
async fn overlapping_tool_names_fail_discovery() {
    let first = serve(vec![currency_tool()]);
    let second = serve(vec![currency_tool()]);
    let adapter = Arc::new(ScriptedAdapter::new(Vec::new()));

    let err = DispatchController::connect(
        adapter,
        [("alpha", mcp_url(&first)), ("beta", mcp_url(&second))],
        DispatchConfig::default(),
    )
    .await
    .expect_err("collision");
    assert!(matches!(
        err,
        DispatchError::Discovery(DiscoveryError::Collision { ref tool, .. })
            if tool == "get_currency_value"
    ));
    assert_eq!(err.kind(), Some(ErrorKind::DiscoveryError));

    first.shutdown().await.unwrap();
    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn stopped_server_turns_into_transport_error() {
    let deployment = Deployment::start();
    let adapter = Arc::new(ScriptedAdapter::new([
        call("c1", "send_email", json!({"to": "a@b.c", "subject": "s", "body": "b"})),
        ModelReply::Answer("mail could not be sent".into()),
    ]));
    let controller = DispatchController::connect(
        adapter,
        deployment.servers(),
        DispatchConfig::default().with_tool_timeout(Duration::from_secs(2)),
    )
    .await
    .unwrap();

    let Deployment { weather, email } = deployment;
    email.shutdown().await.unwrap();

    let mut session = controller.session();
    session.submit("mail a@b.c").await.unwrap();
    let failure = session
        .transcript()
        .turns()
        .iter()
        .find_map(|turn| match turn {
            ConversationTurn::Tool { result, .. } => result.error_kind(),
            _ => None,
        });
    assert_eq!(failure, Some(ErrorKind::Transport));
    weather.shutdown().await.unwrap();
}
