use async_trait::async_trait;
use parking_lot::Mutex;
use runtime::providers::Provider;
use runtime::{
    Action, ChatOptions, Engine, EngineConfig, EngineResponse, Error, FnTool, Message,
    PlaceholderMode, PromptTable, PromptTemplate, ProviderError, ProviderRegistry, ProviderReply,
    RetryConfig, Role, RunOptions, ToolBody, ToolError, ToolRegistry, ToolSchema,
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Replays queued replies, then repeats `fallback`; records every request.
struct Scripted {
    queue: Mutex<VecDeque<ProviderReply>>,
    fallback: ProviderReply,
    delay: Option<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl Scripted {
    fn new(replies: Vec<ProviderReply>) -> Arc<Self> {
        Self::build(replies, EngineResponse::text("done").into(), None)
    }

    fn repeating(reply: ProviderReply) -> Arc<Self> {
        Self::build(Vec::new(), reply, None)
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Self::build(Vec::new(), EngineResponse::text("late").into(), Some(delay))
    }

    fn build(replies: Vec<ProviderReply>, fallback: ProviderReply, delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(replies.into()),
            fallback,
            delay,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn request(&self, index: usize) -> Vec<Message> {
        self.seen.lock()[index].clone()
    }
}

#[async_trait]
impl Provider for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(
        &self,
        messages: &[Message],
        _options: &ChatOptions,
    ) -> Result<ProviderReply, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.queue.lock().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

fn engine_with(provider: Arc<Scripted>, tools: ToolRegistry, prompts: PromptTable) -> Engine {
    let providers = ProviderRegistry::new("mock").with_retry(RetryConfig::none());
    providers.register("mock", provider);
    Engine::new(Arc::new(providers), Arc::new(tools), prompts)
}

fn engine(provider: Arc<Scripted>) -> Engine {
    engine_with(provider, ToolRegistry::default(), PromptTable::new())
}

fn envelope(message: &Message) -> Value {
    serde_json::from_str(&message.content).unwrap()
}

fn add_tool(registry: &ToolRegistry) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    registry
        .register(
            "add",
            ToolSchema::new(
                "add",
                "Adds two numbers",
                json!({
                    "type": "object",
                    "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                    "required": ["a", "b"]
                }),
            ),
            ToolBody::native(FnTool::new(move |params: Value| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let a = params["a"].as_f64().unwrap_or_default();
                    let b = params["b"].as_f64().unwrap_or_default();
                    Ok(json!({"sum": a + b}))
                }
            })),
        )
        .unwrap();
    calls
}

fn action_reply(action: Action) -> ProviderReply {
    EngineResponse::new("", vec![action]).into()
}

#[tokio::test]
async fn placeholders_render_from_request() {
    let provider = Scripted::new(Vec::new());
    let engine = engine(provider.clone());
    let template = PromptTemplate::new("Hi ${name}", "Say hello to {name}");

    engine.execute(&template, json!({"name": "Ann"})).await.unwrap();
    engine.execute(&template, json!({})).await.unwrap();

    let first = provider.request(0);
    assert_eq!(first[0].role, Role::System);
    assert_eq!(envelope(&first[0])["system"], "Hi Ann");
    assert_eq!(envelope(&first[1])["user"], "Say hello to Ann");

    let second = provider.request(1);
    assert_eq!(envelope(&second[0])["system"], "Hi ");
}

#[tokio::test]
async fn strict_placeholders_fail_before_any_call() {
    let provider = Scripted::new(Vec::new());
    let engine = engine(provider.clone()).with_config(EngineConfig {
        placeholders: PlaceholderMode::Strict,
        ..EngineConfig::default()
    });

    let err = engine
        .execute(&PromptTemplate::new("Hi ${name}", "go"), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingPlaceholder { ref placeholder, .. } if placeholder == "name"));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn state_overrides_request_fields() {
    let provider = Scripted::new(Vec::new());
    let engine = engine(provider.clone());
    let mut state = serde_json::Map::new();
    state.insert("name".into(), json!("Bo"));

    engine
        .execute_with(
            "greet",
            &PromptTemplate::new("Hi ${name}", "go"),
            json!({"name": "Ann"}),
            RunOptions::new().with_state(state),
        )
        .await
        .unwrap();

    let request = provider.request(0);
    assert_eq!(envelope(&request[0])["system"], "Hi Bo");
    assert_eq!(envelope(&request[1])["state"], json!({"name": "Bo"}));
}

#[tokio::test]
async fn identical_requests_hit_the_cache() {
    let provider = Scripted::repeating(EngineResponse::text("cached").into());
    let engine = engine(provider.clone());
    let template = PromptTemplate::new("Summarize {text}", "now");

    let first = engine.execute(&template, json!({"text": "abc"})).await.unwrap();
    let second = engine.execute(&template, json!({"text": "abc"})).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(provider.calls(), 1);
    assert_eq!(engine.cache().len(), 1);
}

#[tokio::test]
async fn disabled_cache_calls_every_time() {
    let provider = Scripted::repeating(EngineResponse::text("fresh").into());
    let engine = engine(provider.clone()).with_config(EngineConfig {
        cache: false,
        ..EngineConfig::default()
    });
    let template = PromptTemplate::new("s", "u");

    engine.execute(&template, json!({})).await.unwrap();
    engine.execute(&template, json!({})).await.unwrap();
    assert_eq!(provider.calls(), 2);
    assert!(engine.cache().is_empty());
}

#[tokio::test]
async fn always_echoing_model_hits_loop_limit() {
    let provider = Scripted::repeating(action_reply(
        Action::new("add", json!({"a": 1, "b": 2})).echoed(),
    ));
    let tools = ToolRegistry::default();
    add_tool(&tools);
    let engine = engine_with(provider.clone(), tools, PromptTable::new());

    let err = engine
        .execute(&PromptTemplate::new("loop", "forever"), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LoopLimitExceeded { limit: 25, .. }));
    assert_eq!(provider.calls(), 25);
}

#[tokio::test]
async fn echoed_tool_result_is_fed_back() {
    let provider = Scripted::new(vec![
        action_reply(Action::new("add", json!({"a": 2, "b": 3})).echoed()),
        EngineResponse::text("the sum is 5").into(),
    ]);
    let tools = ToolRegistry::default();
    let tool_calls = add_tool(&tools);
    let engine = engine_with(provider.clone(), tools, PromptTable::new());

    let response = engine
        .execute(&PromptTemplate::new("math", "add"), json!({}))
        .await
        .unwrap();
    assert_eq!(response, EngineResponse::text("the sum is 5"));
    assert_eq!(tool_calls.load(Ordering::SeqCst), 1);

    let second = provider.request(1);
    assert_eq!(second.len(), 4);
    assert_eq!(second[2].role, Role::Assistant);
    assert_eq!(second[3].role, Role::User);
    assert_eq!(envelope(&second[3]), json!({"sum": 5.0}));

    let system = envelope(&second[0]);
    assert_eq!(system["tools"][0]["name"], "add");
}

#[tokio::test]
async fn non_echo_action_runs_once_and_returns() {
    let reply = action_reply(Action::new("add", json!({"a": 1, "b": 1})));
    let provider = Scripted::new(vec![reply]);
    let tools = ToolRegistry::default();
    let tool_calls = add_tool(&tools);
    let engine = engine_with(provider.clone(), tools, PromptTable::new());

    let response = engine
        .execute(&PromptTemplate::new("s", "u"), json!({}))
        .await
        .unwrap();
    assert_eq!(response.actions().len(), 1);
    assert_eq!(tool_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn raw_almost_json_is_repaired() {
    let provider = Scripted::new(vec![ProviderReply::Raw(r#"{content: "hi", }"#.into())]);
    let engine = engine(provider);

    let response = engine
        .execute(&PromptTemplate::new("s", "u"), json!({}))
        .await
        .unwrap();
    assert_eq!(response, EngineResponse::text("hi"));
}

#[tokio::test]
async fn raw_prose_becomes_content() {
    let provider = Scripted::new(vec![ProviderReply::Raw("Sure, here you go.".into())]);
    let engine = engine(provider);

    let response = engine
        .execute(&PromptTemplate::new("s", "u"), json!({}))
        .await
        .unwrap();
    assert_eq!(response.content(), "Sure, here you go.");
}

#[tokio::test]
async fn embedded_actions_are_dispatched() {
    let text = r#"{"content": "", "actions": [{"name": "add", "data": {"a": 4, "b": 4}, "echo": true}]}"#;
    let provider = Scripted::new(vec![EngineResponse::text(text).into()]);
    let tools = ToolRegistry::default();
    let tool_calls = add_tool(&tools);
    let engine = engine_with(provider.clone(), tools, PromptTable::new());

    let response = engine
        .execute(&PromptTemplate::new("s", "u"), json!({}))
        .await
        .unwrap();
    assert_eq!(response.content(), "done");
    assert_eq!(tool_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn unknown_action_fails_the_invocation() {
    let provider = Scripted::new(vec![action_reply(Action::new("teleport", json!({"to": "Mars"})))]);
    let engine = engine(provider);

    let err = engine
        .execute_with("travel", &PromptTemplate::new("s", "u"), json!({}), RunOptions::new())
        .await
        .unwrap_err();
    match err {
        Error::UnknownAction {
            prompt,
            action,
            data,
        } => {
            assert_eq!(prompt, "travel");
            assert_eq!(action, "teleport");
            assert_eq!(data, json!({"to": "Mars"}));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn invalid_tool_params_surface_as_tool_error() {
    let provider = Scripted::new(vec![action_reply(Action::new("add", json!({"a": 1})))]);
    let tools = ToolRegistry::default();
    let tool_calls = add_tool(&tools);
    let engine = engine_with(provider, tools, PromptTable::new());

    let err = engine
        .execute(&PromptTemplate::new("s", "u"), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err.tool_error(), Some(ToolError::InvalidParams { .. })));
    assert!(matches!(err, Error::Tool { ref data, .. } if *data == json!({"a": 1})));
    assert_eq!(tool_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unparseable_arguments_fail_only_from_their_action() {
    let reply = EngineResponse::new(
        "",
        vec![
            Action::new("add", json!({"a": 1, "b": 2})),
            Action::unparsed("add", "{a: 1", "mock", "key must be a string"),
            Action::new("add", json!({"a": 3, "b": 4})),
        ],
    );
    let provider = Scripted::new(vec![reply.into()]);
    let tools = ToolRegistry::default();
    let tool_calls = add_tool(&tools);
    let engine = engine_with(provider, tools, PromptTable::new());

    let err = engine
        .execute_with("sum", &PromptTemplate::new("s", "u"), json!({}), RunOptions::new())
        .await
        .unwrap_err();
    match err {
        Error::ActionArguments {
            prompt,
            action,
            source,
        } => {
            assert_eq!(prompt, "sum");
            assert_eq!(action, "add");
            assert!(matches!(source, ProviderError::ToolArgumentsParse { ref provider, .. } if provider == "mock"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(tool_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn script_tools_run_in_the_sandbox() {
    let provider = Scripted::new(vec![action_reply(
        Action::new("double", json!({"n": 21})).echoed(),
    )]);
    let tools = ToolRegistry::default();
    tools
        .register(
            "double",
            ToolSchema::new(
                "double",
                "Doubles n",
                json!({"type": "object", "properties": {"n": {"type": "number"}}, "required": ["n"]}),
            ),
            ToolBody::script("params.n * 2"),
        )
        .unwrap();
    let engine = engine_with(provider.clone(), tools, PromptTable::new());

    engine
        .execute(&PromptTemplate::new("s", "u"), json!({}))
        .await
        .unwrap();
    let second = provider.request(1);
    assert_eq!(envelope(&second[3]), json!(42));
}

#[tokio::test]
async fn nested_prompt_action_runs_and_echoes() {
    let prompts = PromptTable::parse(
        r#"[
            {"outer": {"system": "Plan {goal}", "user": "start"}},
            {"inner": {"system": "Research {topic}", "user": "go", "requestFormat": {"topic": "string"}}}
        ]"#,
    )
    .unwrap();
    let provider = Scripted::new(vec![
        action_reply(Action::new("inner", json!({"topic": "tides"})).echoed()),
        EngineResponse::text("tides researched").into(),
        EngineResponse::text("plan complete").into(),
    ]);
    let engine = engine_with(provider.clone(), ToolRegistry::default(), prompts);

    let response = engine
        .execute_prompt("outer", json!({"goal": "sailing"}), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(response.content(), "plan complete");
    assert_eq!(provider.calls(), 3);

    let inner = provider.request(1);
    assert_eq!(envelope(&inner[0])["system"], "Research tides");

    let resumed = provider.request(2);
    assert_eq!(envelope(&resumed[3]), json!({"content": "tides researched"}));

    let advertised = envelope(&resumed[0]);
    assert_eq!(advertised["prompts"][1]["name"], "inner");
    assert_eq!(advertised["prompts"][1]["requestFormat"], json!({"topic": "string"}));
}

#[tokio::test]
async fn nested_prompts_share_the_step_budget() {
    let prompts = PromptTable::parse(r#"[{"recurse": {"system": "again", "user": "go"}}]"#).unwrap();
    let provider = Scripted::repeating(action_reply(Action::new("recurse", json!({}))));
    let engine = engine_with(provider.clone(), ToolRegistry::default(), prompts).with_config(
        EngineConfig {
            max_iterations: 5,
            cache: false,
            ..EngineConfig::default()
        },
    );

    let err = engine
        .execute_prompt("recurse", json!({}), RunOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LoopLimitExceeded { limit: 5, .. }));
    assert_eq!(provider.calls(), 5);
}

#[tokio::test]
async fn request_format_is_checked_before_calling() {
    let prompts = PromptTable::parse(
        r#"[{"review": {"system": "Review {code}", "user": "go", "requestFormat": {"code": "string", "lines": ["number", "undefined"]}}}]"#,
    )
    .unwrap();
    let provider = Scripted::new(Vec::new());
    let engine = engine_with(provider.clone(), ToolRegistry::default(), prompts);

    let err = engine
        .execute_prompt("review", json!({"code": 7}), RunOptions::new())
        .await
        .unwrap_err();
    match err {
        Error::RequestFormat {
            prompt,
            field,
            expected,
            actual,
        } => {
            assert_eq!(prompt, "review");
            assert_eq!(field, "code");
            assert_eq!(expected, "string");
            assert_eq!(actual, "number");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(provider.calls(), 0);

    engine
        .execute_prompt("review", json!({"code": "fn main() {}"}), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn cancellation_stops_a_pending_call() {
    let provider = Scripted::slow(Duration::from_secs(30));
    let engine = engine(provider.clone());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = engine
        .execute_with(
            "slow",
            &PromptTemplate::new("s", "u"),
            json!({}),
            RunOptions::new().with_cancel(cancel),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled { ref prompt } if prompt == "slow"));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn unknown_provider_override_is_reported() {
    let provider = Scripted::new(Vec::new());
    let engine = engine(provider.clone());

    let err = engine
        .execute_with(
            "p",
            &PromptTemplate::new("s", "u"),
            json!({}),
            RunOptions::new().with_overrides(ChatOptions::default().with_provider("nope")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownProvider { ref valid, .. } if valid == &["mock"]));
    assert_eq!(provider.calls(), 0);
}
