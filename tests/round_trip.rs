//! Request round trips through the unified IR.

use std::sync::Arc;

use llm_transcode::types::{Role, UnifiedMessage, UnifiedRequest, UnifiedToolCall};
use llm_transcode::{
    ClaudeAdapter, GeminiAdapter, OpenAiAdapter, Provider, ProviderDriver, TransformKind,
    TransformationRegistry, TranscodeConfig,
};
use serde_json::{json, Value};

fn drivers() -> Vec<Arc<dyn ProviderDriver>> {
    vec![
        Arc::new(OpenAiAdapter::default()),
        Arc::new(GeminiAdapter::default()),
        Arc::new(ClaudeAdapter::default()),
    ]
}

fn registry() -> TransformationRegistry {
    TransformationRegistry::with_defaults(TranscodeConfig::default())
}

fn simple_chat() -> UnifiedRequest {
    UnifiedRequest::new(
        "m",
        vec![
            UnifiedMessage::system("You are helpful."),
            UnifiedMessage::user("Hi"),
        ],
    )
    .with_max_tokens(50)
}

#[test]
fn simple_chat_survives_every_provider() {
    let ir = simple_chat();
    for driver in drivers() {
        let native = driver.request_from_ir(&ir).unwrap();
        let back = driver.request_to_ir(&native).unwrap();

        let turns: Vec<(Role, String)> = back.messages.iter().map(|m| (m.role, m.text())).collect();
        assert_eq!(
            turns,
            vec![
                (Role::System, "You are helpful.".to_string()),
                (Role::User, "Hi".to_string()),
            ],
            "provider {}",
            driver.provider()
        );
        assert_eq!(back.max_tokens, Some(50), "provider {}", driver.provider());
        assert_eq!(back.model, "m");
    }
}

#[test]
fn native_request_round_trips_through_every_other_provider() {
    let registry = registry();
    let natives = [
        (
            Provider::OpenAi,
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "You are helpful."},
                    {"role": "user", "content": "Hi"}
                ],
                "max_tokens": 50
            }),
        ),
        (
            Provider::Gemini,
            json!({
                "model": "gemini-2.0-flash",
                "systemInstruction": {"parts": [{"text": "You are helpful."}]},
                "contents": [{"role": "user", "parts": [{"text": "Hi"}]}],
                "generationConfig": {"maxOutputTokens": 50}
            }),
        ),
        (
            Provider::Claude,
            json!({
                "model": "claude-sonnet-4",
                "system": "You are helpful.",
                "messages": [{"role": "user", "content": "Hi"}],
                "max_tokens": 50
            }),
        ),
    ];

    for (source, native) in &natives {
        let original = registry.driver(*source).unwrap().request_to_ir(native).unwrap();
        for target in Provider::all() {
            if target == *source {
                continue;
            }
            let there = registry
                .transform(*source, target, TransformKind::Request, native)
                .unwrap();
            let back = registry
                .transform(target, *source, TransformKind::Request, &there)
                .unwrap();
            let again = registry.driver(*source).unwrap().request_to_ir(&back).unwrap();

            assert_eq!(again.model, original.model, "{} -> {}", source, target);
            assert_eq!(again.max_tokens, original.max_tokens, "{} -> {}", source, target);
            let texts = |r: &UnifiedRequest| -> Vec<(Role, String)> {
                r.messages.iter().map(|m| (m.role, m.text())).collect()
            };
            assert_eq!(texts(&again), texts(&original), "{} -> {}", source, target);
        }
    }
}

#[test]
fn tool_call_conversation_keeps_names_and_arguments() {
    let call = UnifiedToolCall::new(
        "call_1",
        "get_weather",
        json!({"location": "NYC"}).as_object().cloned().unwrap(),
    );
    let ir = UnifiedRequest::new(
        "m",
        vec![
            UnifiedMessage::user("Weather in NYC?"),
            UnifiedMessage::assistant("").with_tool_calls(vec![call]),
            UnifiedMessage::tool_result("call_1", "{\"temp\":20}").with_name("get_weather"),
        ],
    )
    .with_max_tokens(100);

    for driver in drivers() {
        let native = driver.request_from_ir(&ir).unwrap();
        let back = driver.request_to_ir(&native).unwrap();
        let provider = driver.provider();

        assert_eq!(back.messages.len(), 3, "provider {}", provider);
        let assistant = &back.messages[1];
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.tool_calls.len(), 1, "provider {}", provider);
        assert_eq!(assistant.tool_calls[0].name, "get_weather");
        assert_eq!(
            Value::Object(assistant.tool_calls[0].arguments.clone()),
            json!({"location": "NYC"})
        );

        let result = &back.messages[2];
        assert_eq!(result.role, Role::Tool, "provider {}", provider);
        assert_eq!(result.tool_call_id.as_deref(), Some(assistant.tool_calls[0].id.as_str()));
        let payload: Value = serde_json::from_str(&result.text()).unwrap();
        assert_eq!(payload, json!({"temp": 20}), "provider {}", provider);
    }
}

#[test]
fn native_encoding_is_stable_after_one_pass() {
    let call = UnifiedToolCall::new(
        "call_7",
        "get_weather",
        json!({"location": "Oslo"}).as_object().cloned().unwrap(),
    );
    let conversations = [
        simple_chat(),
        UnifiedRequest::new(
            "m",
            vec![
                UnifiedMessage::system("Be brief."),
                UnifiedMessage::user("Weather in Oslo?"),
                UnifiedMessage::assistant("").with_tool_calls(vec![call]),
                UnifiedMessage::tool_result("call_7", "{\"temp\":3}").with_name("get_weather"),
            ],
        )
        .with_max_tokens(64),
    ];

    for ir in &conversations {
        for driver in drivers() {
            let native = driver.request_from_ir(ir).unwrap();
            let again = driver
                .request_from_ir(&driver.request_to_ir(&native).unwrap())
                .unwrap();
            assert_eq!(again, native, "provider {}", driver.provider());
        }
    }
}

#[test]
fn gemini_function_parts_carry_call_ids() {
    let openai = json!({
        "model": "gpt-4o",
        "messages": [
            {"role": "user", "content": "Weather?"},
            {"role": "assistant", "content": null, "tool_calls": [{"id": "call_abc", "type": "function",
                "function": {"name": "get_weather", "arguments": "{\"location\":\"NYC\"}"}}]},
            {"role": "tool", "tool_call_id": "call_abc", "content": "20C"}
        ]
    });
    let gemini = registry()
        .transform(Provider::OpenAi, Provider::Gemini, TransformKind::Request, &openai)
        .unwrap();
    assert_eq!(gemini["contents"][1]["parts"][0]["functionCall"]["id"], "call_abc");
    assert_eq!(gemini["contents"][2]["parts"][0]["functionResponse"]["id"], "call_abc");
    assert_eq!(gemini["contents"][2]["parts"][0]["functionResponse"]["name"], "get_weather");

    let back = registry()
        .transform(Provider::Gemini, Provider::OpenAi, TransformKind::Request, &gemini)
        .unwrap();
    assert_eq!(back["messages"][1]["tool_calls"][0]["id"], "call_abc");
    assert_eq!(back["messages"][2]["tool_call_id"], "call_abc");
}

#[test]
fn claude_tool_results_split_into_tool_messages() {
    let registry = registry();
    let claude = json!({
        "model": "claude-sonnet-4",
        "max_tokens": 256,
        "messages": [
            {"role": "user", "content": "Compare NYC and LA"},
            {"role": "assistant", "content": [
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"location": "NYC"}},
                {"type": "tool_use", "id": "toolu_2", "name": "get_weather", "input": {"location": "LA"}}
            ]},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "toolu_1", "content": "20C"},
                {"type": "tool_result", "tool_use_id": "toolu_2", "content": "25C"},
                {"type": "text", "text": "Which is warmer?"}
            ]}
        ]
    });
    let openai = registry
        .transform(Provider::Claude, Provider::OpenAi, TransformKind::Request, &claude)
        .unwrap();
    let messages = openai["messages"].as_array().unwrap();
    let roles: Vec<&str> = messages.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["user", "assistant", "tool", "tool", "user"]);
    assert_eq!(messages[1]["tool_calls"][1]["id"], "toolu_2");
    assert_eq!(messages[2]["tool_call_id"], "toolu_1");
    assert_eq!(messages[3]["content"], "25C");
    assert_eq!(messages[4]["content"], "Which is warmer?");

    // Back to Claude, the two results land in one user turn again.
    let claude_again = registry
        .transform(Provider::OpenAi, Provider::Claude, TransformKind::Request, &openai)
        .unwrap();
    let turns = claude_again["messages"].as_array().unwrap();
    assert_eq!(turns.len(), 3);
    let blocks = turns[2]["content"].as_array().unwrap();
    assert_eq!(blocks[0]["type"], "tool_result");
    assert_eq!(blocks[1]["tool_use_id"], "toolu_2");
    assert_eq!(blocks[2]["text"], "Which is warmer?");
}

#[test]
fn reasoning_budget_maps_to_effort_and_back() {
    let registry = registry();
    let claude = json!({
        "model": "claude-sonnet-4",
        "max_tokens": 16000,
        "thinking": {"type": "enabled", "budget_tokens": 4096},
        "messages": [{"role": "user", "content": "Prove it"}]
    });
    let openai = registry
        .transform(Provider::Claude, Provider::OpenAi, TransformKind::Request, &claude)
        .unwrap();
    assert_eq!(openai["reasoning_effort"], "medium");

    let gemini = registry
        .transform(Provider::Claude, Provider::Gemini, TransformKind::Request, &claude)
        .unwrap();
    assert_eq!(gemini["generationConfig"]["thinkingConfig"]["thinkingBudget"], 4096);

    let claude_again = registry
        .transform(Provider::OpenAi, Provider::Claude, TransformKind::Request, &openai)
        .unwrap();
    assert_eq!(claude_again["thinking"]["budget_tokens"], 8192);
}
