//! Stream transcoding through the registry.

use futures::StreamExt;
use llm_transcode::types::FinishReason;
use llm_transcode::{
    transcode_stream, Provider, TransformKind, TransformationRegistry, TranscodeConfig,
};
use serde_json::{json, Value};

fn registry() -> TransformationRegistry {
    TransformationRegistry::with_defaults(TranscodeConfig::default())
}

fn openai_tool_chunks() -> Vec<Value> {
    vec![
        json!({"id": "chatcmpl-9", "model": "gpt-4o", "choices": [{"index": 0, "delta": {
            "role": "assistant",
            "tool_calls": [{"index": 0, "id": "call_w", "type": "function",
                "function": {"name": "get_weather", "arguments": "{\"locat"}}]
        }}]}),
        json!({"id": "chatcmpl-9", "model": "gpt-4o", "choices": [{"index": 0, "delta": {
            "tool_calls": [{"index": 0, "function": {"arguments": "ion\":\"NYC\"}"}}]
        }}]}),
        json!({"id": "chatcmpl-9", "model": "gpt-4o", "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
        json!({"id": "chatcmpl-9", "model": "gpt-4o", "choices": [],
            "usage": {"prompt_tokens": 20, "completion_tokens": 9, "total_tokens": 29}}),
        json!("[DONE]"),
    ]
}

#[test]
fn streamed_tool_call_is_reported_by_session() {
    for target in [Provider::Claude, Provider::Gemini] {
        let mut transcoder = registry().stream(Provider::OpenAi, target).unwrap();
        let chunks = openai_tool_chunks();
        transcoder.push(&chunks[0]).unwrap();
        transcoder.push(&chunks[1]).unwrap();

        let calls = transcoder.session().tool_calls().unwrap();
        assert_eq!(calls.len(), 1, "target {}", target);
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(calls[0].arguments["location"], "NYC");
    }
}

#[test]
fn openai_tool_stream_to_claude_is_well_formed() {
    let mut transcoder = registry().stream(Provider::OpenAi, Provider::Claude).unwrap();
    let mut out = Vec::new();
    for chunk in openai_tool_chunks() {
        out.extend(transcoder.push(&chunk).unwrap());
    }
    out.extend(transcoder.finish().unwrap());

    let types: Vec<&str> = out.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert_eq!(
        types,
        vec![
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_delta",
            "message_stop",
        ]
    );
    assert_eq!(out[2]["delta"]["partial_json"], "{\"location\":\"NYC\"}");
    assert_eq!(out[4]["delta"]["stop_reason"], "tool_use");
    assert_eq!(out[5]["usage"]["input_tokens"], 20);
    assert_eq!(out[5]["usage"]["output_tokens"], 9);

    let session = transcoder.session();
    assert!(session.is_ended());
    assert_eq!(session.finish_reason(), Some(FinishReason::ToolCalls));
    assert_eq!(session.usage().unwrap().total_tokens, 29);
}

#[test]
fn interleaved_parallel_tool_calls_reach_claude_whole() {
    let mut transcoder = registry().stream(Provider::OpenAi, Provider::Claude).unwrap();
    let chunks = vec![
        json!({"id": "chatcmpl-p", "model": "gpt-4o", "choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "id": "call_x", "type": "function", "function": {"name": "fx", "arguments": "{\"x\":"}},
            {"index": 1, "id": "call_y", "type": "function", "function": {"name": "fy", "arguments": "{\"y\":"}}
        ]}}]}),
        json!({"id": "chatcmpl-p", "model": "gpt-4o", "choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": "1}"}},
            {"index": 1, "function": {"arguments": "2}"}}
        ]}}]}),
        json!({"id": "chatcmpl-p", "model": "gpt-4o", "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
        json!("[DONE]"),
    ];
    let mut out = Vec::new();
    for chunk in &chunks {
        out.extend(transcoder.push(chunk).unwrap());
    }

    let mut names = Vec::new();
    let mut args: Vec<String> = Vec::new();
    for event in &out {
        match event["type"].as_str().unwrap() {
            "content_block_start" => {
                names.push(event["content_block"]["name"].as_str().unwrap().to_string());
                args.push(String::new());
            }
            "content_block_delta" => {
                let index = event["index"].as_u64().unwrap() as usize;
                args[index].push_str(event["delta"]["partial_json"].as_str().unwrap());
            }
            _ => {}
        }
    }
    assert_eq!(names, vec!["fx", "fy"]);
    let parsed: Vec<Value> = args.iter().map(|a| serde_json::from_str(a).unwrap()).collect();
    assert_eq!(parsed, vec![json!({"x": 1}), json!({"y": 2})]);

    let starts = out.iter().filter(|e| e["type"] == "content_block_start").count();
    let stops = out.iter().filter(|e| e["type"] == "content_block_stop").count();
    assert_eq!(starts, stops);
    assert_eq!(out.last().unwrap()["type"], "message_stop");
}

#[test]
fn claude_tool_stream_to_openai_keeps_index_and_id() {
    let mut transcoder = registry().stream(Provider::Claude, Provider::OpenAi).unwrap();
    let events = vec![
        json!({"type": "message_start", "message": {"id": "msg_7", "type": "message", "role": "assistant",
            "model": "claude-sonnet-4", "content": [], "usage": {"input_tokens": 30, "output_tokens": 1}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Checking."}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "content_block_start", "index": 1, "content_block":
            {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {}}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"location\":"}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "\"NYC\"}"}}),
        json!({"type": "content_block_stop", "index": 1}),
        json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 15}}),
        json!({"type": "message_stop"}),
    ];
    let mut out = Vec::new();
    for event in &events {
        out.extend(transcoder.push(event).unwrap());
    }

    let tool_deltas: Vec<&Value> = out
        .iter()
        .filter_map(|c| c["choices"][0]["delta"]["tool_calls"].get(0))
        .collect();
    assert_eq!(tool_deltas.len(), 3);
    assert_eq!(tool_deltas[0]["index"], 0);
    assert_eq!(tool_deltas[0]["id"], "toolu_1");
    assert_eq!(tool_deltas[0]["function"]["name"], "get_weather");
    let args: String = tool_deltas
        .iter()
        .filter_map(|d| d["function"]["arguments"].as_str())
        .collect();
    assert_eq!(args, "{\"location\":\"NYC\"}");

    let usage = out.iter().find(|c| c.get("usage").is_some()).unwrap();
    assert_eq!(usage["usage"]["prompt_tokens"], 30);
    assert_eq!(usage["usage"]["completion_tokens"], 15);
    assert_eq!(out.last().unwrap(), &json!("[DONE]"));
}

#[test]
fn gemini_stream_without_sentinel_is_closed_by_finish() {
    let mut transcoder = registry().stream(Provider::Gemini, Provider::Claude).unwrap();
    let chunks = vec![
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hel"}]}, "index": 0}],
            "modelVersion": "gemini-2.0-flash", "responseId": "resp-1"}),
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "lo"}]}, "finishReason": "STOP", "index": 0}],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6}}),
    ];
    let mut out = Vec::new();
    for chunk in &chunks {
        out.extend(transcoder.push(chunk).unwrap());
    }
    assert!(!out.iter().any(|e| e["type"] == "message_stop"));

    out.extend(transcoder.finish().unwrap());
    assert_eq!(out[0]["message"]["id"], "resp-1");
    assert_eq!(out[0]["message"]["model"], "gemini-2.0-flash");
    let text: String = out
        .iter()
        .filter_map(|e| e["delta"]["text"].as_str())
        .collect();
    assert_eq!(text, "Hello");
    assert_eq!(out.last().unwrap()["type"], "message_stop");
    assert_eq!(
        out.iter().filter(|e| e["type"] == "message_stop").count(),
        1
    );
}

#[test]
fn one_shot_chunk_transform_returns_array() {
    let out = registry()
        .transform(
            Provider::Claude,
            Provider::Gemini,
            TransformKind::StreamChunk,
            &json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi"}}),
        )
        .unwrap();
    let chunks = out.as_array().unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0]["candidates"][0]["content"]["parts"][0]["text"], "Hi");
}

#[test]
fn malformed_chunk_is_rejected() {
    let mut transcoder = registry().stream(Provider::Claude, Provider::OpenAi).unwrap();
    let err = transcoder
        .push(&json!({"type": "content_block_delta", "index": "zero"}))
        .unwrap_err();
    assert_eq!(err.kind(), "malformed_payload");
}

#[tokio::test]
async fn transcode_stream_maps_a_futures_stream() {
    let transcoder = registry().stream(Provider::OpenAi, Provider::Gemini).unwrap();
    let input = futures::stream::iter(openai_tool_chunks().into_iter().map(Ok));
    let out: Vec<Value> = transcode_stream(input, transcoder)
        .map(|r| r.unwrap())
        .collect()
        .await;

    let call = out
        .iter()
        .find_map(|c| c["candidates"][0]["content"]["parts"][0].get("functionCall"))
        .unwrap();
    assert_eq!(call["name"], "get_weather");
    assert_eq!(call["args"]["location"], "NYC");
    let usage = out.iter().find_map(|c| c.get("usageMetadata")).unwrap();
    assert_eq!(usage["totalTokenCount"], 29);
}
