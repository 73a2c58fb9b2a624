//! Benchmarks for payload transformation
//!
//! This benchmark measures:
//! - Request conversion for every ordered provider pair
//! - Conversation length scaling
//! - Stream transcoding of a fragmented tool call

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};

use llm_transcode::{Provider, TransformKind, TransformationRegistry, TranscodeConfig};

fn native_request(provider: Provider) -> Value {
    match provider {
        Provider::Gemini => json!({
            "model": "gemini-2.0-flash",
            "systemInstruction": {"parts": [{"text": "You are helpful."}]},
            "contents": [{"role": "user", "parts": [{"text": "What is the weather in NYC?"}]}],
            "tools": [{"functionDeclarations": [{
                "name": "get_weather",
                "parameters": {"type": "object", "properties": {"location": {"type": "string"}}}
            }]}],
            "generationConfig": {"maxOutputTokens": 256, "temperature": 0.7}
        }),
        Provider::Claude => json!({
            "model": "claude-sonnet-4",
            "system": "You are helpful.",
            "messages": [{"role": "user", "content": "What is the weather in NYC?"}],
            "tools": [{
                "name": "get_weather",
                "input_schema": {"type": "object", "properties": {"location": {"type": "string"}}}
            }],
            "max_tokens": 256,
            "temperature": 0.7
        }),
        _ => json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "You are helpful."},
                {"role": "user", "content": "What is the weather in NYC?"}
            ],
            "tools": [{"type": "function", "function": {
                "name": "get_weather",
                "parameters": {"type": "object", "properties": {"location": {"type": "string"}}}
            }}],
            "max_tokens": 256,
            "temperature": 0.7
        }),
    }
}

fn long_openai_conversation(turns: usize) -> Value {
    let mut messages = vec![json!({"role": "system", "content": "You are helpful."})];
    for i in 0..turns {
        messages.push(json!({"role": "user", "content": format!("Question number {}", i)}));
        messages.push(json!({"role": "assistant", "content": format!("Answer number {}", i)}));
    }
    messages.push(json!({"role": "user", "content": "Summarize."}));
    json!({"model": "gpt-4o", "messages": messages, "max_tokens": 512})
}

fn bench_request_pairs(c: &mut Criterion) {
    let registry = TransformationRegistry::with_defaults(TranscodeConfig::default());
    let mut group = c.benchmark_group("request_transform");

    for pair in registry.pairs() {
        let payload = native_request(pair.source);
        group.bench_with_input(
            BenchmarkId::new("pair", pair.to_string()),
            &payload,
            |b, payload| {
                b.iter(|| {
                    registry
                        .transform(pair.source, pair.target, TransformKind::Request, black_box(payload))
                        .unwrap()
                })
            },
        );
    }
    group.finish();
}

fn bench_conversation_length(c: &mut Criterion) {
    let registry = TransformationRegistry::with_defaults(TranscodeConfig::default());
    let mut group = c.benchmark_group("conversation_length");

    for turns in [1usize, 10, 100] {
        let payload = long_openai_conversation(turns);
        group.throughput(Throughput::Elements((turns * 2 + 2) as u64));
        group.bench_with_input(BenchmarkId::new("openai_to_claude", turns), &payload, |b, p| {
            b.iter(|| {
                registry
                    .transform(Provider::OpenAi, Provider::Claude, TransformKind::Request, black_box(p))
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_stream_tool_call(c: &mut Criterion) {
    let registry = TransformationRegistry::with_defaults(TranscodeConfig::default());
    let fragments = ["{\"loc", "ation\"", ":\"N", "YC\"", ",\"unit\":", "\"c\"}"];
    let mut chunks = vec![json!({"id": "chatcmpl-b", "model": "gpt-4o", "choices": [{"index": 0, "delta": {
        "tool_calls": [{"index": 0, "id": "call_b", "type": "function",
            "function": {"name": "get_weather", "arguments": ""}}]
    }}]})];
    for fragment in fragments {
        chunks.push(json!({"id": "chatcmpl-b", "model": "gpt-4o", "choices": [{"index": 0, "delta": {
            "tool_calls": [{"index": 0, "function": {"arguments": fragment}}]
        }}]}));
    }
    chunks.push(json!({"id": "chatcmpl-b", "model": "gpt-4o", "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}));
    chunks.push(json!("[DONE]"));

    let mut group = c.benchmark_group("stream_tool_call");
    group.throughput(Throughput::Elements(chunks.len() as u64));
    for target in [Provider::Claude, Provider::Gemini] {
        group.bench_with_input(BenchmarkId::new("openai_to", target), &chunks, |b, chunks| {
            b.iter(|| {
                let mut transcoder = registry.stream(Provider::OpenAi, target).unwrap();
                let mut produced = 0usize;
                for chunk in chunks {
                    produced += transcoder.push(black_box(chunk)).unwrap().len();
                }
                produced
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_request_pairs,
    bench_conversation_length,
    bench_stream_tool_call
);
criterion_main!(benches);
