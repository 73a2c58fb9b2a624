#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::drivers::{ClaudeAdapter, GeminiAdapter, OpenAiAdapter, ProviderDriver};
    use crate::pipeline::{transcode_stream, StreamSession, StreamTranscoder};
    use crate::types::{FinishReason, StreamEvent, UnifiedUsage};
    use futures::StreamExt;
    use serde_json::{json, Value};

    fn openai() -> Arc<dyn ProviderDriver> {
        Arc::new(OpenAiAdapter::default())
    }

    fn claude() -> Arc<dyn ProviderDriver> {
        Arc::new(ClaudeAdapter::default())
    }

    fn gemini() -> Arc<dyn ProviderDriver> {
        Arc::new(GeminiAdapter::default())
    }

    /// `get_weather` split across two OpenAI chunks.
    fn weather_chunks() -> Vec<Value> {
        vec![
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "model": "gpt-4o",
                "choices": [{"index": 0, "delta": {"tool_calls": [{
                    "index": 0,
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"locat"}
                }]}}]
            }),
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "model": "gpt-4o",
                "choices": [{"index": 0, "delta": {"tool_calls": [{
                    "index": 0,
                    "function": {"arguments": "ion\":\"NYC\"}"}
                }]}}]
            }),
        ]
    }

    #[test]
    fn test_two_chunk_tool_call_reassembled() {
        let mut transcoder = StreamTranscoder::new(openai(), claude());
        let chunks = weather_chunks();

        transcoder.push(&chunks[0]).unwrap();
        assert!(transcoder.session().tool_calls().unwrap().is_empty());

        transcoder.push(&chunks[1]).unwrap();
        let calls = transcoder.session().tool_calls().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(Value::Object(calls[0].arguments.clone()), json!({"location": "NYC"}));
    }

    #[test]
    fn test_openai_tool_stream_to_claude_events() {
        let mut transcoder = StreamTranscoder::new(openai(), claude());
        let chunks = weather_chunks();

        let first = transcoder.push(&chunks[0]).unwrap();
        let types: Vec<&str> = first.iter().map(|c| c["type"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["message_start"]);
        assert_eq!(first[0]["message"]["id"], "chatcmpl-1");

        let second = transcoder.push(&chunks[1]).unwrap();
        let types: Vec<&str> = second.iter().map(|c| c["type"].as_str().unwrap()).collect();
        assert_eq!(
            types,
            vec!["content_block_start", "content_block_delta", "content_block_stop"]
        );
        assert_eq!(second[0]["content_block"]["type"], "tool_use");
        assert_eq!(second[0]["content_block"]["name"], "get_weather");
        assert_eq!(second[0]["content_block"]["id"], "call_1");
        assert_eq!(second[1]["delta"]["partial_json"], "{\"location\":\"NYC\"}");

        let tail = transcoder.finish().unwrap();
        let types: Vec<&str> = tail.iter().map(|c| c["type"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["message_delta", "message_stop"]);
        assert_eq!(tail[0]["delta"]["stop_reason"], "tool_use");
        assert!(transcoder.finish().unwrap().is_empty());
    }

    #[test]
    fn test_openai_tool_stream_to_gemini_whole_call() {
        let mut transcoder = StreamTranscoder::new(openai(), gemini());
        for chunk in weather_chunks() {
            assert!(transcoder.push(&chunk).unwrap().is_empty());
        }
        let finish = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]
        });
        let out = transcoder.push(&finish).unwrap();
        assert_eq!(out.len(), 1);
        let candidate = &out[0]["candidates"][0];
        assert_eq!(candidate["finishReason"], "STOP");
        let call = &candidate["content"]["parts"][0]["functionCall"];
        assert_eq!(call["name"], "get_weather");
        assert_eq!(call["args"], json!({"location": "NYC"}));
        assert_eq!(
            transcoder.session().finish_reason(),
            Some(FinishReason::ToolCalls)
        );
    }

    #[test]
    fn test_claude_text_stream_to_openai() {
        let mut transcoder = StreamTranscoder::new(claude(), openai());
        let events = vec![
            json!({"type": "message_start", "message": {
                "id": "msg_1", "type": "message", "role": "assistant", "model": "claude-sonnet",
                "content": [], "usage": {"input_tokens": 12, "output_tokens": 0}
            }}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hel"}}),
            json!({"type": "ping"}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "lo"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 5}}),
            json!({"type": "message_stop"}),
        ];
        let mut out = Vec::new();
        for event in &events {
            out.extend(transcoder.push(event).unwrap());
        }

        assert_eq!(out[0]["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(out[0]["id"], "msg_1");
        let text: String = out
            .iter()
            .filter_map(|c| c["choices"][0]["delta"]["content"].as_str())
            .collect();
        assert_eq!(text, "Hello");
        assert!(out
            .iter()
            .any(|c| c["choices"][0]["finish_reason"] == "stop"));
        let usage = out.iter().find(|c| c.get("usage").is_some()).unwrap();
        assert_eq!(usage["usage"]["prompt_tokens"], 12);
        assert_eq!(usage["usage"]["completion_tokens"], 5);
        assert_eq!(usage["usage"]["total_tokens"], 17);
        assert_eq!(out.last().unwrap(), &json!("[DONE]"));

        let session = transcoder.session();
        assert_eq!(session.text(), "Hello");
        assert!(session.is_ended());
        assert!(transcoder.push(&json!({"type": "ping"})).unwrap().is_empty());
    }

    #[test]
    fn test_gemini_function_call_stream_to_openai() {
        let mut transcoder = StreamTranscoder::new(gemini(), openai());
        let chunk = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "get_weather", "args": {"location": "NYC"}}}
                ]},
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 4, "totalTokenCount": 12},
            "modelVersion": "gemini-2.0-flash"
        });
        let out = transcoder.push(&chunk).unwrap();
        let call = out
            .iter()
            .find_map(|c| c["choices"][0]["delta"]["tool_calls"].get(0))
            .unwrap();
        assert_eq!(call["function"]["name"], "get_weather");
        assert!(call["id"].as_str().unwrap().starts_with("call_"));
        assert!(out
            .iter()
            .any(|c| c["choices"][0]["finish_reason"] == "tool_calls"));

        let tail = transcoder.finish().unwrap();
        assert_eq!(tail, vec![json!("[DONE]")]);
        assert_eq!(transcoder.session().model(), Some("gemini-2.0-flash"));
    }

    #[test]
    fn test_session_tracks_usage_and_reasoning() {
        let mut session = StreamSession::new();
        session.observe(&StreamEvent::ReasoningDelta { text: "think".into() });
        session.observe(&StreamEvent::text("answer"));
        session.observe(&StreamEvent::Usage {
            usage: UnifiedUsage::new(3, 4),
        });
        session.observe(&StreamEvent::Finish {
            reason: FinishReason::Stop,
        });
        assert_eq!(session.reasoning(), "think");
        assert_eq!(session.text(), "answer");
        assert_eq!(session.usage().unwrap().total_tokens, 7);
        assert_eq!(session.finish_reason(), Some(FinishReason::Stop));
        assert!(!session.is_ended());
    }

    #[test]
    fn test_openai_stray_string_is_malformed() {
        let mut transcoder = StreamTranscoder::new(openai(), claude());
        let err = transcoder.push(&json!("not a sentinel")).unwrap_err();
        assert_eq!(err.kind(), "malformed_payload");
    }

    #[test]
    fn test_failed_encode_leaves_session_untouched() {
        let mut transcoder = StreamTranscoder::new(openai(), gemini());
        let truncated = json!({
            "id": "chatcmpl-2",
            "model": "gpt-4o",
            "choices": [{"index": 0, "delta": {"tool_calls": [{
                "index": 0,
                "id": "call_t",
                "type": "function",
                "function": {"name": "get_weather", "arguments": "{\"location\":"}
            }]}}]
        });
        assert!(transcoder.push(&truncated).unwrap().is_empty());

        let finish = json!({
            "id": "chatcmpl-2",
            "model": "gpt-4o",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]
        });
        let err = transcoder.push(&finish).unwrap_err();
        assert_eq!(err.kind(), "malformed_payload");

        let session = transcoder.session();
        assert_eq!(session.finish_reason(), None);
        assert!(!session.accumulator().get(0).unwrap().complete);
        assert_eq!(session.accumulator().get(0).unwrap().arguments, "{\"location\":");
        assert!(!session.is_ended());
    }

    #[tokio::test]
    async fn test_transcode_stream_flushes_on_end() {
        let input = futures::stream::iter(weather_chunks().into_iter().map(Ok));
        let transcoder = StreamTranscoder::new(openai(), claude());
        let out: Vec<Value> = transcode_stream(input, transcoder)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out.first().unwrap()["type"], "message_start");
        assert_eq!(out.last().unwrap()["type"], "message_stop");
    }
}
