// Incremental decoder for the Claude streaming wire format
//
// The API delivers newline-delimited `data: <json>` frames over an HTTP
// body whose chunks split at arbitrary byte boundaries. A tool call's input
// object arrives as input_json_delta fragments that only become valid JSON
// once fully concatenated, so the accumulated string must never be parsed
// before the content_block_stop frame.

use serde::Deserialize;
use serde_json::Value;

use super::types::ToolUse;

const DATA_PREFIX: &[u8] = b"data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded frame of the model stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of assistant text.
    Token(String),
    /// The model began emitting a tool-use block.
    ToolCallStart { id: String, name: String },
    /// A fragment of the current tool call's input JSON.
    ToolCallDelta { partial_json: String },
    /// The tool-use block finished; input is parsed and ready.
    ToolCallStop(ToolUse),
    /// Token accounting reported by the API.
    Usage { input_tokens: u64, output_tokens: u64 },
    /// The message finished.
    Done,
    /// The API reported an error inside the stream.
    Error(String),
}

/// Stateful decoder: feed raw chunks, get typed events back.
///
/// A malformed line is dropped and decoding continues with the next line;
/// it never fails the stream.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    current_tool: Option<PartialToolCall>,
}

#[derive(Debug)]
struct PartialToolCall {
    id: String,
    name: String,
    input_json: String,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk; returns every event completed by it.
    ///
    /// Bytes after the last newline stay buffered until the next chunk, so
    /// chunk boundaries (including ones inside multi-byte characters) never
    /// affect the decoded events.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let rest = self.buffer.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.buffer, rest);
            while line.last() == Some(&b'\n') || line.last() == Some(&b'\r') {
                line.pop();
            }
            self.process_line(&line, &mut events);
        }
        events
    }

    fn process_line(&mut self, line: &[u8], events: &mut Vec<StreamEvent>) {
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            // Blank lines, `event:` lines, comments - all ignored.
            return;
        };
        let Ok(payload) = std::str::from_utf8(payload) else {
            tracing::debug!("Dropping non-UTF-8 stream line");
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == DONE_SENTINEL {
            return;
        }

        let frame: Frame = match serde_json::from_str(payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Dropping malformed stream frame: {}", e);
                return;
            }
        };

        match frame.event_type.as_str() {
            "content_block_start" => {
                let Some(block) = frame.content_block else { return };
                if block.block_type == "tool_use" {
                    let id = block.id.unwrap_or_default();
                    let name = block.name.unwrap_or_default();
                    self.current_tool = Some(PartialToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        input_json: String::new(),
                    });
                    events.push(StreamEvent::ToolCallStart { id, name });
                }
            }
            "content_block_delta" => {
                let Some(delta) = frame.delta else { return };
                match delta.delta_type.as_deref() {
                    Some("text_delta") => {
                        if let Some(text) = delta.text {
                            events.push(StreamEvent::Token(text));
                        }
                    }
                    Some("input_json_delta") => {
                        if let Some(fragment) = delta.partial_json {
                            if let Some(tool) = self.current_tool.as_mut() {
                                tool.input_json.push_str(&fragment);
                                events.push(StreamEvent::ToolCallDelta {
                                    partial_json: fragment,
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                // Text blocks close without an open tool; nothing to emit.
                if let Some(tool) = self.current_tool.take() {
                    // An unparseable accumulation becomes an empty input
                    // object rather than failing the tool call.
                    let input = serde_json::from_str::<Value>(&tool.input_json)
                        .unwrap_or_else(|_| Value::Object(Default::default()));
                    events.push(StreamEvent::ToolCallStop(ToolUse {
                        id: tool.id,
                        name: tool.name,
                        input,
                    }));
                }
            }
            "message_start" => {
                if let Some(usage) = frame.message.and_then(|m| m.usage) {
                    events.push(StreamEvent::Usage {
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                    });
                }
            }
            "message_delta" => {
                if let Some(usage) = frame.usage {
                    events.push(StreamEvent::Usage {
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                    });
                }
            }
            "message_stop" => events.push(StreamEvent::Done),
            "error" => {
                if let Some(error) = frame.error {
                    events.push(StreamEvent::Error(error.message));
                }
            }
            _ => {}
        }
    }
}

// Raw frame shapes as deserialized from the wire.

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    message: Option<FrameMessage>,
    #[serde(default)]
    content_block: Option<FrameContentBlock>,
    #[serde(default)]
    delta: Option<FrameDelta>,
    #[serde(default)]
    usage: Option<FrameUsage>,
    #[serde(default)]
    error: Option<FrameError>,
}

#[derive(Debug, Deserialize)]
struct FrameMessage {
    #[serde(default)]
    usage: Option<FrameUsage>,
}

#[derive(Debug, Deserialize)]
struct FrameContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

// message_delta frames carry a delta object without a "type" field, so the
// tag has to be optional here.
#[derive(Debug, Deserialize)]
struct FrameDelta {
    #[serde(rename = "type", default)]
    delta_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    partial_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FrameUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct FrameError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame_line(value: serde_json::Value) -> String {
        format!("data: {}\n", value)
    }

    /// SSE transcript for one tool call whose input arrives in fragments.
    fn tool_call_transcript(fragments: &[&str]) -> String {
        let mut transcript = String::new();
        transcript.push_str(&frame_line(json!({
            "type": "message_start",
            "message": {"usage": {"input_tokens": 12, "output_tokens": 1}}
        })));
        transcript.push_str(&frame_line(json!({
            "type": "content_block_start",
            "index": 0,
            "content_block": {"type": "tool_use", "id": "toolu_01", "name": "execute_python"}
        })));
        for fragment in fragments {
            transcript.push_str(&frame_line(json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "input_json_delta", "partial_json": fragment}
            })));
        }
        transcript.push_str(&frame_line(json!({"type": "content_block_stop", "index": 0})));
        transcript.push_str(&frame_line(json!({
            "type": "message_delta",
            "delta": {"stop_reason": "tool_use"},
            "usage": {"output_tokens": 34}
        })));
        transcript.push_str(&frame_line(json!({"type": "message_stop"})));
        transcript
    }

    fn decode_all(transcript: &str, chunk_size: usize) -> Vec<StreamEvent> {
        let mut decoder = StreamDecoder::new();
        let mut events = Vec::new();
        for chunk in transcript.as_bytes().chunks(chunk_size.max(1)) {
            events.extend(decoder.feed(chunk));
        }
        events
    }

    fn finished_tool(events: &[StreamEvent]) -> ToolUse {
        events
            .iter()
            .find_map(|event| match event {
                StreamEvent::ToolCallStop(tool) => Some(tool.clone()),
                _ => None,
            })
            .expect("transcript should finish a tool call")
    }

    #[test]
    fn test_text_tokens_and_done() {
        let mut transcript = String::new();
        transcript.push_str(&frame_line(json!({
            "type": "content_block_delta",
            "delta": {"type": "text_delta", "text": "Hello, "}
        })));
        transcript.push_str(&frame_line(json!({
            "type": "content_block_delta",
            "delta": {"type": "text_delta", "text": "world"}
        })));
        transcript.push_str(&frame_line(json!({"type": "message_stop"})));

        let events = decode_all(&transcript, usize::MAX);
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("Hello, ".to_string()),
                StreamEvent::Token("world".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn test_tool_input_assembled_from_fragments() {
        let transcript =
            tool_call_transcript(&["{\"code\": \"print(", "1 + 1)\", \"time", "out\": 5000}"]);
        let events = decode_all(&transcript, usize::MAX);
        let tool = finished_tool(&events);
        assert_eq!(tool.id, "toolu_01");
        assert_eq!(tool.name, "execute_python");
        assert_eq!(tool.input, json!({"code": "print(1 + 1)", "timeout": 5000}));
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let transcript = tool_call_transcript(&[
            "{\"code\":",
            " \"import numpy as np\\nprint(np.pi)\"",
            ", \"timeout\": 60000}",
        ]);
        let reference = decode_all(&transcript, usize::MAX);

        for chunk_size in [1, 2, 3, 5, 7, 11, 13, 64] {
            let events = decode_all(&transcript, chunk_size);
            assert_eq!(events, reference, "chunk size {} diverged", chunk_size);
        }
    }

    #[test]
    fn test_chunk_boundary_inside_multibyte_character() {
        let transcript = frame_line(json!({
            "type": "content_block_delta",
            "delta": {"type": "text_delta", "text": "η → π⁰"}
        }));
        let reference = decode_all(&transcript, usize::MAX);
        for chunk_size in 1..8 {
            assert_eq!(decode_all(&transcript, chunk_size), reference);
        }
    }

    #[test]
    fn test_malformed_line_is_skipped_not_fatal() {
        let mut transcript = String::from("data: {not json at all\n");
        transcript.push_str(&frame_line(json!({
            "type": "content_block_delta",
            "delta": {"type": "text_delta", "text": "still here"}
        })));

        let events = decode_all(&transcript, usize::MAX);
        assert_eq!(events, vec![StreamEvent::Token("still here".to_string())]);
    }

    #[test]
    fn test_done_sentinel_and_noise_lines_ignored() {
        let mut transcript = String::new();
        transcript.push_str("event: message_stop\n");
        transcript.push_str("\n");
        transcript.push_str("data: [DONE]\n");
        transcript.push_str(&frame_line(json!({"type": "message_stop"})));

        let events = decode_all(&transcript, usize::MAX);
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let transcript = frame_line(json!({
            "type": "content_block_delta",
            "delta": {"type": "text_delta", "text": "ok"}
        }))
        .replace('\n', "\r\n");
        let events = decode_all(&transcript, 4);
        assert_eq!(events, vec![StreamEvent::Token("ok".to_string())]);
    }

    #[test]
    fn test_unparseable_tool_input_becomes_empty_object() {
        let transcript = tool_call_transcript(&["{\"code\": \"print(1)"]);
        let events = decode_all(&transcript, usize::MAX);
        let tool = finished_tool(&events);
        assert_eq!(tool.input, json!({}));
    }

    #[test]
    fn test_empty_tool_input_becomes_empty_object() {
        let transcript = tool_call_transcript(&[]);
        let tool = finished_tool(&decode_all(&transcript, usize::MAX));
        assert_eq!(tool.input, json!({}));
    }

    #[test]
    fn test_usage_events_from_start_and_delta() {
        let transcript = tool_call_transcript(&["{}"]);
        let events = decode_all(&transcript, usize::MAX);
        let usages: Vec<_> = events
            .iter()
            .filter(|event| matches!(event, StreamEvent::Usage { .. }))
            .collect();
        assert_eq!(
            usages,
            vec![
                &StreamEvent::Usage { input_tokens: 12, output_tokens: 1 },
                &StreamEvent::Usage { input_tokens: 0, output_tokens: 34 },
            ]
        );
    }

    #[test]
    fn test_error_frame() {
        let transcript = frame_line(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        }));
        let events = decode_all(&transcript, usize::MAX);
        assert_eq!(events, vec![StreamEvent::Error("Overloaded".to_string())]);
    }

    #[test]
    fn test_text_block_stop_emits_nothing() {
        let mut transcript = String::new();
        transcript.push_str(&frame_line(json!({
            "type": "content_block_start",
            "content_block": {"type": "text", "text": ""}
        })));
        transcript.push_str(&frame_line(json!({
            "type": "content_block_delta",
            "delta": {"type": "text_delta", "text": "hi"}
        })));
        transcript.push_str(&frame_line(json!({"type": "content_block_stop"})));

        let events = decode_all(&transcript, usize::MAX);
        assert_eq!(events, vec![StreamEvent::Token("hi".to_string())]);
    }
}
