//! Tool-call reassembly across stream chunks.

use std::collections::BTreeMap;

use crate::types::tool::parse_arguments;
use crate::types::{StreamEvent, UnifiedToolCall};
use crate::Result;

/// A tool call under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialToolCall {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Concatenated argument fragments, in arrival order.
    pub arguments: String,
    pub complete: bool,
    scan: ObjectScan,
}

/// Incremental brace tracker over the argument buffer, so the buffer is only
/// parsed when its top-level value closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ObjectScan {
    depth: u32,
    in_string: bool,
    escaped: bool,
    closed: bool,
}

impl ObjectScan {
    /// Feed one fragment; true when the buffer may hold a whole object.
    fn feed(&mut self, fragment: &str) -> bool {
        for c in fragment.chars() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == '"' {
                    self.in_string = false;
                }
                continue;
            }
            match c {
                '"' => self.in_string = true,
                '{' | '[' => {
                    self.depth += 1;
                    self.closed = false;
                }
                '}' | ']' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.closed = self.depth == 0 && c == '}';
                }
                _ => {}
            }
        }
        self.closed
    }
}

impl PartialToolCall {
    /// Finished call with decoded arguments.
    pub fn to_tool_call(&self) -> Result<UnifiedToolCall> {
        Ok(UnifiedToolCall::new(
            self.id.clone().unwrap_or_default(),
            self.name.clone().unwrap_or_default(),
            parse_arguments(&self.arguments)?,
        ))
    }

    fn buffer_is_object(&self) -> bool {
        let trimmed = self.arguments.trim_end();
        trimmed.ends_with('}')
            && matches!(
                serde_json::from_str::<serde_json::Value>(trimmed),
                Ok(serde_json::Value::Object(_))
            )
    }
}

/// Collects tool-call deltas keyed by their stable index within the turn.
///
/// A call is complete once its argument buffer holds a whole JSON object, an
/// explicit end-of-call event arrives for its index, or the stream finishes.
#[derive(Debug, Clone, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_delta(
        &mut self,
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        fragment: &str,
    ) {
        let entry = self.calls.entry(index).or_default();
        if let Some(id) = id.filter(|s| !s.is_empty()) {
            entry.id.get_or_insert_with(|| id.to_string());
        }
        if let Some(name) = name.filter(|s| !s.is_empty()) {
            entry.name.get_or_insert_with(|| name.to_string());
        }
        if !fragment.is_empty() {
            entry.arguments.push_str(fragment);
            entry.complete = entry.scan.feed(fragment) && entry.buffer_is_object();
        }
    }

    pub fn on_end(&mut self, index: u32) {
        if let Some(entry) = self.calls.get_mut(&index) {
            entry.complete = true;
        }
    }

    pub fn complete_all(&mut self) {
        for entry in self.calls.values_mut() {
            entry.complete = true;
        }
    }

    /// Route an IR event to the matching handler.
    pub fn observe(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => self.on_delta(*index, id.as_deref(), name.as_deref(), arguments),
            StreamEvent::ToolCallEnd { index } => self.on_end(*index),
            StreamEvent::Finish { .. } | StreamEvent::StreamEnd => self.complete_all(),
            _ => {}
        }
    }

    pub fn get(&self, index: u32) -> Option<&PartialToolCall> {
        self.calls.get(&index)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.calls.keys().copied()
    }

    /// Id recorded for `index`, if any delta carried one.
    pub fn id_of(&self, index: u32) -> Option<&str> {
        self.calls.get(&index).and_then(|c| c.id.as_deref())
    }

    /// Completed calls in index order; fails if a completed buffer is not an object.
    pub fn completed(&self) -> Result<Vec<UnifiedToolCall>> {
        self.calls
            .values()
            .filter(|c| c.complete)
            .map(PartialToolCall::to_tool_call)
            .collect()
    }
}
