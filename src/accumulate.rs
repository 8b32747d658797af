//! Folding streamed chunks back into a complete response.

use crate::completion::{
    Choice, Completion, CompletionChunk, FunctionCall, ResponseMessage, ToolCall, Usage,
};
use std::collections::BTreeMap;

/// Tool call under construction. Id and name arrive once, arguments in fragments.
#[derive(Debug, Default)]
struct ToolBuilder {
    id: Option<String>,
    call_type: Option<String>,
    name: Option<String>,
    argument_parts: Vec<String>,
}

impl ToolBuilder {
    fn finish(self) -> Option<ToolCall> {
        let name = self.name?;
        Some(ToolCall {
            id: self.id.unwrap_or_default(),
            call_type: self.call_type.unwrap_or_else(|| "function".to_string()),
            function: FunctionCall {
                name,
                arguments: self.argument_parts.concat(),
            },
        })
    }
}

#[derive(Debug, Default)]
struct ChoiceBuilder {
    role: Option<String>,
    content: Option<String>,
    refusal: Option<String>,
    tools: BTreeMap<u32, ToolBuilder>,
    finish_reason: Option<String>,
}

/// Accumulates streamed deltas per choice index.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    id: Option<String>,
    created: i64,
    model: String,
    system_fingerprint: Option<String>,
    choices: BTreeMap<u32, ChoiceBuilder>,
    usage: Option<Usage>,
    chunks: usize,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks pushed so far.
    pub fn len(&self) -> usize {
        self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks == 0
    }

    pub fn push(&mut self, chunk: &CompletionChunk) {
        self.chunks += 1;

        if self.id.is_none() {
            self.id = Some(chunk.id.clone());
            self.created = chunk.created;
            self.model.clone_from(&chunk.model);
        }
        if chunk.system_fingerprint.is_some() {
            self.system_fingerprint.clone_from(&chunk.system_fingerprint);
        }
        if chunk.usage.is_some() {
            self.usage.clone_from(&chunk.usage);
        }

        for choice in &chunk.choices {
            let builder = self.choices.entry(choice.index).or_default();
            let delta = &choice.delta;

            if let Some(role) = &delta.role {
                builder.role = Some(role.clone());
            }
            if let Some(text) = &delta.content {
                builder.content.get_or_insert_default().push_str(text);
            }
            if let Some(text) = &delta.refusal {
                builder.refusal.get_or_insert_default().push_str(text);
            }
            if let Some(reason) = &choice.finish_reason {
                builder.finish_reason = Some(reason.clone());
            }

            for call in delta.tool_calls.iter().flatten() {
                let tool = builder.tools.entry(call.index).or_default();
                if tool.id.is_none() {
                    tool.id.clone_from(&call.id);
                }
                if tool.call_type.is_none() {
                    tool.call_type.clone_from(&call.call_type);
                }
                if let Some(function) = &call.function {
                    if tool.name.is_none() {
                        tool.name.clone_from(&function.name);
                    }
                    if let Some(arguments) = &function.arguments {
                        tool.argument_parts.push(arguments.clone());
                    }
                }
            }
        }
    }

    /// Build the completion seen so far.
    pub fn finish(self) -> Completion {
        let choices = self
            .choices
            .into_iter()
            .map(|(index, builder)| {
                let tool_calls: Vec<ToolCall> = builder
                    .tools
                    .into_values()
                    .filter_map(|tool| {
                        let call = tool.finish();
                        if call.is_none() {
                            tracing::warn!(index, "Dropping streamed tool call without a name");
                        }
                        call
                    })
                    .collect();

                Choice {
                    index,
                    message: ResponseMessage {
                        role: builder.role.unwrap_or_else(|| "assistant".to_string()),
                        content: builder.content,
                        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                        refusal: builder.refusal,
                    },
                    finish_reason: builder.finish_reason,
                }
            })
            .collect();

        Completion {
            id: self.id.unwrap_or_default(),
            object: "chat.completion".to_string(),
            created: self.created,
            model: self.model,
            choices,
            usage: self.usage,
            system_fingerprint: self.system_fingerprint,
        }
    }
}
