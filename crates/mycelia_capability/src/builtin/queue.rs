//! In-memory message queue with per-group consumer offsets.
//!
//! `produce` writes `kafka/topic/<topic>`. `consume` reads the topic and the
//! consumer group at `kafka/group/<group>`; both records must authorize.

use super::check_segment;
use crate::capability::Capability;
use crate::gate::Caller;
use crate::modifier::{Modifier, ModifierSet, Next};
use async_trait::async_trait;
use mycelia_core::{ActionRecord, GateError, GateResult};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Capability code
pub const CODE: &str = "tech.mycelia.queue";

/// Batch size used when a consume request names none
pub const DEFAULT_BATCH: usize = 100;

fn default_batch() -> usize {
    DEFAULT_BATCH
}

/// Queue operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum QueueRequest {
    /// Append messages to a topic
    Produce {
        /// Topic name
        topic: String,
        /// Message payloads
        messages: Vec<Value>,
    },
    /// Read the next batch for a consumer group and advance its offset
    Consume {
        /// Topic name
        topic: String,
        /// Consumer group
        group: String,
        /// Maximum number of messages returned
        #[serde(default = "default_batch")]
        max: usize,
    },
}

/// A message read back from a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Position in the topic
    pub offset: u64,
    /// Payload
    pub value: Value,
}

/// Queue operation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueueResponse {
    /// `produce`
    #[serde(rename_all = "camelCase")]
    Produced {
        /// Offset of the first appended message
        first_offset: u64,
        /// Messages appended
        count: usize,
    },
    /// `consume`
    Consumed {
        /// Messages in offset order
        messages: Vec<QueueMessage>,
    },
}

#[derive(Debug, Default)]
struct State {
    topics: HashMap<String, Vec<Value>>,
    offsets: HashMap<(String, String), usize>,
}

/// In-memory queue
#[derive(Debug, Default)]
pub struct Queue {
    state: Mutex<State>,
}

impl Queue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Capability for Queue {
    type Request = QueueRequest;
    type Response = QueueResponse;

    fn code(&self) -> &str {
        CODE
    }

    fn description(&self) -> &str {
        "Produce to and consume from in-memory topics"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["action", "topic"],
            "properties": {
                "action": { "enum": ["produce", "consume"] },
                "topic": { "type": "string" },
                "messages": { "type": "array" },
                "group": { "type": "string" },
                "max": { "type": "integer", "minimum": 1 }
            }
        })
    }

    fn check(&self, request: &QueueRequest) -> Result<(), String> {
        match request {
            QueueRequest::Produce { topic, messages } => {
                check_segment("topic", topic)?;
                if messages.is_empty() {
                    return Err("messages must not be empty".to_string());
                }
                Ok(())
            }
            QueueRequest::Consume { topic, group, max } => {
                check_segment("topic", topic)?;
                check_segment("group", group)?;
                if *max == 0 {
                    return Err("max must be positive".to_string());
                }
                Ok(())
            }
        }
    }

    fn extract_actions(&self, request: &QueueRequest) -> Vec<ActionRecord> {
        match request {
            QueueRequest::Produce { topic, .. } => {
                vec![ActionRecord::at(["kafka", "topic", topic.as_str()]).with_action("write")]
            }
            QueueRequest::Consume { topic, group, .. } => vec![
                ActionRecord::at(["kafka", "topic", topic.as_str()]).with_action("read"),
                ActionRecord::at(["kafka", "group", group.as_str()]).with_action("read"),
            ],
        }
    }

    async fn execute(&self, request: QueueRequest, _caller: &Caller) -> GateResult<QueueResponse> {
        let mut state = self.state.lock().await;
        match request {
            QueueRequest::Produce { topic, messages } => {
                let log = state.topics.entry(topic).or_default();
                let first_offset = log.len() as u64;
                let count = messages.len();
                log.extend(messages);
                Ok(QueueResponse::Produced {
                    first_offset,
                    count,
                })
            }
            QueueRequest::Consume { topic, group, max } => {
                let State { topics, offsets } = &mut *state;
                let log = topics.get(&topic).map_or(&[][..], Vec::as_slice);
                let offset = offsets.entry((topic, group)).or_default();
                let start = (*offset).min(log.len());
                let messages: Vec<_> = log[start..]
                    .iter()
                    .take(max)
                    .enumerate()
                    .map(|(i, value)| QueueMessage {
                        offset: (start + i) as u64,
                        value: value.clone(),
                    })
                    .collect();
                *offset = start + messages.len();
                Ok(QueueResponse::Consumed { messages })
            }
        }
    }

    fn modifiers(&self) -> ModifierSet<Self> {
        ModifierSet::new().with("limit", BatchLimit)
    }
}

/// Argument of the `limit` modifier
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitArg {
    /// Largest batch the caller may produce or consume at once
    pub max: usize,
}

/// Caps batch sizes: consumes are shortened, oversized produces refused.
pub struct BatchLimit;

#[async_trait]
impl Modifier<Queue> for BatchLimit {
    type Arg = LimitArg;

    fn validate(&self, arg: &LimitArg) -> Result<(), String> {
        if arg.max == 0 {
            return Err("max must be positive".to_string());
        }
        Ok(())
    }

    async fn apply(
        &self,
        arg: &LimitArg,
        mut request: QueueRequest,
        caller: &Caller,
        next: Next<'_, Queue>,
    ) -> GateResult<QueueResponse> {
        match &mut request {
            QueueRequest::Produce { messages, .. } => {
                if messages.len() > arg.max {
                    return Err(GateError::denied(CODE));
                }
            }
            QueueRequest::Consume { max, .. } => *max = (*max).min(arg.max),
        }
        next.run(request, caller).await
    }
}
