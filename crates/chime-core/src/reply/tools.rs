//! Declared tool set for the reply loop.
//!
//! Tool invocations arrive from the collaborator as name + argument JSON and
//! are parsed into a tagged union with strongly-typed argument records;
//! dispatch happens by exhaustive matching, never by string comparison at
//! the call sites.

use serde::Deserialize;
use serde_json::json;

use chime_types::llm::{ToolCallRequest, ToolSpec};

use std::fmt;

/// Qualitative description of an engagement factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementBand {
    Silent,
    Low,
    Medium,
    High,
}

impl EngagementBand {
    /// Band thresholds: 0 is silent, then thirds.
    pub fn from_factor(factor: f64) -> Self {
        if factor <= 0.0 {
            EngagementBand::Silent
        } else if factor <= 1.0 / 3.0 {
            EngagementBand::Low
        } else if factor <= 2.0 / 3.0 {
            EngagementBand::Medium
        } else {
            EngagementBand::High
        }
    }
}

impl fmt::Display for EngagementBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngagementBand::Silent => write!(f, "silent"),
            EngagementBand::Low => write!(f, "low"),
            EngagementBand::Medium => write!(f, "medium"),
            EngagementBand::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskArgs {
    /// The reminder text to deliver.
    pub message: String,
    /// When to deliver it (ISO 8601).
    pub date: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeEngagementFactorArgs {
    #[serde(rename = "engagementFactor")]
    pub engagement_factor: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateImageArgs {
    pub prompt: String,
}

/// A parsed tool invocation.
#[derive(Debug, Clone)]
pub enum ToolCall {
    CreateTask(CreateTaskArgs),
    ChangeEngagementFactor(ChangeEngagementFactorArgs),
    GetCurrentEngagement,
    GenerateImage(GenerateImageArgs),
}

/// Errors turning a wire-level invocation into a typed one.
#[derive(Debug, thiserror::Error)]
pub enum ToolParseError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },
}

impl ToolCall {
    /// Parse a wire-level invocation into the typed union.
    ///
    /// Arguments may arrive either as a JSON object or as a JSON-encoded
    /// string (providers differ); both are accepted.
    pub fn parse(request: &ToolCallRequest) -> Result<Self, ToolParseError> {
        let arguments = match &request.arguments {
            serde_json::Value::String(s) => {
                serde_json::from_str(s).map_err(|e| ToolParseError::InvalidArguments {
                    tool: request.name.clone(),
                    message: e.to_string(),
                })?
            }
            other => other.clone(),
        };

        let invalid = |e: serde_json::Error| ToolParseError::InvalidArguments {
            tool: request.name.clone(),
            message: e.to_string(),
        };

        match request.name.as_str() {
            "createTask" => Ok(ToolCall::CreateTask(
                serde_json::from_value(arguments).map_err(invalid)?,
            )),
            "changeEngagementFactor" => Ok(ToolCall::ChangeEngagementFactor(
                serde_json::from_value(arguments).map_err(invalid)?,
            )),
            "getCurrentEngagement" => Ok(ToolCall::GetCurrentEngagement),
            "generateImage" => Ok(ToolCall::GenerateImage(
                serde_json::from_value(arguments).map_err(invalid)?,
            )),
            other => Err(ToolParseError::UnknownTool(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::CreateTask(_) => "createTask",
            ToolCall::ChangeEngagementFactor(_) => "changeEngagementFactor",
            ToolCall::GetCurrentEngagement => "getCurrentEngagement",
            ToolCall::GenerateImage(_) => "generateImage",
        }
    }
}

/// Tool declarations handed to the completion collaborator.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "createTask".to_string(),
            description: "Schedule a message to be sent to the chat at a future date and time."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The message text to send when the task fires."
                    },
                    "date": {
                        "type": "string",
                        "description": "When to send it, ISO 8601 (e.g. 2026-08-06T15:30:00Z)."
                    },
                    "reason": {
                        "type": "string",
                        "description": "Why this task is being created."
                    }
                },
                "required": ["message", "date"]
            }),
        },
        ToolSpec {
            name: "changeEngagementFactor".to_string(),
            description: "Change how often the bot engages unprompted. 0 is silent, 1 engages \
                          whenever relevant."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "engagementFactor": {
                        "type": "number",
                        "minimum": 0.0,
                        "maximum": 1.0,
                        "description": "The new engagement factor, between 0 and 1."
                    },
                    "reason": {
                        "type": "string",
                        "description": "Why the factor is being changed."
                    }
                },
                "required": ["engagementFactor"]
            }),
        },
        ToolSpec {
            name: "getCurrentEngagement".to_string(),
            description: "Read the bot's current engagement factor and its qualitative level."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {}
            }),
        },
        ToolSpec {
            name: "generateImage".to_string(),
            description: "Generate an image from a prompt and send it to the linked chat."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "Description of the image to generate."
                    }
                },
                "required": ["prompt"]
            }),
        },
    ]
}
