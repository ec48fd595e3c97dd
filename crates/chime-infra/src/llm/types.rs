//! Wire types for the OpenAI-compatible chat completions and image APIs,
//! plus the conversions from the domain request/response shapes.

use serde::{Deserialize, Serialize};

use chime_types::llm::{
    ChatMessage, CompletionRequest, CompletionResponse, ResponseFormat, ToolCallRequest, ToolSpec,
};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ApiRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ApiResponseFormat>,
}

#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ApiFunctionCall,
}

/// Function name plus arguments. The API carries arguments as a JSON-encoded
/// string in both directions.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub struct ApiTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: ApiFunctionDef,
}

#[derive(Debug, Serialize)]
pub struct ApiFunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ApiResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ApiImageRequest {
    pub prompt: String,
    pub n: u32,
    pub size: String,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ApiChoice {
    pub message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ApiResponseMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
pub struct ApiImageResponse {
    #[serde(default)]
    pub data: Vec<ApiImageDatum>,
}

#[derive(Debug, Deserialize)]
pub struct ApiImageDatum {
    pub url: Option<String>,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn to_api_request(request: &CompletionRequest) -> ApiRequest {
    ApiRequest {
        model: request.model.clone(),
        messages: request.messages.iter().map(to_api_message).collect(),
        tools: request.tools.iter().map(to_api_tool).collect(),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        response_format: request.response_format.map(|f| match f {
            ResponseFormat::JsonObject => ApiResponseFormat {
                kind: "json_object",
            },
        }),
    }
}

fn to_api_message(message: &ChatMessage) -> ApiMessage {
    match message {
        ChatMessage::System { content } => ApiMessage {
            role: "system",
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        ChatMessage::User { content } => ApiMessage {
            role: "user",
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => ApiMessage {
            role: "assistant",
            content: content.clone(),
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls.iter().map(to_api_tool_call).collect())
            },
            tool_call_id: None,
        },
        ChatMessage::Tool { call_id, content } => ApiMessage {
            role: "tool",
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: Some(call_id.clone()),
        },
    }
}

fn to_api_tool_call(call: &ToolCallRequest) -> ApiToolCall {
    ApiToolCall {
        id: call.id.clone(),
        kind: "function".to_string(),
        function: ApiFunctionCall {
            name: call.name.clone(),
            arguments: call.arguments.to_string(),
        },
    }
}

fn to_api_tool(spec: &ToolSpec) -> ApiTool {
    ApiTool {
        kind: "function",
        function: ApiFunctionDef {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.parameters.clone(),
        },
    }
}

pub fn from_api_response(response: ApiResponse) -> CompletionResponse {
    let Some(choice) = response.choices.into_iter().next() else {
        return CompletionResponse::default();
    };

    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|call| {
            // Arguments arrive as a JSON-encoded string; malformed payloads
            // are preserved verbatim so the tool layer can report them.
            let arguments = serde_json::from_str(&call.function.arguments)
                .unwrap_or(serde_json::Value::String(call.function.arguments));
            ToolCallRequest {
                id: call.id,
                name: call.function.name,
                arguments,
            }
        })
        .collect();

    CompletionResponse {
        content: choice.message.content,
        tool_calls,
    }
}
