use super::role::Role;
use super::tool::ToolCallRequest;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Binary input attached to a user turn, such as an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub mime_type: String,
    #[serde(serialize_with = "to_base64", deserialize_with = "from_base64")]
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new<S: Into<String>>(mime_type: S, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// The payload as standard base64, which is what every vendor expects inline
    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

fn to_base64<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub role: Role,
    pub created: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: None,
            tool_calls: None,
            tool_call_id: None,
            tool_name: None,
            attachments: Vec::new(),
        }
    }

    /// Create a new system message with the current timestamp
    pub fn system() -> Self {
        Self::new(Role::System)
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::new(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Create a tool message answering the request with the given id
    pub fn tool_result<I: Into<String>, N: Into<String>>(tool_call_id: I, tool_name: N) -> Self {
        let mut message = Self::new(Role::Tool);
        message.tool_call_id = Some(tool_call_id.into());
        message.tool_name = Some(tool_name.into());
        message
    }

    /// Set the text content of the message
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.content = Some(text.into());
        self
    }

    /// Set the text content only when there is some
    pub fn with_optional_text(mut self, text: Option<String>) -> Self {
        self.content = text;
        self
    }

    /// Append a tool call request to the message
    pub fn with_tool_call(mut self, request: ToolCallRequest) -> Self {
        self.tool_calls.get_or_insert_with(Vec::new).push(request);
        self
    }

    /// Append several tool call requests, preserving their order
    pub fn with_tool_calls(mut self, requests: Vec<ToolCallRequest>) -> Self {
        if !requests.is_empty() {
            self.tool_calls.get_or_insert_with(Vec::new).extend(requests);
        }
        self
    }

    /// Attach binary data to the message
    pub fn with_attachment<S: Into<String>>(mut self, mime_type: S, data: Vec<u8>) -> Self {
        self.attachments.push(Attachment::new(mime_type, data));
        self
    }

    /// The text content, treating an empty string like no content at all
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|text| !text.is_empty())
    }

    /// The tool calls carried by this message, empty when there are none
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        self.tool_calls.as_deref().unwrap_or_default()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    /// True when the message carries neither text, tool calls nor attachments
    pub fn is_empty(&self) -> bool {
        self.text().is_none() && !self.has_tool_calls() && self.attachments.is_empty()
    }
}
