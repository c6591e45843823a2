use serde::{Deserialize, Serialize};

/// Payload accepted by the reminder function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRequest {
    pub email: String,
    pub todo_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_date: Option<String>,
}

/// `{ statusCode, body }` as returned by a direct function invocation. `body`
/// is usually a JSON document encoded as a string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionEnvelope {
    pub status_code: u16,
    #[serde(default)]
    pub body: serde_json::Value,
}

/// Either `{ message, messageId }` or `{ error, message }`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderReply {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
