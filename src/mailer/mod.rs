pub mod dto;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::models::Todo;

pub use dto::ReminderRequest;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("reminder function returned {status}: {error}: {message}")]
    Rejected {
        status: u16,
        error: String,
        message: String,
    },

    #[error("invalid reply from reminder function: {0}")]
    InvalidReply(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub message: String,
    pub message_id: Option<String>,
}

impl ReminderRequest {
    pub fn for_todo(email: impl Into<String>, todo: &Todo) -> Self {
        Self {
            email: email.into(),
            todo_content: todo.content.clone(),
            due_date: todo.due_date.map(|d| d.to_rfc3339()),
            reminder_date: todo.reminder_date.map(|d| d.to_rfc3339()),
        }
    }
}

/// Client side of the reminder email function. Callers treat it as
/// best-effort: errors are reported, never retried here.
#[async_trait]
pub trait ReminderDispatcher: Send + Sync {
    async fn send_reminder(&self, request: &ReminderRequest) -> Result<DispatchReceipt, DispatchError>;
}

pub struct HttpReminderDispatcher {
    client: Client,
    endpoint: String,
}

impl HttpReminderDispatcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, DispatchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ReminderDispatcher for HttpReminderDispatcher {
    async fn send_reminder(&self, request: &ReminderRequest) -> Result<DispatchReceipt, DispatchError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!("reminder function replied {}: {}", status, body);

        parse_reply(status, &body)
    }
}

pub struct NoopReminderDispatcher;

#[async_trait]
impl ReminderDispatcher for NoopReminderDispatcher {
    async fn send_reminder(&self, request: &ReminderRequest) -> Result<DispatchReceipt, DispatchError> {
        debug!("no reminder endpoint configured, skipping email to {}", request.email);
        Ok(DispatchReceipt {
            message: "email dispatch disabled".to_string(),
            message_id: None,
        })
    }
}

/// Interprets a reply from either the function envelope (`{statusCode, body}`)
/// or a plain HTTP endpoint that answers with the inner document directly.
pub fn parse_reply(http_status: u16, body: &str) -> Result<DispatchReceipt, DispatchError> {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => {
            return if is_success(http_status) {
                Ok(DispatchReceipt {
                    message: body.trim().to_string(),
                    message_id: None,
                })
            } else {
                Err(DispatchError::Rejected {
                    status: http_status,
                    error: format!("HTTP {}", http_status),
                    message: body.trim().to_string(),
                })
            };
        }
    };

    let (status, inner) = if value.get("statusCode").is_some() {
        let envelope: dto::FunctionEnvelope = serde_json::from_value(value)
            .map_err(|e| DispatchError::InvalidReply(e.to_string()))?;
        let inner = match envelope.body {
            serde_json::Value::String(encoded) => serde_json::from_str(&encoded)
                .map_err(|e| DispatchError::InvalidReply(e.to_string()))?,
            other => other,
        };
        (envelope.status_code, inner)
    } else {
        (http_status, value)
    };

    let reply: dto::ReminderReply = if inner.is_null() {
        dto::ReminderReply::default()
    } else {
        serde_json::from_value(inner).map_err(|e| DispatchError::InvalidReply(e.to_string()))?
    };

    if is_success(status) {
        Ok(DispatchReceipt {
            message: reply.message.unwrap_or_else(|| "sent".to_string()),
            message_id: reply.message_id,
        })
    } else {
        Err(DispatchError::Rejected {
            status,
            error: reply.error.unwrap_or_else(|| format!("HTTP {}", status)),
            message: reply.message.unwrap_or_default(),
        })
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
