use crate::error::{DevpipeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scalar value carried in a record's `additional_data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// One captured log event, stored as a single JSON line in the capture log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<BTreeMap<String, Scalar>>,
    /// Originating file name for records ingested from a tailed file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Stamped by the capture engine at write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_timestamp: Option<String>,
}

impl LogRecord {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            url: String::new(),
            timestamp: String::new(),
            user_agent: String::new(),
            stack_trace: None,
            additional_data: None,
            source: None,
            server_timestamp: None,
        }
    }

    /// Parse an ingestion payload.
    ///
    /// `level` and `message` are required; any caller-supplied
    /// `server_timestamp` is discarded.
    pub fn from_json(payload: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(payload)
            .map_err(|e| DevpipeError::InvalidRecord(format!("Malformed JSON: {}", e)))?;

        let object = value.as_object().ok_or_else(|| {
            DevpipeError::InvalidRecord("Log payload must be a JSON object".to_string())
        })?;

        for field in ["level", "message"] {
            if !object.contains_key(field) {
                return Err(DevpipeError::MissingField(field.to_string()));
            }
        }

        let mut record: LogRecord = serde_json::from_value(value)
            .map_err(|e| DevpipeError::InvalidRecord(e.to_string()))?;
        record.server_timestamp = None;
        Ok(record)
    }

    /// Parse a stored capture-log line; `None` for malformed lines
    pub fn from_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }

    /// Serialise as one self-contained line (no trailing newline)
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| DevpipeError::InvalidRecord(e.to_string()))
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}
