// Uniform response envelope for every relay action.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
    Notice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            message: None,
            data: None,
        }
    }

    pub fn success_with<T: Serialize>(data: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            data: Some(serde_json::to_value(data)?),
            ..Self::success()
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            status: Status::Notice,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }

    /// Decodes the payload, if any.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.data
            .as_ref()
            .map(|data| serde_json::from_value(data.clone()))
            .transpose()
    }
}
