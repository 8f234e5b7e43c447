//! Interface of the remote persistence service.
//!
//! Every call answers with an [`Envelope`]: `{success: true, data}` or
//! `{success: false, error, details?}`. An `Err` from a call means the
//! request itself failed (transport), as opposed to being rejected.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::fields::EntityKind;

/// One per-field validation complaint from the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationDetail {
    #[serde(default, alias = "path", skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl fmt::Display for ValidationDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Success/error wrapper around every service answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ValidationDetail>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Envelope { success: true, data: Some(data), error: None, details: Vec::new() }
    }

    /// A success without a body (e.g. delete).
    pub fn done() -> Self {
        Envelope { success: true, data: None, error: None, details: Vec::new() }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Envelope { success: false, data: None, error: Some(error.into()), details: Vec::new() }
    }

    pub fn invalid(error: impl Into<String>, details: Vec<ValidationDetail>) -> Self {
        Envelope { success: false, data: None, error: Some(error.into()), details }
    }

    /// Turn a rejection into [`Error::Remote`]; a success yields its data.
    pub fn into_result(self) -> Result<Option<T>> {
        if self.success {
            Ok(self.data)
        } else {
            Err(Error::Remote {
                message: self.error.unwrap_or_else(|| "request rejected".to_string()),
                details: self.details,
            })
        }
    }
}

/// Full dataset for the signed-in user, as raw records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    #[serde(default)]
    pub projects: Vec<Value>,
    #[serde(default)]
    pub boards: Vec<Value>,
    #[serde(default)]
    pub tasks: Vec<Value>,
}

/// The remote persistence service.
///
/// Payloads and returned records are loosely shaped JSON; the cache runs
/// everything it receives through [`crate::normalize`].
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn fetch_all_user_data(&self) -> Result<Envelope<UserData>>;

    async fn create(&self, kind: EntityKind, payload: Value) -> Result<Envelope<Value>>;

    async fn update(&self, kind: EntityKind, id: &str, patch: Value) -> Result<Envelope<Value>>;

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<Envelope<Value>>;
}
