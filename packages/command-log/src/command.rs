//! The command envelope appended to the log for every write.
//!
//! ```text
//! {"command": "PUT", "id": "urn:…", "owner": "user-1", "payload": {…}}
//! {"command": "DELETE", "id": "urn:…", "owner": "user-1", "payload": null}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PublishError;

/// The write operation carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    #[serde(rename = "PUT")]
    Put,
    #[serde(rename = "DELETE")]
    Delete,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Put => "PUT",
            Command::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PUT" => Ok(Command::Put),
            "DELETE" => Ok(Command::Delete),
            other => Err(format!("unknown command `{other}`")),
        }
    }
}

/// A PUT or DELETE wrapper around an entity.
///
/// Build envelopes through [`CommandEnvelope::new`] so the owner, id and payload
/// invariants are checked before anything reaches the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope<T> {
    pub command: Command,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub payload: Option<T>,
}

impl<T> CommandEnvelope<T> {
    /// Build an envelope for `kind`.
    ///
    /// `owner_required` is true for owner-scoped kinds; a missing or blank owner
    /// is then a construction error. PUT requires a payload, DELETE drops any
    /// payload it was given.
    pub fn new(
        kind: &str,
        command: Command,
        id: impl Into<String>,
        owner: Option<String>,
        payload: Option<T>,
        owner_required: bool,
    ) -> Result<Self, PublishError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(PublishError::MissingId {
                kind: kind.to_string(),
            });
        }

        let owner = owner.filter(|o| !o.trim().is_empty());
        if owner_required && owner.is_none() {
            return Err(PublishError::MissingOwner {
                kind: kind.to_string(),
                id,
            });
        }

        let payload = match command {
            Command::Put => Some(payload.ok_or_else(|| PublishError::MissingPayload {
                kind: kind.to_string(),
                id: id.clone(),
            })?),
            Command::Delete => None,
        };

        Ok(Self {
            command,
            id,
            owner,
            payload,
        })
    }
}

impl<T: Serialize> CommandEnvelope<T> {
    /// JSON encoding used as the log message value.
    pub fn encode(&self) -> Result<Vec<u8>, PublishError> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl CommandEnvelope<serde_json::Value> {
    /// Decode a raw log value without committing to a payload type.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
