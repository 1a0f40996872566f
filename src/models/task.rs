use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Deserializer, Serialize, de};
use uuid::Uuid;

/// Opaque identifier of a task. Generated ids are UUIDs, but anything read
/// back from storage is accepted as long as it is a non-empty string or an
/// integer.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Text(text) if text.trim().is_empty() => {
                Err(de::Error::custom("task id must not be empty"))
            }
            RawId::Text(text) => Ok(Self(text)),
            // Older lists used millisecond timestamps as ids
            RawId::Number(number) => Ok(Self(number.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Stable identifier, never reused within a list
    pub id: TaskId,
    /// Trimmed, never empty
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    /// When the task was created
    pub created_at: Timestamp,
}

impl Task {
    /// Builds a pending task. `text` must already be normalized with
    /// [`normalize_text`].
    pub fn new(id: TaskId, text: String, created_at: Timestamp) -> Self {
        Self {
            id,
            text,
            completed: false,
            created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.completed
    }
}

/// Trims user input, returning `None` when nothing is left.
pub fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
