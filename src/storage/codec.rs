//! JSON encoding of the values kept under each storage key.

use std::collections::HashSet;

use jiff::Timestamp;
use serde_json::Value;
use tracing::warn;

use crate::{
    models::{
        filter::Filter,
        task::{Task, normalize_text},
    },
    storage::{DARK_MODE_KEY, FILTER_KEY, StorageError, TODOS_KEY},
};

/// Result of decoding a stored task list. Elements that could not be
/// salvaged are counted in `dropped`.
#[derive(Debug, Default)]
pub struct DecodedTasks {
    pub tasks: Vec<Task>,
    pub dropped: usize,
}

pub fn encode_tasks(tasks: &[Task]) -> Result<String, StorageError> {
    serde_json::to_string(tasks).map_err(|source| StorageError::SerializeFailed {
        key: TODOS_KEY.to_string(),
        source,
    })
}

/// Decodes a stored task list.
///
/// The value must be a JSON array, otherwise the whole list is rejected.
/// Inside the array every element is checked on its own: elements that are
/// not task objects, have blank text or repeat an earlier id are dropped.
/// Elements without a `createdAt` get `now`.
pub fn decode_tasks(raw: &str, now: Timestamp) -> Result<DecodedTasks, StorageError> {
    let value: Value = serde_json::from_str(raw).map_err(|source| StorageError::ParseFailed {
        key: TODOS_KEY.to_string(),
        source,
    })?;

    let Value::Array(items) = value else {
        return Err(StorageError::UnexpectedShape {
            key: TODOS_KEY.to_string(),
            expected: "an array of tasks",
        });
    };

    let mut decoded = DecodedTasks {
        tasks: Vec::with_capacity(items.len()),
        dropped: 0,
    };
    let mut seen_ids = HashSet::with_capacity(items.len());

    for (index, mut item) in items.into_iter().enumerate() {
        if let Some(object) = item.as_object_mut()
            && object.get("createdAt").is_none_or(Value::is_null)
        {
            object.insert("createdAt".to_string(), Value::String(now.to_string()));
        }

        let mut task = match serde_json::from_value::<Task>(item) {
            Ok(task) => task,
            Err(error) => {
                warn!(index, %error, "Dropping malformed stored task");
                decoded.dropped += 1;
                continue;
            }
        };

        let Some(text) = normalize_text(&task.text) else {
            warn!(index, id = %task.id, "Dropping stored task with empty text");
            decoded.dropped += 1;
            continue;
        };
        task.text = text;

        if !seen_ids.insert(task.id.clone()) {
            warn!(index, id = %task.id, "Dropping stored task with duplicate id");
            decoded.dropped += 1;
            continue;
        }

        decoded.tasks.push(task);
    }

    Ok(decoded)
}

pub fn encode_dark_mode(dark_mode: bool) -> Result<String, StorageError> {
    serde_json::to_string(&dark_mode).map_err(|source| StorageError::SerializeFailed {
        key: DARK_MODE_KEY.to_string(),
        source,
    })
}

pub fn decode_dark_mode(raw: &str) -> Result<bool, StorageError> {
    serde_json::from_str(raw).map_err(|source| StorageError::ParseFailed {
        key: DARK_MODE_KEY.to_string(),
        source,
    })
}

pub fn encode_filter(filter: Filter) -> Result<String, StorageError> {
    serde_json::to_string(&filter).map_err(|source| StorageError::SerializeFailed {
        key: FILTER_KEY.to_string(),
        source,
    })
}

pub fn decode_filter(raw: &str) -> Result<Filter, StorageError> {
    serde_json::from_str(raw).map_err(|source| StorageError::ParseFailed {
        key: FILTER_KEY.to_string(),
        source,
    })
}
