use thiserror::Error;

use crate::{
    models::task::{Task, TaskId},
    storage::{KeyValueStore, StorageError},
    store::TaskListStore,
};

#[derive(Debug, Error)]
pub enum TaskRefError {
    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Task reference is ambiguous. Multiple tasks found: {}", .0.join(", "))]
    AmbiguousTaskRef(Vec<String>),
}

#[derive(Debug, Error)]
pub enum TaskCommandError {
    #[error(transparent)]
    Ref(#[from] TaskRefError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Finds the task a user means by `reference`.
///
/// A number is the 1-based position shown by `list` (position in the full
/// list, whatever the filter). Anything else is matched first as an id prefix,
/// then as a case-insensitive substring of the task text.
pub fn resolve_task_ref(tasks: &[Task], reference: &str) -> Result<TaskId, TaskRefError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(TaskRefError::TaskNotFound(String::new()));
    }

    if let Ok(position) = reference.parse::<usize>()
        && (1..=tasks.len()).contains(&position)
    {
        return Ok(tasks[position - 1].id.clone());
    }

    let needle = reference.to_lowercase();

    let by_id: Vec<_> = tasks
        .iter()
        .filter(|t| t.id.as_str().to_lowercase().starts_with(&needle))
        .collect();
    if !by_id.is_empty() {
        return single_match(by_id, reference);
    }

    let by_text: Vec<_> = tasks
        .iter()
        .filter(|t| t.text.to_lowercase().contains(&needle))
        .collect();
    single_match(by_text, reference)
}

fn single_match(matches: Vec<&Task>, reference: &str) -> Result<TaskId, TaskRefError> {
    match matches.as_slice() {
        [] => Err(TaskRefError::TaskNotFound(reference.to_string())),
        [task] => Ok(task.id.clone()),
        _ => Err(TaskRefError::AmbiguousTaskRef(
            matches.iter().map(|t| t.text.clone()).collect(),
        )),
    }
}

pub struct ToggleTaskParameters {
    pub reference: String,
}

pub fn toggle_task(
    store: &mut TaskListStore<impl KeyValueStore>,
    parameters: ToggleTaskParameters,
) -> Result<Task, TaskCommandError> {
    let id = resolve_task_ref(store.tasks(), &parameters.reference)?;
    store
        .toggle(&id)?
        .ok_or_else(|| TaskRefError::TaskNotFound(parameters.reference).into())
}

pub struct RemoveTaskParameters {
    pub reference: String,
}

pub fn remove_task(
    store: &mut TaskListStore<impl KeyValueStore>,
    parameters: RemoveTaskParameters,
) -> Result<Task, TaskCommandError> {
    let id = resolve_task_ref(store.tasks(), &parameters.reference)?;
    store
        .remove(&id)?
        .ok_or_else(|| TaskRefError::TaskNotFound(parameters.reference).into())
}

pub struct EditTaskParameters {
    pub reference: String,
    pub text: String,
}

/// Returns `Ok(None)` when the new text is blank and the task was left alone.
pub fn edit_task(
    store: &mut TaskListStore<impl KeyValueStore>,
    parameters: EditTaskParameters,
) -> Result<Option<Task>, TaskCommandError> {
    let id = resolve_task_ref(store.tasks(), &parameters.reference)?;
    Ok(store.edit(&id, &parameters.text)?)
}
