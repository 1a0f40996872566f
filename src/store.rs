//! The task list store: sole owner of the task list, the active filter and the
//! theme preference.
//!
//! State is loaded once with [`TaskListStore::hydrate`]. Every mutation that
//! changes something flushes the affected key right away; operations that turn
//! out to be no-ops (blank text, unknown id, nothing to clear) leave both the
//! state and the storage untouched.

use jiff::Timestamp;
use tracing::{debug, info, warn};

use crate::{
    models::{
        filter::Filter,
        task::{Task, TaskId, normalize_text},
        theme::Theme,
    },
    storage::{
        DARK_MODE_KEY, FILTER_KEY, KeyValueStore, StorageError, TODOS_KEY,
        codec::{
            decode_dark_mode, decode_filter, decode_tasks, encode_dark_mode, encode_filter,
            encode_tasks,
        },
    },
};

/// Aggregate counts over the whole task list, independent of the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskCounts {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
}

impl TaskCounts {
    pub fn of(tasks: &[Task]) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|t| t.completed).count();
        Self {
            total,
            completed,
            pending: total - completed,
        }
    }
}

/// What the presentation layer renders: the tasks passing `filter`, in list
/// order, and the counts over the full list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedView<'a> {
    pub filter: Filter,
    pub tasks: Vec<&'a Task>,
    pub counts: TaskCounts,
}

pub struct TaskListStore<S: KeyValueStore> {
    storage: S,
    tasks: Vec<Task>,
    filter: Filter,
    theme: Theme,
}

impl<S: KeyValueStore> TaskListStore<S> {
    /// Loads persisted state. Never fails: anything missing or unreadable is
    /// replaced by its default and logged.
    pub fn hydrate(storage: S) -> Self {
        let tasks = hydrate_tasks(&storage);
        let theme = hydrate_key(&storage, DARK_MODE_KEY, decode_dark_mode)
            .map(Theme::from_dark_mode)
            .unwrap_or_default();
        let filter = hydrate_key(&storage, FILTER_KEY, decode_filter).unwrap_or_default();

        debug!(tasks = tasks.len(), ?theme, %filter, "Hydrated store");

        Self {
            storage,
            tasks,
            filter,
            theme,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    #[cfg(test)]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Creates a task from `text` and puts it at the head of the list.
    /// Returns `None` without touching anything when `text` is blank.
    pub fn add(&mut self, text: &str) -> Result<Option<Task>, StorageError> {
        let Some(text) = normalize_text(text) else {
            debug!("Ignoring add with blank text");
            return Ok(None);
        };

        let task = Task::new(self.fresh_id(), text, Timestamp::now());
        self.tasks.insert(0, task.clone());
        info!(id = %task.id, "Added task");

        self.flush_tasks()?;
        Ok(Some(task))
    }

    /// Flips the completion flag. Returns the updated task, or `None` if no
    /// task has `id`.
    pub fn toggle(&mut self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        let Some(task) = self.tasks.iter_mut().find(|t| &t.id == id) else {
            debug!(%id, "Ignoring toggle of unknown task");
            return Ok(None);
        };

        task.completed = !task.completed;
        let updated = task.clone();
        info!(%id, completed = updated.completed, "Toggled task");

        self.flush_tasks()?;
        Ok(Some(updated))
    }

    /// Removes the task with `id`, returning it.
    pub fn remove(&mut self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        let Some(index) = self.tasks.iter().position(|t| &t.id == id) else {
            debug!(%id, "Ignoring removal of unknown task");
            return Ok(None);
        };

        let removed = self.tasks.remove(index);
        info!(%id, "Removed task");

        self.flush_tasks()?;
        Ok(Some(removed))
    }

    /// Replaces the text of a task, keeping its id, completion flag and
    /// creation time. Blank text leaves the task as it was.
    pub fn edit(&mut self, id: &TaskId, new_text: &str) -> Result<Option<Task>, StorageError> {
        let Some(text) = normalize_text(new_text) else {
            debug!(%id, "Ignoring edit with blank text");
            return Ok(None);
        };
        let Some(task) = self.tasks.iter_mut().find(|t| &t.id == id) else {
            debug!(%id, "Ignoring edit of unknown task");
            return Ok(None);
        };

        task.text = text;
        let updated = task.clone();
        info!(%id, "Edited task");

        self.flush_tasks()?;
        Ok(Some(updated))
    }

    /// Drops every completed task. Returns how many were removed.
    pub fn clear_completed(&mut self) -> Result<usize, StorageError> {
        let before = self.tasks.len();
        self.tasks.retain(Task::is_pending);
        let removed = before - self.tasks.len();

        if removed == 0 {
            return Ok(0);
        }
        info!(removed, "Cleared completed tasks");

        self.flush_tasks()?;
        Ok(removed)
    }

    /// Drops every task. Callers are expected to have asked the user first.
    pub fn clear_all(&mut self) -> Result<usize, StorageError> {
        if self.tasks.is_empty() {
            return Ok(0);
        }

        let removed = self.tasks.len();
        self.tasks.clear();
        info!(removed, "Cleared all tasks");

        self.flush_tasks()?;
        Ok(removed)
    }

    pub fn set_filter(&mut self, filter: Filter) -> Result<(), StorageError> {
        self.filter = filter;
        self.storage.write(FILTER_KEY, &encode_filter(filter)?)
    }

    /// Flips the theme and persists it on its own key. Returns the new theme.
    pub fn toggle_theme(&mut self) -> Result<Theme, StorageError> {
        self.theme = self.theme.toggled();
        self.storage
            .write(DARK_MODE_KEY, &encode_dark_mode(self.theme.is_dark())?)?;
        Ok(self.theme)
    }

    /// The view for the active filter.
    pub fn derived_view(&self) -> DerivedView<'_> {
        self.derived_view_with(self.filter)
    }

    /// The view for an arbitrary filter. The stored selection is not changed.
    pub fn derived_view_with(&self, filter: Filter) -> DerivedView<'_> {
        DerivedView {
            filter,
            tasks: self.tasks.iter().filter(|t| filter.matches(t)).collect(),
            counts: TaskCounts::of(&self.tasks),
        }
    }

    fn fresh_id(&self) -> TaskId {
        loop {
            let id = TaskId::generate();
            if self.get(&id).is_none() {
                return id;
            }
        }
    }

    fn flush_tasks(&self) -> Result<(), StorageError> {
        self.storage.write(TODOS_KEY, &encode_tasks(&self.tasks)?)
    }
}

fn hydrate_tasks(storage: &impl KeyValueStore) -> Vec<Task> {
    let raw = match storage.read(TODOS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("No stored tasks, starting with an empty list");
            return Vec::new();
        }
        Err(error) => {
            warn!(%error, "Could not read stored tasks, starting with an empty list");
            return Vec::new();
        }
    };

    match decode_tasks(&raw, Timestamp::now()) {
        Ok(decoded) => {
            if decoded.dropped > 0 {
                warn!(dropped = decoded.dropped, "Some stored tasks could not be recovered");
            }
            decoded.tasks
        }
        Err(error) => {
            warn!(%error, "Stored tasks are corrupt, starting with an empty list");
            Vec::new()
        }
    }
}

fn hydrate_key<S, T, F>(storage: &S, key: &str, decode: F) -> Option<T>
where
    S: KeyValueStore,
    F: FnOnce(&str) -> Result<T, StorageError>,
{
    let raw = match storage.read(key) {
        Ok(raw) => raw?,
        Err(error) => {
            warn!(key, %error, "Could not read stored value, using default");
            return None;
        }
    };

    match decode(&raw) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(key, %error, "Stored value is corrupt, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn empty_store() -> TaskListStore<MemoryStorage> {
        TaskListStore::hydrate(MemoryStorage::new())
    }

    fn add(store: &mut TaskListStore<MemoryStorage>, text: &str) -> TaskId {
        store.add(text).unwrap().unwrap().id
    }

    /// Storage whose writes always fail
    struct ReadOnlyStorage;

    impl KeyValueStore for ReadOnlyStorage {
        fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn write(&self, key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::SaveFailed {
                key: key.to_string(),
                path: "/read-only".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        }
    }

    /// Storage whose reads always fail
    struct UnreadableStorage;

    impl KeyValueStore for UnreadableStorage {
        fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::LoadFailed {
                key: key.to_string(),
                path: "/unreadable".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn test_add_single_task() {
        let mut store = empty_store();

        let task = store.add("Buy milk").unwrap().unwrap();

        assert_eq!(store.tasks().len(), 1);
        assert_eq!(task.text, "Buy milk");
        assert!(!task.completed);

        let view = store.derived_view();
        assert_eq!(
            view.counts,
            TaskCounts {
                total: 1,
                completed: 0,
                pending: 1
            }
        );
    }

    #[test]
    fn test_add_trims_text() {
        let mut store = empty_store();

        let task = store.add("   Walk the dog  ").unwrap().unwrap();

        assert_eq!(task.text, "Walk the dog");
    }

    #[test]
    fn test_add_prepends() {
        let mut store = empty_store();

        add(&mut store, "first");
        add(&mut store, "second");
        add(&mut store, "third");

        let texts: Vec<_> = store.tasks().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["third", "second", "first"]);
    }

    #[test]
    fn test_add_blank_is_noop() {
        let mut store = empty_store();
        add(&mut store, "A");
        let writes = store.storage().write_count();

        assert_eq!(store.add("").unwrap(), None);
        assert_eq!(store.add("   ").unwrap(), None);

        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.storage().write_count(), writes);
    }

    #[test]
    fn test_toggle_then_filter() {
        let mut store = empty_store();
        let id = add(&mut store, "Buy milk");

        let toggled = store.toggle(&id).unwrap().unwrap();
        assert!(toggled.completed);

        let counts = store.derived_view().counts;
        assert_eq!((counts.completed, counts.pending), (1, 0));

        store.set_filter(Filter::Pending).unwrap();
        assert!(store.derived_view().tasks.is_empty());

        store.set_filter(Filter::Completed).unwrap();
        let view = store.derived_view();
        assert_eq!(view.tasks.len(), 1);
        assert_eq!(view.tasks[0].id, id);
    }

    #[test]
    fn test_toggle_twice_restores() {
        let mut store = empty_store();
        let id = add(&mut store, "A");

        store.toggle(&id).unwrap();
        store.toggle(&id).unwrap();

        assert!(!store.get(&id).unwrap().completed);
    }

    #[test]
    fn test_remove() {
        let mut store = empty_store();
        let a = add(&mut store, "A");
        add(&mut store, "B");

        let removed = store.remove(&a).unwrap().unwrap();

        assert_eq!(removed.text, "A");
        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.tasks()[0].text, "B");
        assert_eq!(store.derived_view().counts.total, 1);
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let mut store = empty_store();
        add(&mut store, "A");
        let before = store.tasks().to_vec();
        let writes = store.storage().write_count();
        let missing = TaskId::from("missing");

        assert_eq!(store.toggle(&missing).unwrap(), None);
        assert_eq!(store.remove(&missing).unwrap(), None);
        assert_eq!(store.edit(&missing, "B").unwrap(), None);

        assert_eq!(store.tasks(), before.as_slice());
        assert_eq!(store.storage().write_count(), writes);
    }

    #[test]
    fn test_edit_preserves_identity() {
        let mut store = empty_store();
        let id = add(&mut store, "Draft");
        store.toggle(&id).unwrap();
        let original = store.get(&id).unwrap().clone();

        let edited = store.edit(&id, "  Final  ").unwrap().unwrap();

        assert_eq!(edited.text, "Final");
        assert_eq!(edited.id, original.id);
        assert_eq!(edited.completed, original.completed);
        assert_eq!(edited.created_at, original.created_at);
    }

    #[test]
    fn test_edit_blank_keeps_text() {
        let mut store = empty_store();
        let id = add(&mut store, "Keep");

        assert_eq!(store.edit(&id, "").unwrap(), None);
        assert_eq!(store.edit(&id, " \t").unwrap(), None);

        assert_eq!(store.get(&id).unwrap().text, "Keep");
    }

    #[test]
    fn test_clear_completed() {
        let mut store = empty_store();
        let done = add(&mut store, "done");
        let open = add(&mut store, "open");
        store.toggle(&done).unwrap();

        assert_eq!(store.clear_completed().unwrap(), 1);

        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.tasks()[0].id, open);
    }

    #[test]
    fn test_clear_completed_without_completed_is_noop() {
        let mut store = empty_store();
        add(&mut store, "open");
        let writes = store.storage().write_count();

        assert_eq!(store.clear_completed().unwrap(), 0);
        assert_eq!(store.storage().write_count(), writes);
    }

    #[test]
    fn test_clear_all() {
        let mut store = empty_store();
        assert_eq!(store.clear_all().unwrap(), 0);
        assert_eq!(store.storage().write_count(), 0);

        add(&mut store, "A");
        add(&mut store, "B");

        assert_eq!(store.clear_all().unwrap(), 2);
        assert!(store.tasks().is_empty());
        assert_eq!(store.storage().get(TODOS_KEY).as_deref(), Some("[]"));
    }

    #[test]
    fn test_mutations_flush_tasks() {
        let mut store = empty_store();
        let id = add(&mut store, "A");
        store.toggle(&id).unwrap();

        let stored = store.storage().get(TODOS_KEY).unwrap();
        let decoded = decode_tasks(&stored, Timestamp::now()).unwrap();

        assert_eq!(decoded.tasks, store.tasks());
    }

    #[test]
    fn test_hydrate_round_trip() {
        let mut store = empty_store();
        let a = add(&mut store, "A");
        add(&mut store, "B");
        store.toggle(&a).unwrap();
        let tasks = store.tasks().to_vec();

        let raw = store.storage().get(TODOS_KEY).unwrap();
        let reloaded = TaskListStore::hydrate(MemoryStorage::new().with_entry(TODOS_KEY, &raw));

        assert_eq!(reloaded.tasks(), tasks.as_slice());
    }

    #[test]
    fn test_hydrate_not_json() {
        let store = TaskListStore::hydrate(MemoryStorage::new().with_entry(TODOS_KEY, "not json"));

        assert!(store.tasks().is_empty());
    }

    #[test]
    fn test_hydrate_non_sequence() {
        let store = TaskListStore::hydrate(
            MemoryStorage::new().with_entry(TODOS_KEY, r#"{"id": "a", "text": "A"}"#),
        );

        assert!(store.tasks().is_empty());
    }

    #[test]
    fn test_hydrate_unreadable_storage() {
        let store = TaskListStore::hydrate(UnreadableStorage);

        assert!(store.tasks().is_empty());
        assert_eq!(store.theme(), Theme::Light);
        assert_eq!(store.filter(), Filter::All);
    }

    #[test]
    fn test_hydrate_defaults() {
        let store = empty_store();

        assert!(store.tasks().is_empty());
        assert_eq!(store.theme(), Theme::Light);
        assert_eq!(store.filter(), Filter::All);
    }

    #[test]
    fn test_hydrate_corrupt_theme_and_filter() {
        let storage = MemoryStorage::new()
            .with_entry(DARK_MODE_KEY, "maybe")
            .with_entry(FILTER_KEY, r#""someday""#);
        let store = TaskListStore::hydrate(storage);

        assert_eq!(store.theme(), Theme::Light);
        assert_eq!(store.filter(), Filter::All);
    }

    #[test]
    fn test_theme_and_filter_persist_independently() {
        let mut store = empty_store();
        add(&mut store, "A");

        assert_eq!(store.toggle_theme().unwrap(), Theme::Dark);
        store.set_filter(Filter::Completed).unwrap();

        let storage = store.storage();
        assert_eq!(storage.get(DARK_MODE_KEY).as_deref(), Some("true"));
        assert_eq!(storage.get(FILTER_KEY).as_deref(), Some(r#""completed""#));

        let reloaded = TaskListStore::hydrate(
            MemoryStorage::new()
                .with_entry(DARK_MODE_KEY, &storage.get(DARK_MODE_KEY).unwrap())
                .with_entry(FILTER_KEY, &storage.get(FILTER_KEY).unwrap()),
        );
        assert_eq!(reloaded.theme(), Theme::Dark);
        assert_eq!(reloaded.filter(), Filter::Completed);
        assert!(reloaded.tasks().is_empty());
    }

    #[test]
    fn test_toggle_theme_does_not_flush_tasks() {
        let mut store = empty_store();

        store.toggle_theme().unwrap();
        store.toggle_theme().unwrap();

        assert_eq!(store.theme(), Theme::Light);
        assert_eq!(store.storage().get(TODOS_KEY), None);
        assert_eq!(store.storage().get(DARK_MODE_KEY).as_deref(), Some("false"));
    }

    #[test]
    fn test_derived_view_with_keeps_selection() {
        let mut store = empty_store();
        let a = add(&mut store, "A");
        add(&mut store, "B");
        store.toggle(&a).unwrap();

        let view = store.derived_view_with(Filter::Completed);

        assert_eq!(view.tasks.len(), 1);
        assert_eq!(store.filter(), Filter::All);
        assert_eq!(store.derived_view().tasks.len(), 2);
    }

    #[test]
    fn test_flush_failure_is_reported() {
        let mut store = TaskListStore::hydrate(ReadOnlyStorage);

        let result = store.add("A");

        assert!(matches!(result, Err(StorageError::SaveFailed { .. })));
        assert_eq!(store.tasks().len(), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(String),
        Toggle(usize),
        Remove(usize),
        Edit(usize, String),
        ClearCompleted,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            "[ a-z]{0,8}".prop_map(Op::Add),
            (0usize..16).prop_map(Op::Toggle),
            (0usize..16).prop_map(Op::Remove),
            ((0usize..16), "[ a-z]{0,8}").prop_map(|(i, text)| Op::Edit(i, text)),
            Just(Op::ClearCompleted),
        ]
    }

    fn pick(store: &TaskListStore<MemoryStorage>, i: usize) -> TaskId {
        let tasks = store.tasks();
        if tasks.is_empty() {
            TaskId::from("missing")
        } else {
            tasks[i % tasks.len()].id.clone()
        }
    }

    fn apply(store: &mut TaskListStore<MemoryStorage>, op: Op) {

        match op {
            Op::Add(text) => {
                store.add(&text).unwrap();
            }
            Op::Toggle(i) => {
                let id = pick(store, i);
                store.toggle(&id).unwrap();
            }
            Op::Remove(i) => {
                let id = pick(store, i);
                store.remove(&id).unwrap();
            }
            Op::Edit(i, text) => {
                let id = pick(store, i);
                store.edit(&id, &text).unwrap();
            }
            Op::ClearCompleted => {
                store.clear_completed().unwrap();
            }
        }
    }

    proptest! {
        #[test]
        fn prop_invariants_hold(ops in proptest::collection::vec(op_strategy(), 0..40)) {
            let mut store = empty_store();
            let mut ever_seen = HashSet::new();

            for op in ops {
                let was_add = matches!(op, Op::Add(_));
                let before: HashSet<_> = store.tasks().iter().map(|t| t.id.clone()).collect();
                apply(&mut store, op);

                if was_add {
                    for task in store.tasks() {
                        if !before.contains(&task.id) {
                            prop_assert!(ever_seen.insert(task.id.clone()), "id reused");
                        }
                    }
                }

                let ids: HashSet<_> = store.tasks().iter().map(|t| &t.id).collect();
                prop_assert_eq!(ids.len(), store.tasks().len());
                prop_assert!(store.tasks().iter().all(|t| !t.text.trim().is_empty()));

                let counts = store.derived_view().counts;
                prop_assert_eq!(counts.completed + counts.pending, counts.total);
                prop_assert_eq!(counts.total, store.tasks().len());

                let completed = store.derived_view_with(Filter::Completed).tasks;
                let pending = store.derived_view_with(Filter::Pending).tasks;
                let all = store.derived_view_with(Filter::All).tasks;
                prop_assert_eq!(all.len(), store.tasks().len());
                for task in store.tasks() {
                    let in_completed = completed.iter().any(|t| t.id == task.id);
                    let in_pending = pending.iter().any(|t| t.id == task.id);
                    prop_assert!(in_completed != in_pending);
                }
            }
        }

        #[test]
        fn prop_persisted_list_round_trips(texts in proptest::collection::vec("[a-z]{1,8}", 0..10), toggles in proptest::collection::vec(any::<bool>(), 10)) {
            let mut store = empty_store();
            for text in &texts {
                add(&mut store, text);
            }
            let ids: Vec<_> = store.tasks().iter().map(|t| t.id.clone()).collect();
            for (id, toggle) in ids.iter().zip(&toggles) {
                if *toggle {
                    store.toggle(id).unwrap();
                }
            }

            let raw = encode_tasks(store.tasks()).unwrap();
            let reloaded = TaskListStore::hydrate(MemoryStorage::new().with_entry(TODOS_KEY, &raw));

            prop_assert_eq!(reloaded.tasks(), store.tasks());
        }
    }
}
