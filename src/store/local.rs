//! JSON-file backend used when no account is configured.
//!
//! The whole data set lives in memory as one map of owner to [`Shelf`] and is
//! written back to disk after every committed write.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::Backend;
use super::models::{Idea, Subtask, Tag, Task, UserProfile};
use crate::error::{Error, Result};

/// Everything stored for one owner.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Shelf {
    #[serde(default)]
    profile: Option<UserProfile>,
    #[serde(default)]
    ideas: Vec<Idea>,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    tags: Vec<Tag>,
}

type Shelves = BTreeMap<String, Shelf>;

#[derive(Debug, Default)]
struct State {
    shelves: Shelves,
    /// One snapshot per open `begin`.
    snapshots: Vec<Shelves>,
}

pub struct LocalStore {
    path: Option<PathBuf>,
    state: Mutex<State>,
}

impl LocalStore {
    /// Load from `path`, starting empty if the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let shelves = if path.exists() {
            let raw = fs::read_to_string(path)?;
            serde_json::from_str(&raw)?
        } else {
            Shelves::new()
        };
        tracing::debug!("opened local store at {}", path.display());
        Ok(LocalStore {
            path: Some(path.to_path_buf()),
            state: Mutex::new(State {
                shelves,
                snapshots: Vec::new(),
            }),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        LocalStore {
            path: None,
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Backend("local store lock poisoned".into()))
    }

    /// Temp file + rename.
    fn save(&self, shelves: &Shelves) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let mut f = File::create(&tmp)?;
        let data = serde_json::to_string_pretty(shelves)?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    fn read<R>(&self, owner: &str, f: impl FnOnce(&Shelf) -> R) -> Result<R> {
        let state = self.lock()?;
        let empty = Shelf::default();
        Ok(f(state.shelves.get(owner).unwrap_or(&empty)))
    }

    /// Apply `f` to the owner's shelf; persists unless a transaction is open.
    /// A failed save puts the previous state back.
    fn write<R>(&self, owner: &str, f: impl FnOnce(&mut Shelf) -> R) -> Result<R> {
        let mut state = self.lock()?;
        if !state.snapshots.is_empty() {
            return Ok(f(state.shelves.entry(owner.to_string()).or_default()));
        }
        let before = state.shelves.clone();
        let out = f(state.shelves.entry(owner.to_string()).or_default());
        if let Err(e) = self.save(&state.shelves) {
            state.shelves = before;
            return Err(e);
        }
        Ok(out)
    }
}

impl Backend for LocalStore {
    fn begin(&self) -> Result<()> {
        let mut state = self.lock()?;
        let snapshot = state.shelves.clone();
        state.snapshots.push(snapshot);
        Ok(())
    }

    /// Closing the outermost level saves; if that fails the level is rolled
    /// back instead.
    fn commit(&self) -> Result<()> {
        let mut state = self.lock()?;
        match state.snapshots.len() {
            0 => Err(Error::Backend("commit without begin".into())),
            1 => {
                let saved = self.save(&state.shelves);
                let snapshot = state.snapshots.pop();
                if let (Err(_), Some(snapshot)) = (&saved, snapshot) {
                    state.shelves = snapshot;
                }
                saved
            }
            _ => {
                state.snapshots.pop();
                Ok(())
            }
        }
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.lock()?;
        match state.snapshots.pop() {
            Some(snapshot) => {
                state.shelves = snapshot;
                Ok(())
            }
            None => Err(Error::Backend("rollback without begin".into())),
        }
    }

    fn get_profile(&self, owner: &str) -> Result<Option<UserProfile>> {
        self.read(owner, |shelf| shelf.profile.clone())
    }

    fn insert_profile(&self, profile: &UserProfile) -> Result<()> {
        self.write(&profile.user_id, |shelf| {
            shelf.profile = Some(profile.clone());
        })
    }

    fn list_ideas(&self, owner: &str) -> Result<Vec<Idea>> {
        self.read(owner, |shelf| shelf.ideas.clone())
    }

    fn get_idea(&self, owner: &str, id: &str) -> Result<Option<Idea>> {
        self.read(owner, |shelf| shelf.ideas.iter().find(|i| i.id == id).cloned())
    }

    fn insert_idea(&self, owner: &str, idea: &Idea) -> Result<()> {
        self.write(owner, |shelf| shelf.ideas.insert(0, idea.clone()))
    }

    fn update_idea(&self, owner: &str, idea: &Idea) -> Result<bool> {
        self.write(owner, |shelf| {
            match shelf.ideas.iter_mut().find(|i| i.id == idea.id) {
                Some(slot) => {
                    *slot = idea.clone();
                    true
                }
                None => false,
            }
        })
    }

    fn delete_idea(&self, owner: &str, id: &str) -> Result<bool> {
        self.write(owner, |shelf| {
            let before = shelf.ideas.len();
            shelf.ideas.retain(|i| i.id != id);
            shelf.ideas.len() != before
        })
    }

    fn list_tasks(&self, owner: &str) -> Result<Vec<Task>> {
        self.read(owner, |shelf| shelf.tasks.clone())
    }

    fn get_task(&self, owner: &str, id: &str) -> Result<Option<Task>> {
        self.read(owner, |shelf| shelf.tasks.iter().find(|t| t.id == id).cloned())
    }

    fn task_ids_for_idea(&self, owner: &str, idea_id: &str) -> Result<Vec<String>> {
        self.read(owner, |shelf| {
            // Stored newest first; report in creation order like the sqlite backend.
            shelf
                .tasks
                .iter()
                .rev()
                .filter(|t| t.idea_id == idea_id)
                .map(|t| t.id.clone())
                .collect()
        })
    }

    fn insert_task(&self, owner: &str, task: &Task) -> Result<()> {
        self.write(owner, |shelf| shelf.tasks.insert(0, task.clone()))
    }

    fn update_task(&self, owner: &str, task: &Task) -> Result<bool> {
        self.write(owner, |shelf| {
            match shelf.tasks.iter_mut().find(|t| t.id == task.id) {
                Some(slot) => {
                    let subtasks = std::mem::take(&mut slot.subtasks);
                    *slot = task.clone();
                    slot.subtasks = subtasks;
                    true
                }
                None => false,
            }
        })
    }

    fn delete_task(&self, owner: &str, id: &str) -> Result<bool> {
        self.write(owner, |shelf| {
            let before = shelf.tasks.len();
            shelf.tasks.retain(|t| t.id != id);
            shelf.tasks.len() != before
        })
    }

    fn get_subtask(&self, owner: &str, task_id: &str, id: &str) -> Result<Option<Subtask>> {
        self.read(owner, |shelf| {
            shelf
                .tasks
                .iter()
                .find(|t| t.id == task_id)
                .and_then(|t| t.subtasks.iter().find(|s| s.id == id).cloned())
        })
    }

    fn insert_subtask(&self, owner: &str, task_id: &str, subtask: &Subtask) -> Result<bool> {
        self.write(owner, |shelf| {
            match shelf.tasks.iter_mut().find(|t| t.id == task_id) {
                Some(task) => {
                    task.subtasks.push(subtask.clone());
                    true
                }
                None => false,
            }
        })
    }

    fn update_subtask(&self, owner: &str, task_id: &str, subtask: &Subtask) -> Result<bool> {
        self.write(owner, |shelf| {
            let slot = shelf
                .tasks
                .iter_mut()
                .find(|t| t.id == task_id)
                .and_then(|t| t.subtasks.iter_mut().find(|s| s.id == subtask.id));
            match slot {
                Some(slot) => {
                    *slot = subtask.clone();
                    true
                }
                None => false,
            }
        })
    }

    fn delete_subtask(&self, owner: &str, task_id: &str, id: &str) -> Result<bool> {
        self.write(owner, |shelf| {
            match shelf.tasks.iter_mut().find(|t| t.id == task_id) {
                Some(task) => {
                    let before = task.subtasks.len();
                    task.subtasks.retain(|s| s.id != id);
                    task.subtasks.len() != before
                }
                None => false,
            }
        })
    }

    fn delete_subtasks_for_task(&self, owner: &str, task_id: &str) -> Result<usize> {
        self.write(owner, |shelf| {
            shelf
                .tasks
                .iter_mut()
                .find(|t| t.id == task_id)
                .map_or(0, |t| std::mem::take(&mut t.subtasks).len())
        })
    }

    fn list_tags(&self, owner: &str) -> Result<Vec<Tag>> {
        self.read(owner, |shelf| {
            let mut tags = shelf.tags.clone();
            tags.sort_by(|a, b| a.name.cmp(&b.name));
            tags
        })
    }

    fn get_tag(&self, owner: &str, id: &str) -> Result<Option<Tag>> {
        self.read(owner, |shelf| shelf.tags.iter().find(|t| t.id == id).cloned())
    }

    fn insert_tag(&self, owner: &str, tag: &Tag) -> Result<()> {
        self.write(owner, |shelf| shelf.tags.push(tag.clone()))
    }

    fn delete_tag(&self, owner: &str, id: &str) -> Result<bool> {
        self.write(owner, |shelf| {
            let before = shelf.tags.len();
            shelf.tags.retain(|t| t.id != id);
            shelf.tags.len() != before
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::quadrant::Score;
    use crate::store::{IdeaStatus, Priority, TagSet};

    fn idea(id: &str) -> Idea {
        let now = Utc::now();
        Idea::new(
            id.into(),
            format!("idea {id}"),
            None,
            TagSet::new(),
            Score::DEFAULT,
            Score::DEFAULT,
            IdeaStatus::Active,
            now,
            now,
        )
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");

        let store = LocalStore::open(&path).unwrap();
        store.insert_idea("local", &idea("a")).unwrap();
        store.insert_idea("local", &idea("b")).unwrap();
        drop(store);

        let reopened = LocalStore::open(&path).unwrap();
        let ideas = reopened.list_ideas("local").unwrap();
        assert_eq!(ideas.len(), 2);
        assert_eq!(ideas[0].id, "b");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_rollback_restores_snapshot_and_skips_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        let store = LocalStore::open(&path).unwrap();

        store.begin().unwrap();
        store.insert_idea("local", &idea("a")).unwrap();
        assert!(!path.exists());
        store.rollback().unwrap();

        assert!(store.list_ideas("local").unwrap().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_nested_commit_saves_once_outermost_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        let store = LocalStore::open(&path).unwrap();

        store.begin().unwrap();
        store.begin().unwrap();
        store.insert_idea("local", &idea("a")).unwrap();
        store.commit().unwrap();
        assert!(!path.exists());
        store.commit().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_update_task_keeps_subtasks() {
        let store = LocalStore::in_memory();
        let mut task = Task::new("t".into(), "i".into(), "x".into(), Priority::Low, Utc::now());
        task.subtasks.push(Subtask {
            id: "s".into(),
            title: "step".into(),
            completed: false,
            created_at: Utc::now(),
        });
        store.insert_task("local", &task).unwrap();

        let mut edited = task.clone();
        edited.subtasks.clear();
        edited.title = "renamed".into();
        assert!(store.update_task("local", &edited).unwrap());

        let stored = store.get_task("local", "t").unwrap().unwrap();
        assert_eq!(stored.title, "renamed");
        assert_eq!(stored.subtasks.len(), 1);
    }

    /// A path whose parent is a regular file, so every save fails.
    fn unwritable_path(dir: &Path) -> PathBuf {
        let blocker = dir.join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        blocker.join("local.json")
    }

    #[test]
    fn test_failed_save_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(&unwritable_path(dir.path())).unwrap();

        let err = store.insert_idea("local", &idea("ghost")).unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert!(store.list_ideas("local").unwrap().is_empty());
        assert!(store.get_idea("local", "ghost").unwrap().is_none());
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(&unwritable_path(dir.path())).unwrap();

        let result = store.atomically(|s| {
            s.insert_idea("local", &idea("a"))?;
            s.insert_idea("local", &idea("b"))
        });
        assert!(matches!(result, Err(Error::Backend(_))));
        assert!(store.list_ideas("local").unwrap().is_empty());
        // No transaction left open.
        assert!(store.commit().is_err());
    }

    #[test]
    fn test_failing_inner_step_rolls_back_earlier_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        let store = LocalStore::open(&path).unwrap();
        store.insert_idea("local", &idea("kept")).unwrap();

        let result: Result<()> = store.atomically(|s| {
            s.insert_idea("local", &idea("a"))?;
            s.delete_idea("local", "kept")?;
            Err(Error::validation("boom"))
        });
        assert!(result.is_err());

        let ids: Vec<String> = store
            .list_ideas("local")
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["kept".to_string()]);
        let on_disk = LocalStore::open(&path).unwrap();
        assert_eq!(on_disk.list_ideas("local").unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        fs::write(&path, "{ not json").unwrap();

        let err = LocalStore::open(&path).err().unwrap();
        assert!(matches!(err, Error::Backend(_)));
    }

    #[test]
    fn test_commit_without_begin_is_an_error() {
        let store = LocalStore::in_memory();
        assert!(store.commit().is_err());
        assert!(store.rollback().is_err());
    }
}
