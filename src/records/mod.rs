//! Record manager: every create/update/delete of ideas, tasks, subtasks and
//! tags goes through here.
//!
//! The manager owns the rules the backends do not know about: quadrant
//! recomputation, completion stamps, cascades, validation, the active
//! session, and change publishing. Each write runs inside
//! [`Backend::atomically`], so a failure leaves stored state as it was.

mod bulk;

pub use bulk::BulkOutcome;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::quadrant::{Quadrant, Score};
use crate::realtime::{Change, ChangeFeed, ChangeKind, Collection};
use crate::store::{
    Backend, Idea, IdeaDraft, IdeaPatch, IdeaStatus, Subtask, SubtaskPatch, Tag, TagCategory,
    Task, TaskDraft, TaskPatch, TaskStatus, UserProfile, preset_tags,
};
use crate::validation;

/// Owner used by the local backend, which has no accounts.
pub const LOCAL_OWNER: &str = "local";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub display_name: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Session {
            user_id: user_id.into(),
            display_name: None,
        }
    }

    pub fn local() -> Self {
        Session::new(LOCAL_OWNER)
    }
}

/// Everything one owner has stored, as written by `export`.
#[derive(Debug, Serialize)]
pub struct Export {
    pub exported_at: DateTime<Utc>,
    pub ideas: Vec<Idea>,
    pub tasks: Vec<Task>,
    pub tags: Vec<Tag>,
}

pub struct RecordManager<B: Backend> {
    backend: B,
    session: Option<Session>,
    feed: ChangeFeed,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl<B: Backend> RecordManager<B> {
    pub fn new(backend: B, session: Option<Session>) -> Self {
        Self::with_feed(backend, session, ChangeFeed::new())
    }

    pub fn with_feed(backend: B, session: Option<Session>, feed: ChangeFeed) -> Self {
        RecordManager {
            backend,
            session,
            feed,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn owner(&self) -> Result<&str> {
        self.session
            .as_ref()
            .map(|s| s.user_id.as_str())
            .ok_or(Error::Unauthenticated)
    }

    fn publish(&self, owner: &str, collection: Collection, kind: ChangeKind, id: &str) {
        self.feed.publish(&Change::new(owner, collection, kind, id));
    }

    // ── Session ──

    /// Start a session, creating the profile and preset tags on first use.
    pub fn sign_in(&mut self, user_id: &str, display_name: Option<&str>) -> Result<UserProfile> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(Error::validation("User id is required"));
        }
        let display_name = validation::display_name(display_name)?;

        let (profile, created) = self.backend.atomically(|b| {
            let existing = b.get_profile(user_id)?;
            let created = existing.is_none();
            let profile = match existing {
                Some(profile) => profile,
                None => {
                    let now = Utc::now();
                    let profile = UserProfile {
                        user_id: user_id.to_string(),
                        display_name: display_name.clone(),
                        avatar_url: None,
                        preferences: serde_json::json!({}),
                        created_at: now,
                        updated_at: now,
                    };
                    b.insert_profile(&profile)?;
                    profile
                }
            };
            for tag in preset_tags() {
                if b.get_tag(user_id, &tag.id)?.is_none() {
                    b.insert_tag(user_id, &tag)?;
                }
            }
            Ok((profile, created))
        })?;

        if created {
            tracing::info!("created profile for {user_id}");
            self.publish(user_id, Collection::Profiles, ChangeKind::Insert, user_id);
        }
        self.session = Some(Session {
            user_id: user_id.to_string(),
            display_name: profile.display_name.clone().or(display_name),
        });
        Ok(profile)
    }

    pub fn sign_out(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!("signed out {}", session.user_id);
        }
    }

    pub fn profile(&self) -> Result<Option<UserProfile>> {
        let owner = self.owner()?;
        self.backend.get_profile(owner)
    }

    // ── Ideas ──

    /// Newest first.
    pub fn list_ideas(&self) -> Result<Vec<Idea>> {
        self.backend.list_ideas(self.owner()?)
    }

    pub fn get_idea(&self, id: &str) -> Result<Idea> {
        let owner = self.owner()?;
        self.backend
            .get_idea(owner, id)?
            .ok_or_else(|| Error::not_found("idea", id))
    }

    pub fn create_idea(&self, draft: &IdeaDraft) -> Result<Idea> {
        let owner = self.owner()?;
        let draft = validation::idea_draft(draft)?;
        let now = Utc::now();
        let idea = Idea::new(
            new_id(),
            draft.title,
            draft.description,
            draft.tags,
            draft.impact.unwrap_or(Score::DEFAULT),
            draft.effort.unwrap_or(Score::DEFAULT),
            IdeaStatus::Active,
            now,
            now,
        );
        self.backend
            .atomically(|b| b.insert_idea(owner, &idea))?;
        tracing::info!("created idea {} in {}", idea.id, idea.quadrant().as_str());
        self.publish(owner, Collection::Ideas, ChangeKind::Insert, &idea.id);
        Ok(idea)
    }

    pub fn update_idea(&self, id: &str, patch: &IdeaPatch) -> Result<Idea> {
        let owner = self.owner()?;
        let patch = validation::idea_patch(patch)?;
        let now = Utc::now();
        let idea = self
            .backend
            .atomically(|b| apply_idea_patch(b, owner, id, &patch, now))?;
        tracing::info!("updated idea {id}");
        self.publish(owner, Collection::Ideas, ChangeKind::Update, id);
        Ok(idea)
    }

    pub fn archive_idea(&self, id: &str) -> Result<Idea> {
        self.update_idea(id, &IdeaPatch::status(IdeaStatus::Archived))
    }

    pub fn restore_idea(&self, id: &str) -> Result<Idea> {
        self.update_idea(id, &IdeaPatch::status(IdeaStatus::Active))
    }

    pub fn move_idea(&self, id: &str, quadrant: Quadrant) -> Result<Idea> {
        self.update_idea(id, &IdeaPatch::move_to(quadrant))
    }

    /// Deletes the idea and every task that references it. Returns false if
    /// the idea did not exist.
    pub fn delete_idea(&self, id: &str) -> Result<bool> {
        let owner = self.owner()?;
        let removed = self.backend.atomically(|b| remove_idea(b, owner, id))?;
        match removed {
            Some(task_ids) => {
                tracing::info!("deleted idea {id} and {} tasks", task_ids.len());
                self.publish_idea_removal(owner, id, &task_ids);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn publish_idea_removal(&self, owner: &str, id: &str, task_ids: &[String]) {
        for task_id in task_ids {
            self.publish(owner, Collection::Tasks, ChangeKind::Delete, task_id);
        }
        self.publish(owner, Collection::Ideas, ChangeKind::Delete, id);
    }

    // ── Tasks ──

    /// Newest first, each with its subtasks.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        self.backend.list_tasks(self.owner()?)
    }

    pub fn get_task(&self, id: &str) -> Result<Task> {
        let owner = self.owner()?;
        self.backend
            .get_task(owner, id)?
            .ok_or_else(|| Error::not_found("task", id))
    }

    pub fn tasks_for_idea(&self, idea_id: &str) -> Result<Vec<Task>> {
        Ok(self
            .list_tasks()?
            .into_iter()
            .filter(|t| t.idea_id == idea_id)
            .collect())
    }

    pub fn create_task(&self, idea_id: &str, draft: &TaskDraft) -> Result<Task> {
        let owner = self.owner()?;
        let draft = validation::task_draft(draft)?;
        let task = build_task(idea_id, draft, Utc::now());
        self.backend.atomically(|b| b.insert_task(owner, &task))?;
        tracing::info!(
            "created task {} for idea {idea_id} with {} subtasks",
            task.id,
            task.subtasks.len()
        );
        self.publish(owner, Collection::Tasks, ChangeKind::Insert, &task.id);
        Ok(task)
    }

    /// `create_task` for an idea that must exist.
    pub fn convert_idea_to_task(&self, idea_id: &str, draft: &TaskDraft) -> Result<Task> {
        let idea = self.get_idea(idea_id)?;
        self.create_task(&idea.id, draft)
    }

    pub fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        let owner = self.owner()?;
        let patch = validation::task_patch(patch)?;
        let now = Utc::now();
        let task = self
            .backend
            .atomically(|b| apply_task_patch(b, owner, id, &patch, now))?;
        tracing::info!("updated task {id} ({})", task.status().as_str());
        self.publish(owner, Collection::Tasks, ChangeKind::Update, id);
        Ok(task)
    }

    pub fn set_task_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        self.update_task(id, &TaskPatch::status(status))
    }

    /// Deletes the task and its subtasks. Returns false if it did not exist.
    pub fn delete_task(&self, id: &str) -> Result<bool> {
        let owner = self.owner()?;
        let removed = self.backend.atomically(|b| remove_task(b, owner, id))?;
        if removed {
            tracing::info!("deleted task {id}");
            self.publish(owner, Collection::Tasks, ChangeKind::Delete, id);
        }
        Ok(removed)
    }

    // ── Subtasks ──

    pub fn add_subtask(&self, task_id: &str, title: &str) -> Result<Subtask> {
        let owner = self.owner()?;
        let title = validation::subtask_title(title)?;
        let subtask = Subtask {
            id: new_id(),
            title,
            completed: false,
            created_at: Utc::now(),
        };
        let added = self
            .backend
            .atomically(|b| b.insert_subtask(owner, task_id, &subtask))?;
        if !added {
            return Err(Error::not_found("task", task_id));
        }
        self.publish(owner, Collection::Subtasks, ChangeKind::Insert, &subtask.id);
        Ok(subtask)
    }

    /// Returns false, changing nothing, when the subtask is not under
    /// `task_id`.
    pub fn update_subtask(&self, task_id: &str, id: &str, patch: &SubtaskPatch) -> Result<bool> {
        let owner = self.owner()?;
        let patch = validation::subtask_patch(patch)?;
        let updated = self.backend.atomically(|b| {
            let Some(mut subtask) = b.get_subtask(owner, task_id, id)? else {
                return Ok(false);
            };
            if let Some(title) = &patch.title {
                subtask.title.clone_from(title);
            }
            if let Some(completed) = patch.completed {
                subtask.completed = completed;
            }
            b.update_subtask(owner, task_id, &subtask)
        })?;
        if updated {
            self.publish(owner, Collection::Subtasks, ChangeKind::Update, id);
        } else {
            tracing::warn!("subtask {id} not found under task {task_id}");
        }
        Ok(updated)
    }

    pub fn delete_subtask(&self, task_id: &str, id: &str) -> Result<bool> {
        let owner = self.owner()?;
        let deleted = self
            .backend
            .atomically(|b| b.delete_subtask(owner, task_id, id))?;
        if deleted {
            self.publish(owner, Collection::Subtasks, ChangeKind::Delete, id);
        } else {
            tracing::warn!("subtask {id} not found under task {task_id}");
        }
        Ok(deleted)
    }

    // ── Tags ──

    /// Ordered by name.
    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        self.backend.list_tags(self.owner()?)
    }

    pub fn create_tag(&self, name: &str, color: &str) -> Result<Tag> {
        let owner = self.owner()?;
        let (name, color) = validation::tag(name, color)?;
        let tag = Tag {
            id: new_id(),
            name,
            color,
            category: TagCategory::Custom,
        };
        self.backend.atomically(|b| {
            let clash = b
                .list_tags(owner)?
                .iter()
                .any(|t| t.name.eq_ignore_ascii_case(&tag.name));
            if clash {
                return Err(Error::validation(format!(
                    "Tag '{}' already exists",
                    tag.name
                )));
            }
            b.insert_tag(owner, &tag)
        })?;
        tracing::info!("created tag {} ({})", tag.name, tag.id);
        self.publish(owner, Collection::Tags, ChangeKind::Insert, &tag.id);
        Ok(tag)
    }

    /// Deletes a custom tag and strips it from every idea and task. Preset
    /// and unknown tags return false.
    pub fn delete_tag(&self, id: &str) -> Result<bool> {
        let owner = self.owner()?;
        let outcome = self.backend.atomically(|b| {
            match b.get_tag(owner, id)? {
                Some(tag) if tag.category == TagCategory::Custom => {}
                _ => return Ok(None),
            }
            b.delete_tag(owner, id)?;
            let mut ideas = Vec::new();
            for mut idea in b.list_ideas(owner)? {
                if idea.tags.remove(id) {
                    b.update_idea(owner, &idea)?;
                    ideas.push(idea.id);
                }
            }
            let mut tasks = Vec::new();
            for mut task in b.list_tasks(owner)? {
                if task.tags.remove(id) {
                    b.update_task(owner, &task)?;
                    tasks.push(task.id);
                }
            }
            Ok(Some((ideas, tasks)))
        })?;

        let Some((ideas, tasks)) = outcome else {
            tracing::warn!("tag {id} is a preset or does not exist, not deleted");
            return Ok(false);
        };
        tracing::info!(
            "deleted tag {id}, stripped from {} ideas and {} tasks",
            ideas.len(),
            tasks.len()
        );
        for idea_id in &ideas {
            self.publish(owner, Collection::Ideas, ChangeKind::Update, idea_id);
        }
        for task_id in &tasks {
            self.publish(owner, Collection::Tasks, ChangeKind::Update, task_id);
        }
        self.publish(owner, Collection::Tags, ChangeKind::Delete, id);
        Ok(true)
    }

    // ── Export ──

    pub fn export(&self) -> Result<Export> {
        let owner = self.owner()?;
        Ok(Export {
            exported_at: Utc::now(),
            ideas: self.backend.list_ideas(owner)?,
            tasks: self.backend.list_tasks(owner)?,
            tags: self.backend.list_tags(owner)?,
        })
    }
}

// ── Write steps shared by single and bulk operations ──

fn apply_idea_patch<B: Backend>(
    b: &B,
    owner: &str,
    id: &str,
    patch: &IdeaPatch,
    now: DateTime<Utc>,
) -> Result<Idea> {
    let mut idea = b
        .get_idea(owner, id)?
        .ok_or_else(|| Error::not_found("idea", id))?;
    if let Some(title) = &patch.title {
        idea.title.clone_from(title);
    }
    if let Some(description) = &patch.description {
        idea.description.clone_from(description);
    }
    if let Some(tags) = &patch.tags {
        idea.tags.clone_from(tags);
    }
    if patch.touches_scores() {
        let impact = patch.impact.unwrap_or(idea.impact());
        let effort = patch.effort.unwrap_or(idea.effort());
        idea.set_scores(impact, effort);
    }
    if let Some(status) = patch.status {
        idea.status = status;
    }
    idea.updated_at = now;
    if !b.update_idea(owner, &idea)? {
        return Err(Error::not_found("idea", id));
    }
    Ok(idea)
}

/// `Some(deleted task ids)` if the idea existed.
fn remove_idea<B: Backend>(b: &B, owner: &str, id: &str) -> Result<Option<Vec<String>>> {
    if b.get_idea(owner, id)?.is_none() {
        return Ok(None);
    }
    let task_ids = b.task_ids_for_idea(owner, id)?;
    for task_id in &task_ids {
        remove_task(b, owner, task_id)?;
    }
    b.delete_idea(owner, id)?;
    Ok(Some(task_ids))
}

fn build_task(idea_id: &str, draft: TaskDraft, now: DateTime<Utc>) -> Task {
    let mut task = Task::new(
        new_id(),
        idea_id.to_string(),
        draft.title,
        draft.priority.unwrap_or_default(),
        now,
    );
    task.description = draft.description;
    task.due_date = draft.due_date;
    task.estimated_hours = draft.estimated_hours;
    task.tags = draft.tags;
    task.subtasks = draft
        .subtasks
        .into_iter()
        .map(|title| Subtask {
            id: new_id(),
            title,
            completed: false,
            created_at: now,
        })
        .collect();
    task
}

fn apply_task_patch<B: Backend>(
    b: &B,
    owner: &str,
    id: &str,
    patch: &TaskPatch,
    now: DateTime<Utc>,
) -> Result<Task> {
    let mut task = b
        .get_task(owner, id)?
        .ok_or_else(|| Error::not_found("task", id))?;
    if let Some(title) = &patch.title {
        task.title.clone_from(title);
    }
    if let Some(description) = &patch.description {
        task.description.clone_from(description);
    }
    if let Some(status) = patch.status {
        task.set_status(status, now);
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }
    if let Some(due_date) = patch.due_date {
        task.due_date = due_date;
    }
    if let Some(hours) = patch.estimated_hours {
        task.estimated_hours = hours;
    }
    if let Some(hours) = patch.actual_hours {
        task.actual_hours = hours;
    }
    if let Some(tags) = &patch.tags {
        task.tags.clone_from(tags);
    }
    task.updated_at = now;
    if !b.update_task(owner, &task)? {
        return Err(Error::not_found("task", id));
    }
    Ok(task)
}

fn remove_task<B: Backend>(b: &B, owner: &str, id: &str) -> Result<bool> {
    if b.get_task(owner, id)?.is_none() {
        return Ok(false);
    }
    let subtasks = b.delete_subtasks_for_task(owner, id)?;
    tracing::debug!("removing task {id} with {subtasks} subtasks");
    b.delete_task(owner, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LocalStore, Priority, Store, TagSet};

    fn score(v: u8) -> Score {
        Score::new(v).unwrap()
    }

    fn manager() -> RecordManager<Store> {
        let mut mgr = RecordManager::new(Store::open_in_memory().unwrap(), None);
        mgr.sign_in("user-1", Some("Ada")).unwrap();
        mgr
    }

    fn scored(title: &str, impact: u8, effort: u8) -> IdeaDraft {
        IdeaDraft {
            impact: Some(score(impact)),
            effort: Some(score(effort)),
            ..IdeaDraft::titled(title)
        }
    }

    #[test]
    fn test_no_session_is_unauthenticated() {
        let mgr = RecordManager::new(Store::open_in_memory().unwrap(), None);
        assert!(matches!(
            mgr.create_idea(&IdeaDraft::titled("x")),
            Err(Error::Unauthenticated)
        ));
        assert!(matches!(mgr.list_ideas(), Err(Error::Unauthenticated)));
    }

    #[test]
    fn test_sign_in_seeds_presets_once() {
        let mut mgr = manager();
        assert_eq!(mgr.list_tags().unwrap().len(), 10);
        mgr.sign_out();
        assert!(mgr.session().is_none());
        mgr.sign_in("user-1", None).unwrap();
        assert_eq!(mgr.list_tags().unwrap().len(), 10);
        assert_eq!(mgr.session().unwrap().display_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_create_idea_defaults() {
        let mgr = manager();
        let idea = mgr.create_idea(&IdeaDraft::titled("Plain")).unwrap();
        assert_eq!(idea.impact(), Score::DEFAULT);
        assert_eq!(idea.effort(), Score::DEFAULT);
        assert_eq!(idea.quadrant(), Quadrant::Q1);
        assert_eq!(idea.status, IdeaStatus::Active);
        assert_eq!(idea.created_at, idea.updated_at);
    }

    #[test]
    fn test_partial_updates_keep_quadrant_in_sync() {
        let mgr = manager();
        let idea = mgr.create_idea(&scored("X", 4, 2)).unwrap();
        assert_eq!(idea.quadrant(), Quadrant::Q2);

        let steps = [
            IdeaPatch { effort: Some(score(4)), ..IdeaPatch::default() },
            IdeaPatch { impact: Some(score(1)), ..IdeaPatch::default() },
            IdeaPatch { effort: Some(score(1)), ..IdeaPatch::default() },
            IdeaPatch { title: Some("renamed".into()), ..IdeaPatch::default() },
        ];
        for patch in &steps {
            let updated = mgr.update_idea(&idea.id, patch).unwrap();
            let stored = mgr.get_idea(&idea.id).unwrap();
            assert_eq!(stored, updated);
            assert_eq!(
                stored.quadrant(),
                crate::quadrant::classify(stored.impact(), stored.effort())
            );
        }
        assert_eq!(mgr.get_idea(&idea.id).unwrap().quadrant(), Quadrant::Q4);
    }

    #[test]
    fn test_update_missing_idea_is_not_found() {
        let mgr = manager();
        let err = mgr.update_idea("nope", &IdeaPatch::default()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_invalid_patch_leaves_record_unchanged() {
        let mgr = manager();
        let idea = mgr.create_idea(&IdeaDraft::titled("keep")).unwrap();
        let bad = IdeaPatch {
            title: Some(String::new()),
            impact: Some(score(5)),
            ..IdeaPatch::default()
        };
        assert!(matches!(mgr.update_idea(&idea.id, &bad), Err(Error::Validation(_))));
        assert_eq!(mgr.get_idea(&idea.id).unwrap(), idea);
    }

    #[test]
    fn test_archive_and_restore() {
        let mgr = manager();
        let idea = mgr.create_idea(&IdeaDraft::titled("a")).unwrap();
        assert_eq!(mgr.archive_idea(&idea.id).unwrap().status, IdeaStatus::Archived);
        assert_eq!(mgr.restore_idea(&idea.id).unwrap().status, IdeaStatus::Active);
    }

    #[test]
    fn test_move_idea_uses_representative_scores() {
        let mgr = manager();
        let idea = mgr.create_idea(&IdeaDraft::titled("a")).unwrap();
        let moved = mgr.move_idea(&idea.id, Quadrant::Q3).unwrap();
        assert_eq!(moved.quadrant(), Quadrant::Q3);
        assert_eq!((moved.impact().get(), moved.effort().get()), (2, 4));
    }

    #[test]
    fn test_delete_idea_cascades_to_tasks_and_subtasks() {
        let mgr = manager();
        let idea = mgr.create_idea(&IdeaDraft::titled("parent")).unwrap();
        let keep = mgr.create_idea(&IdeaDraft::titled("other")).unwrap();
        let draft = TaskDraft {
            subtasks: vec!["a".into(), "b".into()],
            ..TaskDraft::titled("t")
        };
        let t1 = mgr.create_task(&idea.id, &draft).unwrap();
        mgr.create_task(&idea.id, &draft).unwrap();
        let survivor = mgr.create_task(&keep.id, &draft).unwrap();

        assert!(mgr.delete_idea(&idea.id).unwrap());
        let tasks = mgr.list_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, survivor.id);
        assert!(mgr.backend().get_subtask("user-1", &t1.id, &t1.subtasks[0].id).unwrap().is_none());
        let remaining: i64 = mgr
            .backend()
            .conn
            .query_row("SELECT COUNT(*) FROM subtasks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 2);

        assert!(!mgr.delete_idea(&idea.id).unwrap());
    }

    #[test]
    fn test_delete_task_removes_only_its_subtasks() {
        let mgr = manager();
        let idea = mgr.create_idea(&IdeaDraft::titled("parent")).unwrap();
        let draft = TaskDraft {
            subtasks: vec!["a".into()],
            ..TaskDraft::titled("t")
        };
        let t1 = mgr.create_task(&idea.id, &draft).unwrap();
        let t2 = mgr.create_task(&idea.id, &draft).unwrap();

        assert!(mgr.delete_task(&t1.id).unwrap());
        assert!(!mgr.delete_task(&t1.id).unwrap());
        let sibling = mgr.get_task(&t2.id).unwrap();
        assert_eq!(sibling.subtasks.len(), 1);
        assert!(mgr.get_idea(&idea.id).is_ok());
    }

    #[test]
    fn test_completion_stamp_follows_status() {
        let mgr = manager();
        let idea = mgr.create_idea(&IdeaDraft::titled("i")).unwrap();
        let task = mgr.create_task(&idea.id, &TaskDraft::titled("t")).unwrap();
        assert_eq!(task.status(), TaskStatus::NotStarted);
        assert_eq!(task.priority, Priority::Medium);

        let done = mgr.set_task_status(&task.id, TaskStatus::Completed).unwrap();
        assert!(done.completed_at().is_some());
        assert!(mgr.get_task(&task.id).unwrap().completed_at().is_some());

        let reopened = mgr.set_task_status(&task.id, TaskStatus::InProgress).unwrap();
        assert!(reopened.completed_at().is_none());
        assert!(mgr.get_task(&task.id).unwrap().completed_at().is_none());
    }

    #[test]
    fn test_convert_requires_existing_idea() {
        let mgr = manager();
        let err = mgr
            .convert_idea_to_task("missing", &TaskDraft::titled("t"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_subtask_under_wrong_task_is_a_failed_noop() {
        let mgr = manager();
        let idea = mgr.create_idea(&IdeaDraft::titled("i")).unwrap();
        let a = mgr.create_task(&idea.id, &TaskDraft::titled("a")).unwrap();
        let b = mgr.create_task(&idea.id, &TaskDraft::titled("b")).unwrap();
        let sub = mgr.add_subtask(&a.id, "step").unwrap();

        let done = SubtaskPatch {
            completed: Some(true),
            ..SubtaskPatch::default()
        };
        assert!(!mgr.update_subtask(&b.id, &sub.id, &done).unwrap());
        assert!(!mgr.delete_subtask("ghost", &sub.id).unwrap());
        assert!(!mgr.get_task(&a.id).unwrap().subtasks[0].completed);

        assert!(mgr.update_subtask(&a.id, &sub.id, &done).unwrap());
        assert!(mgr.get_task(&a.id).unwrap().subtasks[0].completed);
        assert!(mgr.add_subtask("ghost", "x").unwrap_err().is_not_found());
    }

    #[test]
    fn test_custom_tag_delete_cascades_presets_refuse() {
        let mgr = manager();
        let tag = mgr.create_tag("Side", "#123ABC").unwrap();
        let tags = TagSet::from([tag.id.clone(), "work".to_string()]);
        let idea = mgr
            .create_idea(&IdeaDraft {
                tags: tags.clone(),
                ..IdeaDraft::titled("i")
            })
            .unwrap();
        let task = mgr
            .create_task(&idea.id, &TaskDraft { tags, ..TaskDraft::titled("t") })
            .unwrap();

        assert!(!mgr.delete_tag("work").unwrap());
        assert!(mgr.delete_tag(&tag.id).unwrap());
        assert_eq!(
            mgr.get_idea(&idea.id).unwrap().tags,
            TagSet::from(["work".to_string()])
        );
        assert_eq!(
            mgr.get_task(&task.id).unwrap().tags,
            TagSet::from(["work".to_string()])
        );
        assert!(!mgr.delete_tag(&tag.id).unwrap());
    }

    #[test]
    fn test_duplicate_tag_name_rejected() {
        let mgr = manager();
        assert!(matches!(mgr.create_tag("work", "#000000"), Err(Error::Validation(_))));
    }

    #[test]
    fn test_writes_are_published() {
        let mgr = manager();
        let sub = mgr.feed().subscribe();
        let idea = mgr.create_idea(&IdeaDraft::titled("i")).unwrap();
        mgr.create_task(&idea.id, &TaskDraft::titled("t")).unwrap();
        mgr.delete_idea(&idea.id).unwrap();

        let kinds: Vec<_> = sub.drain().into_iter().map(|c| (c.collection, c.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (Collection::Ideas, ChangeKind::Insert),
                (Collection::Tasks, ChangeKind::Insert),
                (Collection::Tasks, ChangeKind::Delete),
                (Collection::Ideas, ChangeKind::Delete),
            ]
        );
    }

    #[test]
    fn test_local_backend_behaves_the_same() {
        let mgr = RecordManager::new(LocalStore::in_memory(), Some(Session::local()));
        let idea = mgr.create_idea(&scored("X", 4, 2)).unwrap();
        let task = mgr
            .convert_idea_to_task(
                &idea.id,
                &TaskDraft {
                    subtasks: vec!["a".into()],
                    ..TaskDraft::titled("t")
                },
            )
            .unwrap();
        assert_eq!(mgr.list_tasks().unwrap()[0].subtasks.len(), 1);
        assert!(mgr.delete_idea(&idea.id).unwrap());
        assert!(mgr.get_task(&task.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_export_collects_everything() {
        let mgr = manager();
        let idea = mgr.create_idea(&IdeaDraft::titled("i")).unwrap();
        mgr.create_task(&idea.id, &TaskDraft::titled("t")).unwrap();
        let export = mgr.export().unwrap();
        assert_eq!(export.ideas.len(), 1);
        assert_eq!(export.tasks.len(), 1);
        assert_eq!(export.tags.len(), 10);
    }
}
