use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::quadrant::{Quadrant, Score, classify};

/// Tag identifiers attached to an idea or task. Order is irrelevant.
pub type TagSet = BTreeSet<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaStatus {
    #[default]
    Active,
    Archived,
}

impl IdeaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdeaStatus::Active => "active",
            IdeaStatus::Archived => "archived",
        }
    }
}

impl FromStr for IdeaStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(IdeaStatus::Active),
            "archived" => Ok(IdeaStatus::Archived),
            other => Err(Error::validation(format!("unknown idea status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::NotStarted,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "☐",
            TaskStatus::InProgress => "●",
            TaskStatus::Completed => "✓",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "not_started" => Ok(TaskStatus::NotStarted),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" | "done" => Ok(TaskStatus::Completed),
            other => Err(Error::validation(format!("unknown task status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// Ordering weight: urgent sorts above high, and so on.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
            Priority::Urgent => 4,
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(Error::validation(format!("unknown priority '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagCategory {
    Preset,
    Custom,
}

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::Preset => "preset",
            TagCategory::Custom => "custom",
        }
    }
}

impl FromStr for TagCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preset" => Ok(TagCategory::Preset),
            "custom" => Ok(TagCategory::Custom),
            other => Err(Error::validation(format!("unknown tag category '{other}'"))),
        }
    }
}

// ── Ideas ──

/// A captured idea. `quadrant` is always `classify(impact, effort)`: the
/// scores can only change through [`Idea::set_scores`], and deserialized
/// records have their quadrant recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredIdea")]
pub struct Idea {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: TagSet,
    impact: Score,
    effort: Score,
    quadrant: Quadrant,
    pub status: IdeaStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Idea {
    #[expect(clippy::too_many_arguments, reason = "mirrors the stored row")]
    pub fn new(
        id: String,
        title: String,
        description: Option<String>,
        tags: TagSet,
        impact: Score,
        effort: Score,
        status: IdeaStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Idea {
            id,
            title,
            description,
            tags,
            impact,
            effort,
            quadrant: classify(impact, effort),
            status,
            created_at,
            updated_at,
        }
    }

    pub fn impact(&self) -> Score {
        self.impact
    }

    pub fn effort(&self) -> Score {
        self.effort
    }

    pub fn quadrant(&self) -> Quadrant {
        self.quadrant
    }

    pub fn set_scores(&mut self, impact: Score, effort: Score) {
        self.impact = impact;
        self.effort = effort;
        self.quadrant = classify(impact, effort);
    }
}

/// Serialized shape of an idea. A stored `quadrant` key is skipped as an
/// unknown field and rederived.
#[derive(Deserialize)]
struct StoredIdea {
    id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: TagSet,
    #[serde(default)]
    impact: Score,
    #[serde(default)]
    effort: Score,
    #[serde(default)]
    status: IdeaStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StoredIdea> for Idea {
    fn from(s: StoredIdea) -> Self {
        Idea::new(
            s.id,
            s.title,
            s.description,
            s.tags,
            s.impact,
            s.effort,
            s.status,
            s.created_at,
            s.updated_at,
        )
    }
}

/// Fields accepted when capturing a new idea.
#[derive(Debug, Clone, Default)]
pub struct IdeaDraft {
    pub title: String,
    pub description: Option<String>,
    pub tags: TagSet,
    pub impact: Option<Score>,
    pub effort: Option<Score>,
}

impl IdeaDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        IdeaDraft {
            title: title.into(),
            ..IdeaDraft::default()
        }
    }
}

/// Partial update of an idea. The quadrant follows from the scores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdeaPatch {
    pub title: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub tags: Option<TagSet>,
    pub impact: Option<Score>,
    pub effort: Option<Score>,
    pub status: Option<IdeaStatus>,
}

impl IdeaPatch {
    /// Patch that places an idea in `quadrant` by assigning its
    /// representative impact/effort pair.
    pub fn move_to(quadrant: Quadrant) -> Self {
        let (impact, effort) = quadrant.representative_scores();
        IdeaPatch {
            impact: Some(impact),
            effort: Some(effort),
            ..IdeaPatch::default()
        }
    }

    pub fn status(status: IdeaStatus) -> Self {
        IdeaPatch {
            status: Some(status),
            ..IdeaPatch::default()
        }
    }

    pub fn touches_scores(&self) -> bool {
        self.impact.is_some() || self.effort.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == IdeaPatch::default()
    }
}

// ── Tasks ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// An actionable item derived from an idea. `completed_at` is set exactly
/// when `status` is `Completed`; both change together through
/// [`Task::set_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredTask")]
pub struct Task {
    pub id: String,
    pub idea_id: String,
    pub title: String,
    pub description: Option<String>,
    status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub subtasks: Vec<Subtask>,
    pub tags: TagSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A fresh, not-yet-started task.
    pub fn new(
        id: String,
        idea_id: String,
        title: String,
        priority: Priority,
        created_at: DateTime<Utc>,
    ) -> Self {
        Task {
            id,
            idea_id,
            title,
            description: None,
            status: TaskStatus::NotStarted,
            priority,
            due_date: None,
            estimated_hours: None,
            actual_hours: None,
            subtasks: Vec::new(),
            tags: TagSet::new(),
            created_at,
            updated_at: created_at,
            completed_at: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Any write of `Completed` stamps `at`; any other status clears it.
    pub fn set_status(&mut self, status: TaskStatus, at: DateTime<Utc>) {
        self.status = status;
        self.completed_at = (status == TaskStatus::Completed).then_some(at);
    }

    /// Rebuild a task from a stored row, normalizing the completion stamp.
    pub(crate) fn restore(mut self, status: TaskStatus, completed_at: Option<DateTime<Utc>>) -> Self {
        self.status = status;
        self.completed_at = match status {
            TaskStatus::Completed => Some(completed_at.unwrap_or(self.updated_at)),
            _ => None,
        };
        self
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status != TaskStatus::Completed && self.due_date.is_some_and(|d| d < today)
    }
}

#[derive(Deserialize)]
struct StoredTask {
    id: String,
    idea_id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: TaskStatus,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    due_date: Option<NaiveDate>,
    #[serde(default)]
    estimated_hours: Option<f64>,
    #[serde(default)]
    actual_hours: Option<f64>,
    #[serde(default)]
    subtasks: Vec<Subtask>,
    #[serde(default)]
    tags: TagSet,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
}

impl From<StoredTask> for Task {
    fn from(s: StoredTask) -> Self {
        let mut task = Task::new(s.id, s.idea_id, s.title, s.priority, s.created_at);
        task.description = s.description;
        task.due_date = s.due_date;
        task.estimated_hours = s.estimated_hours;
        task.actual_hours = s.actual_hours;
        task.subtasks = s.subtasks;
        task.tags = s.tags;
        task.updated_at = s.updated_at;
        task.restore(s.status, s.completed_at)
    }
}

/// Fields accepted when converting an idea into a task.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<f64>,
    pub tags: TagSet,
    /// Titles of subtasks to create alongside the task, all uncompleted.
    pub subtasks: Vec<String>,
}

impl TaskDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        TaskDraft {
            title: title.into(),
            ..TaskDraft::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<NaiveDate>>,
    pub estimated_hours: Option<Option<f64>>,
    pub actual_hours: Option<Option<f64>>,
    pub tags: Option<TagSet>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        TaskPatch {
            status: Some(status),
            ..TaskPatch::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtaskPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

// ── Tags ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: String,
    pub category: TagCategory,
}

/// Tags seeded once per account. Not deletable.
pub const PRESET_TAGS: [(&str, &str, &str); 10] = [
    ("startup", "Startup", "#3B82F6"),
    ("project", "Project", "#10B981"),
    ("personal", "Personal", "#8B5CF6"),
    ("tech", "Tech", "#F59E0B"),
    ("work", "Work", "#EF4444"),
    ("creative", "Creative", "#EC4899"),
    ("learning", "Learning", "#06B6D4"),
    ("health", "Health", "#84CC16"),
    ("business", "Business", "#F97316"),
    ("innovation", "Innovation", "#6366F1"),
];

pub fn preset_tags() -> Vec<Tag> {
    PRESET_TAGS
        .iter()
        .map(|(id, name, color)| Tag {
            id: (*id).to_string(),
            name: (*name).to_string(),
            color: (*color).to_string(),
            category: TagCategory::Preset,
        })
        .collect()
}

// ── Accounts ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub preferences: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Idea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] impact {} / effort {}",
            self.title, self.quadrant, self.impact, self.effort
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(v: u8) -> Score {
        Score::new(v).unwrap()
    }

    #[test]
    fn task_status_round_trip() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert_eq!("in-progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert!("nonsense".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn priority_rank_orders_urgency() {
        assert!(Priority::Urgent.rank() > Priority::High.rank());
        assert!(Priority::High.rank() > Priority::Medium.rank());
        assert!(Priority::Medium.rank() > Priority::Low.rank());
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn set_scores_recomputes_quadrant() {
        let now = Utc::now();
        let mut idea = Idea::new(
            "i".into(),
            "t".into(),
            None,
            TagSet::new(),
            score(4),
            score(2),
            IdeaStatus::Active,
            now,
            now,
        );
        assert_eq!(idea.quadrant(), Quadrant::Q2);
        idea.set_scores(score(4), score(4));
        assert_eq!(idea.quadrant(), Quadrant::Q1);
    }

    #[test]
    fn deserialized_idea_ignores_stored_quadrant() {
        let json = r#"{
            "id": "a", "title": "t", "tags": ["x"], "impact": 1, "effort": 1,
            "quadrant": "q1", "status": "active",
            "created_at": "2025-01-01T00:00:00Z", "updated_at": "2025-01-01T00:00:00Z"
        }"#;
        let idea: Idea = serde_json::from_str(json).unwrap();
        assert_eq!(idea.quadrant(), Quadrant::Q4);
    }

    #[test]
    fn set_status_maintains_completion_stamp() {
        let now = Utc::now();
        let mut task = Task::new("t".into(), "i".into(), "x".into(), Priority::Medium, now);
        assert!(task.completed_at().is_none());
        task.set_status(TaskStatus::Completed, now);
        assert_eq!(task.completed_at(), Some(now));
        task.set_status(TaskStatus::InProgress, now);
        assert!(task.completed_at().is_none());
    }

    #[test]
    fn deserialized_task_normalizes_completion_stamp() {
        let json = r#"{
            "id": "t", "idea_id": "i", "title": "x", "status": "in_progress",
            "created_at": "2025-01-01T00:00:00Z", "updated_at": "2025-01-02T00:00:00Z",
            "completed_at": "2025-01-02T00:00:00Z"
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert!(task.completed_at().is_none());
    }

    #[test]
    fn move_to_patch_sets_both_scores() {
        let patch = IdeaPatch::move_to(Quadrant::Q3);
        assert_eq!(patch.impact, Some(score(2)));
        assert_eq!(patch.effort, Some(score(4)));
        assert!(patch.touches_scores());
        assert!(IdeaPatch::default().is_empty());
    }

    #[test]
    fn overdue_ignores_completed_tasks() {
        let now = Utc::now();
        let today = now.date_naive();
        let mut task = Task::new("t".into(), "i".into(), "x".into(), Priority::Low, now);
        task.due_date = today.pred_opt();
        assert!(task.is_overdue(today));
        task.set_status(TaskStatus::Completed, now);
        assert!(!task.is_overdue(today));
    }

    #[test]
    fn presets_are_ten_preset_tags() {
        let tags = preset_tags();
        assert_eq!(tags.len(), 10);
        assert!(tags.iter().all(|t| t.category == TagCategory::Preset));
    }
}
