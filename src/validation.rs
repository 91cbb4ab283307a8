//! Field-level checks applied to every draft and patch before it reaches a
//! backend. Each check trims text fields and collects every violation, so a
//! single `Error::Validation` reports all of them at once.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::store::{IdeaDraft, IdeaPatch, SubtaskPatch, TaskDraft, TaskPatch};

pub const TITLE_MAX: usize = 100;
pub const DESCRIPTION_MAX: usize = 500;
pub const SUBTASK_TITLE_MAX: usize = 200;
pub const TAG_NAME_MAX: usize = 30;
pub const DISPLAY_NAME_MAX: usize = 50;
pub const SEARCH_MAX: usize = 100;
pub const ESTIMATED_HOURS_MIN: f64 = 0.1;
pub const HOURS_MAX: f64 = 1000.0;

static TAG_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\s_-]+$").expect("tag name regex is valid"));

static COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("colour regex is valid"));

#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    fn title(&mut self, label: &str, raw: &str, max: usize) -> String {
        let title = raw.trim();
        if title.is_empty() {
            self.push(format!("{label} is required"));
        } else if title.chars().count() > max {
            self.push(format!("{label} must be less than {max} characters"));
        }
        title.to_string()
    }

    /// Blank descriptions collapse to `None`.
    fn description(&mut self, raw: Option<&str>) -> Option<String> {
        let text = raw.map(str::trim).filter(|s| !s.is_empty())?;
        if text.chars().count() > DESCRIPTION_MAX {
            self.push(format!(
                "Description must be less than {DESCRIPTION_MAX} characters"
            ));
        }
        Some(text.to_string())
    }

    fn estimated_hours(&mut self, hours: Option<f64>) {
        let Some(h) = hours else { return };
        if !h.is_finite() || h < ESTIMATED_HOURS_MIN {
            self.push(format!(
                "Estimated hours must be at least {ESTIMATED_HOURS_MIN}"
            ));
        } else if h > HOURS_MAX {
            self.push(format!("Estimated hours must be less than {HOURS_MAX}"));
        }
    }

    fn actual_hours(&mut self, hours: Option<f64>) {
        let Some(h) = hours else { return };
        if !h.is_finite() || h < 0.0 {
            self.push("Actual hours cannot be negative");
        } else if h > HOURS_MAX {
            self.push(format!("Actual hours must be less than {HOURS_MAX}"));
        }
    }

    fn finish<T>(self, value: T) -> Result<T> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(Error::Validation(self.0))
        }
    }
}

/// Normalized copy of `draft`, or every violation found.
pub fn idea_draft(draft: &IdeaDraft) -> Result<IdeaDraft> {
    let mut v = Violations::default();
    let clean = IdeaDraft {
        title: v.title("Title", &draft.title, TITLE_MAX),
        description: v.description(draft.description.as_deref()),
        tags: draft.tags.clone(),
        impact: draft.impact,
        effort: draft.effort,
    };
    v.finish(clean)
}

pub fn idea_patch(patch: &IdeaPatch) -> Result<IdeaPatch> {
    let mut v = Violations::default();
    let clean = IdeaPatch {
        title: patch
            .title
            .as_deref()
            .map(|t| v.title("Title", t, TITLE_MAX)),
        description: patch
            .description
            .as_ref()
            .map(|d| v.description(d.as_deref())),
        ..patch.clone()
    };
    v.finish(clean)
}

pub fn task_draft(draft: &TaskDraft) -> Result<TaskDraft> {
    let mut v = Violations::default();
    let title = v.title("Title", &draft.title, TITLE_MAX);
    let description = v.description(draft.description.as_deref());
    v.estimated_hours(draft.estimated_hours);
    let subtasks = draft
        .subtasks
        .iter()
        .map(|s| v.title("Subtask title", s, SUBTASK_TITLE_MAX))
        .collect();
    let clean = TaskDraft {
        title,
        description,
        priority: draft.priority,
        due_date: draft.due_date,
        estimated_hours: draft.estimated_hours,
        tags: draft.tags.clone(),
        subtasks,
    };
    v.finish(clean)
}

pub fn task_patch(patch: &TaskPatch) -> Result<TaskPatch> {
    let mut v = Violations::default();
    let title = patch
        .title
        .as_deref()
        .map(|t| v.title("Title", t, TITLE_MAX));
    let description = patch
        .description
        .as_ref()
        .map(|d| v.description(d.as_deref()));
    v.estimated_hours(patch.estimated_hours.flatten());
    v.actual_hours(patch.actual_hours.flatten());
    let clean = TaskPatch {
        title,
        description,
        ..patch.clone()
    };
    v.finish(clean)
}

pub fn subtask_title(raw: &str) -> Result<String> {
    let mut v = Violations::default();
    let title = v.title("Subtask title", raw, SUBTASK_TITLE_MAX);
    v.finish(title)
}

pub fn subtask_patch(patch: &SubtaskPatch) -> Result<SubtaskPatch> {
    let mut v = Violations::default();
    let clean = SubtaskPatch {
        title: patch
            .title
            .as_deref()
            .map(|t| v.title("Subtask title", t, SUBTASK_TITLE_MAX)),
        completed: patch.completed,
    };
    v.finish(clean)
}

/// Returns the trimmed name and the colour as given.
pub fn tag(name: &str, color: &str) -> Result<(String, String)> {
    let mut v = Violations::default();
    let name = v.title("Tag name", name, TAG_NAME_MAX);
    if !name.is_empty() && !TAG_NAME_RE.is_match(&name) {
        v.push("Tag name can only contain letters, numbers, spaces, hyphens, and underscores");
    }
    if !COLOR_RE.is_match(color) {
        v.push("Color must be a valid hex color");
    }
    v.finish((name, color.to_string()))
}

pub fn display_name(raw: Option<&str>) -> Result<Option<String>> {
    let mut v = Violations::default();
    let name = raw.map(str::trim).filter(|s| !s.is_empty());
    if name.is_some_and(|n| n.chars().count() > DISPLAY_NAME_MAX) {
        v.push(format!(
            "Display name must be less than {DISPLAY_NAME_MAX} characters"
        ));
    }
    v.finish(name.map(str::to_string))
}

pub fn search_query(raw: &str) -> Result<()> {
    let mut v = Violations::default();
    if raw.chars().count() > SEARCH_MAX {
        v.push(format!(
            "Search query must be less than {SEARCH_MAX} characters"
        ));
    }
    v.finish(())
}
