//! Filter/sort pipelines deriving the displayed collections.
//!
//! Both pipelines borrow the source slice and return references in display
//! order; the source is never reordered. Sorting is stable, so records with
//! equal keys keep their incoming relative order.

mod stats;

pub use stats::{IdeaStats, TaskStats};

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::NaiveDate;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::error::{Error, Result};
use crate::quadrant::Quadrant;
use crate::store::{Idea, IdeaStatus, Priority, TagSet, Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(Error::validation(format!("unknown sort order '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdeaSortKey {
    #[default]
    Date,
    Title,
    Impact,
    Effort,
}

impl FromStr for IdeaSortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "date" => Ok(IdeaSortKey::Date),
            "title" => Ok(IdeaSortKey::Title),
            "impact" => Ok(IdeaSortKey::Impact),
            "effort" => Ok(IdeaSortKey::Effort),
            other => Err(Error::validation(format!("unknown sort key '{other}'"))),
        }
    }
}

/// Named filter shortcuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    HighImpact,
    QuickWins,
    Recent,
    NeedsPlanning,
}

impl FromStr for Preset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "high-impact" => Ok(Preset::HighImpact),
            "quick-wins" => Ok(Preset::QuickWins),
            "recent" => Ok(Preset::Recent),
            "needs-planning" => Ok(Preset::NeedsPlanning),
            other => Err(Error::validation(format!("unknown filter preset '{other}'"))),
        }
    }
}

/// Inclusive creation-date window; either end may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

/// Case-insensitive substring match on title or description. A query that
/// is blank after trimming matches everything.
fn matches_search(query: &str, title: &str, description: Option<&str>) -> bool {
    if query.trim().is_empty() {
        return true;
    }
    let query = query.to_lowercase();
    title.to_lowercase().contains(&query)
        || description.is_some_and(|d| d.to_lowercase().contains(&query))
}

/// Any selected tag present. An empty selection matches everything.
fn matches_tags(selected: &BTreeSet<String>, tags: &TagSet) -> bool {
    selected.is_empty() || selected.iter().any(|t| tags.contains(t))
}

/// Base letters with accents stripped and case folded.
fn primary_key(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Collation-style title order: base letters first, then accents, then
/// case with lowercase ahead.
fn compare_titles(a: &str, b: &str) -> Ordering {
    primary_key(a)
        .cmp(&primary_key(b))
        .then_with(|| {
            let a: String = a.nfd().collect();
            let b: String = b.nfd().collect();
            a.to_lowercase().cmp(&b.to_lowercase())
        })
        .then_with(|| b.cmp(a))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdeaFilter {
    pub search: String,
    pub tags: BTreeSet<String>,
    pub quadrants: BTreeSet<Quadrant>,
    pub date_range: Option<DateRange>,
    pub sort_by: IdeaSortKey,
    pub sort_order: SortOrder,
}

impl IdeaFilter {
    pub fn apply<'a>(&self, ideas: &'a [Idea]) -> Vec<&'a Idea> {
        let mut out: Vec<&Idea> = ideas
            .iter()
            .filter(|i| matches_search(&self.search, &i.title, i.description.as_deref()))
            .filter(|i| matches_tags(&self.tags, &i.tags))
            .filter(|i| self.quadrants.is_empty() || self.quadrants.contains(&i.quadrant()))
            .filter(|i| {
                self.date_range
                    .is_none_or(|r| r.contains(i.created_at.date_naive()))
            })
            .collect();

        out.sort_by(|a, b| {
            let ordering = match self.sort_by {
                IdeaSortKey::Date => a.created_at.cmp(&b.created_at),
                IdeaSortKey::Title => compare_titles(&a.title, &b.title),
                IdeaSortKey::Impact => a.impact().cmp(&b.impact()),
                IdeaSortKey::Effort => a.effort().cmp(&b.effort()),
            };
            self.sort_order.apply(ordering)
        });
        out
    }

    /// Presets replace the quadrant selection and sort, leaving search and
    /// tags alone.
    pub fn apply_preset(&mut self, preset: Preset) {
        let (quadrants, sort_by, sort_order) = match preset {
            Preset::HighImpact => (
                vec![Quadrant::Q1, Quadrant::Q2],
                IdeaSortKey::Impact,
                SortOrder::Desc,
            ),
            Preset::QuickWins => (vec![Quadrant::Q2], IdeaSortKey::Effort, SortOrder::Asc),
            Preset::Recent => (Vec::new(), IdeaSortKey::Date, SortOrder::Desc),
            Preset::NeedsPlanning => (vec![Quadrant::Q1], IdeaSortKey::Impact, SortOrder::Desc),
        };
        self.quadrants = quadrants.into_iter().collect();
        self.sort_by = sort_by;
        self.sort_order = sort_order;
    }

    pub fn clear(&mut self) {
        *self = IdeaFilter::default();
    }

    pub fn is_active(&self) -> bool {
        !self.search.trim().is_empty()
            || !self.tags.is_empty()
            || !self.quadrants.is_empty()
            || self.date_range.is_some()
    }
}

/// Split displayed ideas into `(active, archived)`, keeping order.
pub fn partition_by_status<'a>(ideas: &[&'a Idea]) -> (Vec<&'a Idea>, Vec<&'a Idea>) {
    ideas
        .iter()
        .copied()
        .partition(|i| i.status == IdeaStatus::Active)
}

// ── Tasks ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskSortKey {
    #[default]
    DueDate,
    Priority,
    Created,
    Title,
}

impl FromStr for TaskSortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "due_date" | "due-date" | "due" => Ok(TaskSortKey::DueDate),
            "priority" => Ok(TaskSortKey::Priority),
            "created" => Ok(TaskSortKey::Created),
            "title" => Ok(TaskSortKey::Title),
            other => Err(Error::validation(format!("unknown sort key '{other}'"))),
        }
    }
}

/// Undated tasks compare after dated ones.
fn compare_due(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskFilter {
    pub search: String,
    pub tags: BTreeSet<String>,
    pub statuses: BTreeSet<TaskStatus>,
    pub priorities: BTreeSet<Priority>,
    pub sort_by: TaskSortKey,
    pub sort_order: SortOrder,
}

impl Default for TaskFilter {
    fn default() -> Self {
        TaskFilter {
            search: String::new(),
            tags: BTreeSet::new(),
            statuses: BTreeSet::new(),
            priorities: BTreeSet::new(),
            sort_by: TaskSortKey::DueDate,
            sort_order: SortOrder::Asc,
        }
    }
}

impl TaskFilter {
    pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        let mut out: Vec<&Task> = tasks
            .iter()
            .filter(|t| matches_search(&self.search, &t.title, t.description.as_deref()))
            .filter(|t| matches_tags(&self.tags, &t.tags))
            .filter(|t| self.statuses.is_empty() || self.statuses.contains(&t.status()))
            .filter(|t| self.priorities.is_empty() || self.priorities.contains(&t.priority))
            .collect();

        out.sort_by(|a, b| {
            let ordering = match self.sort_by {
                TaskSortKey::DueDate => compare_due(a.due_date, b.due_date),
                TaskSortKey::Priority => a.priority.rank().cmp(&b.priority.rank()),
                TaskSortKey::Created => a.created_at.cmp(&b.created_at),
                TaskSortKey::Title => compare_titles(&a.title, &b.title),
            };
            self.sort_order.apply(ordering)
        });
        out
    }

    pub fn clear(&mut self) {
        *self = TaskFilter::default();
    }
}
