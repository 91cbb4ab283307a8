use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::quadrant::Quadrant;
use crate::store::{Idea, IdeaStatus, Task, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdeaStats {
    pub total: usize,
    pub active: usize,
    pub archived: usize,
    pub per_quadrant: BTreeMap<Quadrant, usize>,
    pub avg_impact: f64,
    pub avg_effort: f64,
    /// Created within the last seven days.
    pub recent: usize,
    pub unique_tags: usize,
    pub avg_tags_per_idea: f64,
}

impl IdeaStats {
    pub fn compute(ideas: &[Idea], now: DateTime<Utc>) -> Self {
        let total = ideas.len();
        let mean = |sum: usize| {
            if total == 0 {
                0.0
            } else {
                sum as f64 / total as f64
            }
        };

        let mut per_quadrant: BTreeMap<Quadrant, usize> =
            Quadrant::ALL.iter().map(|q| (*q, 0)).collect();
        for idea in ideas {
            *per_quadrant.entry(idea.quadrant()).or_default() += 1;
        }

        let week_ago = now - Duration::days(7);
        let tag_uses: usize = ideas.iter().map(|i| i.tags.len()).sum();
        let unique_tags = ideas
            .iter()
            .flat_map(|i| i.tags.iter())
            .collect::<HashSet<_>>()
            .len();
        let active = ideas
            .iter()
            .filter(|i| i.status == IdeaStatus::Active)
            .count();

        IdeaStats {
            total,
            active,
            archived: total - active,
            per_quadrant,
            avg_impact: mean(ideas.iter().map(|i| usize::from(i.impact().get())).sum()),
            avg_effort: mean(ideas.iter().map(|i| usize::from(i.effort().get())).sum()),
            recent: ideas.iter().filter(|i| i.created_at > week_ago).count(),
            unique_tags,
            avg_tags_per_idea: mean(tag_uses),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub not_started: usize,
    /// Not completed and due before `today`.
    pub overdue: usize,
    /// Percent complete, rounded to the nearest integer.
    pub completion_rate: u32,
}

impl TaskStats {
    pub fn compute(tasks: &[Task], today: NaiveDate) -> Self {
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status() == status).count();
        let total = tasks.len();
        let completed = count(TaskStatus::Completed);
        let completion_rate = if total == 0 {
            0
        } else {
            (completed as f64 * 100.0 / total as f64).round() as u32
        };
        TaskStats {
            total,
            completed,
            in_progress: count(TaskStatus::InProgress),
            not_started: count(TaskStatus::NotStarted),
            overdue: tasks.iter().filter(|t| t.is_overdue(today)).count(),
            completion_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quadrant::Score;
    use crate::store::{Priority, TagSet};

    fn idea(impact: u8, effort: u8, tags: &[&str], age_days: i64, now: DateTime<Utc>) -> Idea {
        let at = now - Duration::days(age_days);
        Idea::new(
            format!("{impact}{effort}{age_days}"),
            "t".into(),
            None,
            tags.iter().map(|t| (*t).to_string()).collect::<TagSet>(),
            Score::new(impact).unwrap(),
            Score::new(effort).unwrap(),
            IdeaStatus::Active,
            at,
            at,
        )
    }

    #[test]
    fn idea_stats() {
        let now = Utc::now();
        let mut ideas = vec![
            idea(4, 2, &["a", "b"], 1, now),
            idea(2, 4, &["b"], 30, now),
            idea(3, 3, &[], 2, now),
        ];
        ideas[1].status = IdeaStatus::Archived;

        let stats = IdeaStats::compute(&ideas, now);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.archived, 1);
        assert_eq!(stats.per_quadrant[&Quadrant::Q1], 1);
        assert_eq!(stats.per_quadrant[&Quadrant::Q4], 0);
        assert!((stats.avg_impact - 3.0).abs() < f64::EPSILON);
        assert_eq!(stats.recent, 2);
        assert_eq!(stats.unique_tags, 2);
        assert!((stats.avg_tags_per_idea - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_stats_are_zero() {
        let stats = IdeaStats::compute(&[], Utc::now());
        assert_eq!(stats.total, 0);
        assert!(stats.avg_impact.abs() < f64::EPSILON);
        assert_eq!(TaskStats::compute(&[], Utc::now().date_naive()).completion_rate, 0);
    }

    #[test]
    fn task_stats_round_completion_rate() {
        let now = Utc::now();
        let today = now.date_naive();
        let mut tasks: Vec<Task> = (0..3)
            .map(|i| Task::new(format!("t{i}"), "i".into(), "x".into(), Priority::Medium, now))
            .collect();
        tasks[0].set_status(TaskStatus::Completed, now);
        tasks[1].set_status(TaskStatus::InProgress, now);
        tasks[1].due_date = today.pred_opt();
        tasks[0].due_date = today.pred_opt();

        let stats = TaskStats::compute(&tasks, today);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.not_started, 1);
        assert_eq!(stats.overdue, 1);
        assert_eq!(stats.completion_rate, 33);
    }
}
