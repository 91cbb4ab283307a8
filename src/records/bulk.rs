//! Bulk update/delete over a caller-supplied id list.
//!
//! Each id is processed on its own: unknown ids are skipped, a failing
//! record is logged and the rest carry on. Quadrants are recomputed per
//! record from that record's own effective impact and effort.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;

use super::{RecordManager, apply_idea_patch, apply_task_patch, remove_idea, remove_task};
use crate::error::{Error, Result};
use crate::realtime::{ChangeKind, Collection};
use crate::store::{Backend, IdeaPatch, TaskPatch};
use crate::validation;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct BulkOutcome {
    pub affected: Vec<String>,
    pub missing: Vec<String>,
    /// `(id, error message)` for records that could not be written.
    pub failed: Vec<(String, String)>,
}

impl BulkOutcome {
    /// True when at least one record was affected.
    pub fn success(&self) -> bool {
        !self.affected.is_empty()
    }

    fn record(&mut self, id: &str, result: Result<bool>) {
        match result {
            Ok(true) => self.affected.push(id.to_string()),
            Ok(false) => self.missing.push(id.to_string()),
            Err(e) if e.is_not_found() => self.missing.push(id.to_string()),
            Err(e) => {
                tracing::warn!("bulk operation failed for {id}: {e}");
                self.failed.push((id.to_string(), e.to_string()));
            }
        }
    }
}

/// First occurrence of each id, in order.
fn distinct(ids: &[String]) -> Result<Vec<&str>> {
    if ids.is_empty() {
        return Err(Error::validation("At least one item must be selected"));
    }
    let mut seen = HashSet::new();
    Ok(ids
        .iter()
        .map(String::as_str)
        .filter(|id| seen.insert(*id))
        .collect())
}

impl<B: Backend> RecordManager<B> {
    pub fn bulk_update_ideas(&self, ids: &[String], patch: &IdeaPatch) -> Result<BulkOutcome> {
        let owner = self.owner()?;
        let patch = validation::idea_patch(patch)?;
        let now = Utc::now();
        let mut outcome = BulkOutcome::default();
        for id in distinct(ids)? {
            let result = self
                .backend
                .atomically(|b| apply_idea_patch(b, owner, id, &patch, now));
            if result.is_ok() {
                self.publish(owner, Collection::Ideas, ChangeKind::Update, id);
            }
            outcome.record(id, result.map(|_| true));
        }
        tracing::info!(
            "bulk updated {} ideas ({} missing, {} failed)",
            outcome.affected.len(),
            outcome.missing.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    pub fn bulk_delete_ideas(&self, ids: &[String]) -> Result<BulkOutcome> {
        let owner = self.owner()?;
        let mut outcome = BulkOutcome::default();
        for id in distinct(ids)? {
            let result = self.backend.atomically(|b| remove_idea(b, owner, id));
            if let Ok(Some(task_ids)) = &result {
                self.publish_idea_removal(owner, id, task_ids);
            }
            outcome.record(id, result.map(|removed| removed.is_some()));
        }
        tracing::info!(
            "bulk deleted {} ideas ({} missing, {} failed)",
            outcome.affected.len(),
            outcome.missing.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    pub fn bulk_update_tasks(&self, ids: &[String], patch: &TaskPatch) -> Result<BulkOutcome> {
        let owner = self.owner()?;
        let patch = validation::task_patch(patch)?;
        let now = Utc::now();
        let mut outcome = BulkOutcome::default();
        for id in distinct(ids)? {
            let result = self
                .backend
                .atomically(|b| apply_task_patch(b, owner, id, &patch, now));
            if result.is_ok() {
                self.publish(owner, Collection::Tasks, ChangeKind::Update, id);
            }
            outcome.record(id, result.map(|_| true));
        }
        tracing::info!(
            "bulk updated {} tasks ({} missing, {} failed)",
            outcome.affected.len(),
            outcome.missing.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    pub fn bulk_delete_tasks(&self, ids: &[String]) -> Result<BulkOutcome> {
        let owner = self.owner()?;
        let mut outcome = BulkOutcome::default();
        for id in distinct(ids)? {
            let result = self.backend.atomically(|b| remove_task(b, owner, id));
            if matches!(result, Ok(true)) {
                self.publish(owner, Collection::Tasks, ChangeKind::Delete, id);
            }
            outcome.record(id, result);
        }
        tracing::info!(
            "bulk deleted {} tasks ({} missing, {} failed)",
            outcome.affected.len(),
            outcome.missing.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }
}
