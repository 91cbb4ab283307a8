use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};

use super::models::{Idea, Subtask, Tag, TagSet, Task, UserProfile};
use super::{Backend, Store, date_to_sql, timestamp_to_sql};
use crate::error::{Error, Result};
use crate::quadrant::Score;

const IDEA_COLUMNS: &str =
    "id, title, description, tags, impact, effort, status, created_at, updated_at";

const TASK_COLUMNS: &str = "id, idea_id, title, description, status, priority, due_date,
    estimated_hours, actual_hours, tags, created_at, updated_at, completed_at";

const SAVEPOINT: &str = "record_write";

// ── Row decoding ──

fn conversion_err<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn opt_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

fn opt_date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_err(idx, e)))
        .transpose()
}

fn tags_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<TagSet> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

fn score_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Score> {
    let raw: u8 = row.get(idx)?;
    Score::new(raw).map_err(|e| conversion_err(idx, e))
}

fn parsed_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_err(idx, e))
}

fn idea_from_row(row: &Row<'_>) -> rusqlite::Result<Idea> {
    Ok(Idea::new(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        tags_at(row, 3)?,
        score_at(row, 4)?,
        score_at(row, 5)?,
        parsed_at(row, 6)?,
        timestamp_at(row, 7)?,
        timestamp_at(row, 8)?,
    ))
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let mut task = Task::new(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        parsed_at(row, 5)?,
        timestamp_at(row, 10)?,
    );
    task.description = row.get(3)?;
    task.due_date = opt_date_at(row, 6)?;
    task.estimated_hours = row.get(7)?;
    task.actual_hours = row.get(8)?;
    task.tags = tags_at(row, 9)?;
    task.updated_at = timestamp_at(row, 11)?;
    Ok(task.restore(parsed_at(row, 4)?, opt_timestamp_at(row, 12)?))
}

fn subtask_from_row(row: &Row<'_>) -> rusqlite::Result<Subtask> {
    let completed: i64 = row.get(2)?;
    Ok(Subtask {
        id: row.get(0)?,
        title: row.get(1)?,
        completed: completed != 0,
        created_at: timestamp_at(row, 3)?,
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        category: parsed_at(row, 3)?,
    })
}

impl Store {
    fn subtasks_for_task(&self, task_id: &str) -> Result<Vec<Subtask>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, completed, created_at FROM subtasks
             WHERE task_id = ?1
             ORDER BY created_at, rowid",
        )?;
        let subtasks = stmt
            .query_map(params![task_id], subtask_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(subtasks)
    }

    fn owns_task(&self, owner: &str, task_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM tasks WHERE id = ?1 AND user_id = ?2",
                params![task_id, owner],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl Backend for Store {
    fn begin(&self) -> Result<()> {
        self.conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))?;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.conn.execute_batch(&format!("RELEASE {SAVEPOINT}"))?;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.conn
            .execute_batch(&format!("ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT}"))?;
        Ok(())
    }

    // ── Profiles ──

    fn get_profile(&self, owner: &str) -> Result<Option<UserProfile>> {
        let profile = self
            .conn
            .query_row(
                "SELECT user_id, display_name, avatar_url, preferences, created_at, updated_at
                 FROM user_profiles WHERE user_id = ?1",
                params![owner],
                |row| {
                    let prefs: String = row.get(3)?;
                    Ok(UserProfile {
                        user_id: row.get(0)?,
                        display_name: row.get(1)?,
                        avatar_url: row.get(2)?,
                        preferences: serde_json::from_str(&prefs)
                            .map_err(|e| conversion_err(3, e))?,
                        created_at: timestamp_at(row, 4)?,
                        updated_at: timestamp_at(row, 5)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    fn insert_profile(&self, profile: &UserProfile) -> Result<()> {
        self.conn.execute(
            "INSERT INTO user_profiles (user_id, display_name, avatar_url, preferences, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                profile.user_id,
                profile.display_name,
                profile.avatar_url,
                serde_json::to_string(&profile.preferences)?,
                timestamp_to_sql(&profile.created_at),
                timestamp_to_sql(&profile.updated_at),
            ],
        )?;
        Ok(())
    }

    // ── Ideas ──

    fn list_ideas(&self, owner: &str) -> Result<Vec<Idea>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {IDEA_COLUMNS} FROM ideas
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let ideas = stmt
            .query_map(params![owner], idea_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ideas)
    }

    fn get_idea(&self, owner: &str, id: &str) -> Result<Option<Idea>> {
        let idea = self
            .conn
            .query_row(
                &format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE id = ?1 AND user_id = ?2"),
                params![id, owner],
                idea_from_row,
            )
            .optional()?;
        Ok(idea)
    }

    fn insert_idea(&self, owner: &str, idea: &Idea) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ideas (id, user_id, title, description, tags, impact, effort, quadrant, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                idea.id,
                owner,
                idea.title,
                idea.description,
                serde_json::to_string(&idea.tags)?,
                idea.impact().get(),
                idea.effort().get(),
                idea.quadrant().as_str(),
                idea.status.as_str(),
                timestamp_to_sql(&idea.created_at),
                timestamp_to_sql(&idea.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update_idea(&self, owner: &str, idea: &Idea) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE ideas SET title = ?1, description = ?2, tags = ?3, impact = ?4, effort = ?5,
                              quadrant = ?6, status = ?7, updated_at = ?8
             WHERE id = ?9 AND user_id = ?10",
            params![
                idea.title,
                idea.description,
                serde_json::to_string(&idea.tags)?,
                idea.impact().get(),
                idea.effort().get(),
                idea.quadrant().as_str(),
                idea.status.as_str(),
                timestamp_to_sql(&idea.updated_at),
                idea.id,
                owner,
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_idea(&self, owner: &str, id: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM ideas WHERE id = ?1 AND user_id = ?2",
            params![id, owner],
        )?;
        Ok(changed > 0)
    }

    // ── Tasks ──

    fn list_tasks(&self, owner: &str) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let mut tasks = stmt
            .query_map(params![owner], task_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.title, s.completed, s.created_at, s.task_id
             FROM subtasks s JOIN tasks t ON t.id = s.task_id
             WHERE t.user_id = ?1
             ORDER BY s.created_at, s.rowid",
        )?;
        let mut by_task: HashMap<String, Vec<Subtask>> = HashMap::new();
        let rows = stmt.query_map(params![owner], |row| {
            Ok((row.get::<_, String>(4)?, subtask_from_row(row)?))
        })?;
        for row in rows {
            let (task_id, subtask) = row?;
            by_task.entry(task_id).or_default().push(subtask);
        }

        for task in &mut tasks {
            task.subtasks = by_task.remove(&task.id).unwrap_or_default();
        }
        Ok(tasks)
    }

    fn get_task(&self, owner: &str, id: &str) -> Result<Option<Task>> {
        let task = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"),
                params![id, owner],
                task_from_row,
            )
            .optional()?;
        match task {
            Some(mut task) => {
                task.subtasks = self.subtasks_for_task(&task.id)?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    fn task_ids_for_idea(&self, owner: &str, idea_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM tasks WHERE idea_id = ?1 AND user_id = ?2 ORDER BY rowid")?;
        let ids = stmt
            .query_map(params![idea_id, owner], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn insert_task(&self, owner: &str, task: &Task) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO tasks (user_id, {TASK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                owner,
                task.id,
                task.idea_id,
                task.title,
                task.description,
                task.status().as_str(),
                task.priority.as_str(),
                task.due_date.as_ref().map(date_to_sql),
                task.estimated_hours,
                task.actual_hours,
                serde_json::to_string(&task.tags)?,
                timestamp_to_sql(&task.created_at),
                timestamp_to_sql(&task.updated_at),
                task.completed_at().as_ref().map(timestamp_to_sql),
            ],
        )?;
        for subtask in &task.subtasks {
            self.insert_subtask(owner, &task.id, subtask)?;
        }
        Ok(())
    }

    fn update_task(&self, owner: &str, task: &Task) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE tasks SET title = ?1, description = ?2, status = ?3, priority = ?4,
                              due_date = ?5, estimated_hours = ?6, actual_hours = ?7, tags = ?8,
                              updated_at = ?9, completed_at = ?10
             WHERE id = ?11 AND user_id = ?12",
            params![
                task.title,
                task.description,
                task.status().as_str(),
                task.priority.as_str(),
                task.due_date.as_ref().map(date_to_sql),
                task.estimated_hours,
                task.actual_hours,
                serde_json::to_string(&task.tags)?,
                timestamp_to_sql(&task.updated_at),
                task.completed_at().as_ref().map(timestamp_to_sql),
                task.id,
                owner,
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_task(&self, owner: &str, id: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
            params![id, owner],
        )?;
        Ok(changed > 0)
    }

    // ── Subtasks ──

    fn get_subtask(&self, owner: &str, task_id: &str, id: &str) -> Result<Option<Subtask>> {
        if !self.owns_task(owner, task_id)? {
            return Ok(None);
        }
        let subtask = self
            .conn
            .query_row(
                "SELECT id, title, completed, created_at FROM subtasks
                 WHERE id = ?1 AND task_id = ?2",
                params![id, task_id],
                subtask_from_row,
            )
            .optional()?;
        Ok(subtask)
    }

    fn insert_subtask(&self, owner: &str, task_id: &str, subtask: &Subtask) -> Result<bool> {
        if !self.owns_task(owner, task_id)? {
            return Ok(false);
        }
        self.conn.execute(
            "INSERT INTO subtasks (id, task_id, title, completed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                subtask.id,
                task_id,
                subtask.title,
                i64::from(subtask.completed),
                timestamp_to_sql(&subtask.created_at),
            ],
        )?;
        Ok(true)
    }

    fn update_subtask(&self, owner: &str, task_id: &str, subtask: &Subtask) -> Result<bool> {
        if !self.owns_task(owner, task_id)? {
            return Ok(false);
        }
        let changed = self.conn.execute(
            "UPDATE subtasks SET title = ?1, completed = ?2 WHERE id = ?3 AND task_id = ?4",
            params![
                subtask.title,
                i64::from(subtask.completed),
                subtask.id,
                task_id
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_subtask(&self, owner: &str, task_id: &str, id: &str) -> Result<bool> {
        if !self.owns_task(owner, task_id)? {
            return Ok(false);
        }
        let changed = self.conn.execute(
            "DELETE FROM subtasks WHERE id = ?1 AND task_id = ?2",
            params![id, task_id],
        )?;
        Ok(changed > 0)
    }

    fn delete_subtasks_for_task(&self, owner: &str, task_id: &str) -> Result<usize> {
        if !self.owns_task(owner, task_id)? {
            return Ok(0);
        }
        let changed = self
            .conn
            .execute("DELETE FROM subtasks WHERE task_id = ?1", params![task_id])?;
        Ok(changed)
    }

    // ── Tags ──

    fn list_tags(&self, owner: &str) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, color, category FROM tags WHERE user_id = ?1 ORDER BY name",
        )?;
        let tags = stmt
            .query_map(params![owner], tag_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    fn get_tag(&self, owner: &str, id: &str) -> Result<Option<Tag>> {
        let tag = self
            .conn
            .query_row(
                "SELECT id, name, color, category FROM tags WHERE id = ?1 AND user_id = ?2",
                params![id, owner],
                tag_from_row,
            )
            .optional()?;
        Ok(tag)
    }

    fn insert_tag(&self, owner: &str, tag: &Tag) -> Result<()> {
        self.conn.execute(
            "INSERT INTO tags (user_id, id, name, color, category) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![owner, tag.id, tag.name, tag.color, tag.category.as_str()],
        )?;
        Ok(())
    }

    fn delete_tag(&self, owner: &str, id: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM tags WHERE id = ?1 AND user_id = ?2",
            params![id, owner],
        )?;
        Ok(changed > 0)
    }
}
