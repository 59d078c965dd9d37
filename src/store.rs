use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::model::{NewTask, Task};

const TASK_COLUMNS: &str = "id, title, text_content, image_data, image_description, \
     audio_data, audio_description, created_at, timer";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        text_content: row.get(2)?,
        image_data: row.get(3)?,
        image_description: row.get(4)?,
        audio_data: row.get(5)?,
        audio_description: row.get(6)?,
        created_at: row.get(7)?,
        timer: row.get(8)?,
    })
}

/// Insert a task; the id and creation time are assigned by the database.
/// Title validation is the caller's job.
pub fn insert_task(conn: &Connection, task: &NewTask) -> Result<()> {
    conn.execute(
        "INSERT INTO tasks (title, text_content, image_data, image_description, audio_data, audio_description, timer)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            task.title,
            task.text_content,
            task.image_data,
            task.image_description,
            task.audio_data,
            task.audio_description,
            task.timer,
        ],
    )?;
    tracing::debug!(id = conn.last_insert_rowid(), title = %task.title, "inserted task");
    Ok(())
}

/// Every stored task, in id order.
pub fn list_tasks(conn: &Connection) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id"))?;
    let rows = stmt.query_map([], task_from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(Into::into)
}

/// Delete the task with `id`. Returns whether a row was removed; a missing
/// id is not an error.
pub fn delete_task(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
    if changed == 0 {
        tracing::debug!(id, "delete of missing task ignored");
    }
    Ok(changed > 0)
}
