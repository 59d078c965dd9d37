use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::model::{JobStatus, MessagePayload, ScheduledJob};

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, i64, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_job((id, name, fire_at, payload, status): (i64, String, i64, String, String)) -> Result<ScheduledJob> {
    let payload: MessagePayload = serde_json::from_str(&payload)?;
    Ok(ScheduledJob {
        id,
        name,
        fire_at,
        message: payload.message,
        status: JobStatus::parse(&status)?,
    })
}

/// Queue a job under `name`, replacing whatever is pending there. Returns the
/// new job id and the ids it replaced.
pub fn enqueue(
    conn: &mut Connection,
    name: &str,
    fire_at: i64,
    message: &str,
) -> Result<(i64, Vec<i64>)> {
    let payload = serde_json::to_string(&MessagePayload {
        message: Some(message.to_string()),
    })?;
    let tx = conn.transaction()?;
    let replaced: Vec<i64> = {
        let mut stmt =
            tx.prepare("SELECT id FROM scheduled_jobs WHERE name = ?1 AND status = 'pending'")?;
        let rows = stmt.query_map([name], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    tx.execute(
        "UPDATE scheduled_jobs SET status = 'replaced' WHERE name = ?1 AND status = 'pending'",
        [name],
    )?;
    tx.execute(
        "INSERT INTO scheduled_jobs (name, fire_at, payload) VALUES (?1, ?2, ?3)",
        rusqlite::params![name, fire_at, payload],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    Ok((id, replaced))
}

pub fn pending(conn: &Connection, name: &str) -> Result<Option<ScheduledJob>> {
    conn.query_row(
        "SELECT id, name, fire_at, payload, status FROM scheduled_jobs
         WHERE name = ?1 AND status = 'pending'",
        [name],
        job_from_row,
    )
    .optional()?
    .map(into_job)
    .transpose()
}

pub fn get_job(conn: &Connection, id: i64) -> Result<Option<ScheduledJob>> {
    conn.query_row(
        "SELECT id, name, fire_at, payload, status FROM scheduled_jobs WHERE id = ?1",
        [id],
        job_from_row,
    )
    .optional()?
    .map(into_job)
    .transpose()
}

/// Take a pending job for delivery by moving it to `firing`. Only one caller
/// can win: returns false if the job was already claimed, replaced or done.
pub fn claim(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE scheduled_jobs SET status = 'firing' WHERE id = ?1 AND status = 'pending'",
        [id],
    )?;
    Ok(changed == 1)
}

/// Move a pending or claimed job to a terminal status. Returns false if the
/// job had already finished, in which case nothing changes.
pub fn finish(conn: &Connection, id: i64, status: JobStatus) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE scheduled_jobs SET status = ?1 WHERE id = ?2 AND status IN ('pending', 'firing')",
        rusqlite::params![status.as_str(), id],
    )?;
    Ok(changed > 0)
}
