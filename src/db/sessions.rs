use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{
    helpers::{parse_datetime, parse_optional_datetime, parse_status, to_i64, to_u64},
    models::{FocusSession, SessionStatus},
    Database,
};

const SESSION_COLUMNS: &str = "id, started_at, stopped_at, status, alert_count, concentrated_frames, distracted_frames, created_at, updated_at";

fn row_to_session(row: &Row) -> Result<FocusSession> {
    let started_at: String = row.get("started_at")?;
    let stopped_at: Option<String> = row.get("stopped_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let status: String = row.get("status")?;

    Ok(FocusSession {
        id: row.get("id")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        stopped_at: parse_optional_datetime(stopped_at, "stopped_at")?,
        status: parse_status(&status)?,
        alert_count: to_u64(row.get("alert_count")?, "alert_count")?,
        concentrated_frames: to_u64(row.get("concentrated_frames")?, "concentrated_frames")?,
        distracted_frames: to_u64(row.get("distracted_frames")?, "distracted_frames")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn insert_focus_session(&self, session: &FocusSession) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO focus_sessions (id, started_at, stopped_at, status, alert_count, concentrated_frames, distracted_frames, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.started_at.to_rfc3339(),
                    record.stopped_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.status.as_str(),
                    to_i64(record.alert_count)?,
                    to_i64(record.concentrated_frames)?,
                    to_i64(record.distracted_frames)?,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Bump the alert counter without waiting for the write.
    pub fn record_session_alert(&self, session_id: &str, at: DateTime<Utc>) -> Result<()> {
        let session_id = session_id.to_string();
        self.submit("session alert", move |conn| {
            conn.execute(
                "UPDATE focus_sessions
                 SET alert_count = alert_count + 1,
                     updated_at = ?1
                 WHERE id = ?2",
                params![at.to_rfc3339(), session_id],
            )?;
            Ok(())
        })
    }

    pub async fn finish_focus_session(
        &self,
        session_id: &str,
        stopped_at: DateTime<Utc>,
        concentrated_frames: u64,
        distracted_frames: u64,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE focus_sessions
                 SET status = ?1,
                     stopped_at = ?2,
                     concentrated_frames = ?3,
                     distracted_frames = ?4,
                     updated_at = ?5
                 WHERE id = ?6",
                params![
                    SessionStatus::Completed.as_str(),
                    stopped_at.to_rfc3339(),
                    to_i64(concentrated_frames)?,
                    to_i64(distracted_frames)?,
                    stopped_at.to_rfc3339(),
                    session_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_incomplete_focus_session(&self) -> Result<Option<FocusSession>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM focus_sessions
                 WHERE status = 'Running'
                 ORDER BY started_at DESC
                 LIMIT 1"
            ))?;

            let mut rows = stmt.query([])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    pub async fn mark_focus_session_interrupted(
        &self,
        session_id: &str,
        stopped_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE focus_sessions
                 SET status = ?1,
                     stopped_at = ?2,
                     updated_at = ?3
                 WHERE id = ?4",
                params![
                    SessionStatus::Interrupted.as_str(),
                    stopped_at.to_rfc3339(),
                    stopped_at.to_rfc3339(),
                    session_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Finished sessions, newest first.
    pub async fn list_focus_sessions(&self, limit: usize) -> Result<Vec<FocusSession>> {
        let limit = to_i64(limit as u64)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM focus_sessions
                 WHERE status IN ('Completed', 'Interrupted')
                 ORDER BY started_at DESC
                 LIMIT ?1"
            ))?;

            let mut rows = stmt.query(params![limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Close out a session left running by a previous process.
    pub async fn recover_interrupted_session(&self) -> Result<Option<String>> {
        match self.get_incomplete_focus_session().await? {
            Some(session) => {
                self.mark_focus_session_interrupted(&session.id, Utc::now())
                    .await?;
                Ok(Some(session.id))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn session_lifecycle_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let started = Utc::now();
        let session = FocusSession::start("s-1".into(), started);

        db.insert_focus_session(&session).await.unwrap();
        db.record_session_alert("s-1", started).unwrap();
        db.record_session_alert("s-1", started).unwrap();
        db.finish_focus_session("s-1", started + Duration::seconds(30), 120, 40)
            .await
            .unwrap();

        let listed = db.list_focus_sessions(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        let stored = &listed[0];
        assert_eq!(stored.id, "s-1");
        assert_eq!(stored.status, SessionStatus::Completed);
        assert_eq!(stored.alert_count, 2);
        assert_eq!(stored.concentrated_frames, 120);
        assert_eq!(stored.distracted_frames, 40);
        assert!(stored.stopped_at.is_some());
    }

    #[tokio::test]
    async fn running_session_is_recovered_as_interrupted() {
        crate::utils::logging::init_test_logging();
        let db = Database::open_in_memory().unwrap();
        db.insert_focus_session(&FocusSession::start("crashed".into(), Utc::now()))
            .await
            .unwrap();

        assert!(db.list_focus_sessions(10).await.unwrap().is_empty());
        assert_eq!(
            db.recover_interrupted_session().await.unwrap().as_deref(),
            Some("crashed")
        );
        assert_eq!(db.recover_interrupted_session().await.unwrap(), None);

        let listed = db.list_focus_sessions(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "crashed");
        assert_eq!(listed[0].status, SessionStatus::Interrupted);
    }
}
