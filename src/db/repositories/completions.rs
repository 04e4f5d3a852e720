use anyhow::{Context, Result};
use rusqlite::params;

use crate::{
    db::{helpers::parse_datetime, Database},
    progress::CompletedExercise,
};

impl Database {
    pub async fn insert_completion(&self, exercise_id: &str, record: &CompletedExercise) -> Result<()> {
        let exercise_id = exercise_id.to_string();
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO exercise_completions (id, exercise_id, name, completed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id,
                    exercise_id,
                    record.name,
                    record.completed_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert exercise completion")?;
            Ok(())
        })
        .await
    }

    /// Most recent completions first.
    pub async fn list_completions(&self, limit: u32) -> Result<Vec<CompletedExercise>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, completed_at
                 FROM exercise_completions
                 ORDER BY completed_at DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let completed_at: String = row.get(2)?;
                records.push(CompletedExercise {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    completed_at: parse_datetime(&completed_at, "completed_at")?,
                });
            }
            Ok(records)
        })
        .await
    }
}
