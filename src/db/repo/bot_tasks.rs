//! Bot program task operations for the repository.

use crate::domain::{AccountId, BotTask, SongId, TimeMs};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::{opt_time, Repository};

impl Repository {
    pub async fn insert_bot_task(&self, task: &BotTask) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO bot_tasks (id, listener_id, song_id, coins_awarded, completed, created_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.id)
        .bind(task.listener_id.as_str())
        .bind(task.song_id.as_str())
        .bind(task.coins_awarded)
        .bind(task.completed)
        .bind(task.created_at.as_ms())
        .bind(task.completed_at.map(|t| t.as_ms()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Flip a task to completed. Returns false if it was already completed or
    /// does not belong to `listener_id`.
    pub async fn mark_bot_task_completed(
        conn: &mut SqliteConnection,
        task_id: &str,
        listener_id: &AccountId,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE bot_tasks
            SET completed = 1, completed_at = ?
            WHERE id = ? AND listener_id = ? AND completed = 0
            "#,
        )
        .bind(now.as_ms())
        .bind(task_id)
        .bind(listener_id.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn load_bot_task(
        conn: &mut SqliteConnection,
        task_id: &str,
    ) -> Result<Option<BotTask>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, listener_id, song_id, coins_awarded, completed, created_at, completed_at
            FROM bot_tasks
            WHERE id = ?
            "#,
        )
        .bind(task_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.as_ref().map(task_from_row))
    }

    pub async fn get_bot_task(&self, task_id: &str) -> Result<Option<BotTask>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::load_bot_task(&mut conn, task_id).await
    }

    /// Tasks of a listener, oldest first.
    pub async fn list_bot_tasks(&self, listener_id: &AccountId) -> Result<Vec<BotTask>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, listener_id, song_id, coins_awarded, completed, created_at, completed_at
            FROM bot_tasks
            WHERE listener_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(listener_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(task_from_row).collect())
    }
}

fn task_from_row(row: &SqliteRow) -> BotTask {
    BotTask {
        id: row.get("id"),
        listener_id: AccountId::new(row.get::<String, _>("listener_id")),
        song_id: SongId::new(row.get::<String, _>("song_id")),
        coins_awarded: row.get("coins_awarded"),
        completed: row.get::<i64, _>("completed") != 0,
        created_at: TimeMs::new(row.get("created_at")),
        completed_at: opt_time(row.get("completed_at")),
    }
}
