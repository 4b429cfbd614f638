// File: emberbot-core/src/repositories/sqlite/commands.rs

use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::Error;
use crate::models::CustomCommand;
use crate::repositories::CommandRepository;

pub struct SqliteCommandRepository {
    pub pool: Pool<Sqlite>,
}

impl SqliteCommandRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn row_to_command(r: &SqliteRow) -> Result<CustomCommand, Error> {
    let id_text: String = r.try_get("command_id")?;
    let command_id = Uuid::parse_str(&id_text)
        .map_err(|e| Error::Parse(format!("invalid command_id '{id_text}': {e}")))?;
    Ok(CustomCommand {
        command_id,
        command_name: r.try_get("command_name")?,
        content: r.try_get("content")?,
        is_mod_only: r.try_get("is_mod_only")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

#[async_trait]
impl CommandRepository for SqliteCommandRepository {
    async fn upsert_command(&self, cmd: &CustomCommand) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO commands (
                command_id,
                command_name,
                content,
                is_mod_only,
                created_at,
                updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(command_name) DO UPDATE SET
                content = excluded.content,
                is_mod_only = excluded.is_mod_only,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(cmd.command_id.to_string())
        .bind(&cmd.command_name)
        .bind(&cmd.content)
        .bind(cmd.is_mod_only)
        .bind(cmd.created_at)
        .bind(cmd.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_command_by_name(&self, name: &str) -> Result<Option<CustomCommand>, Error> {
        let row_opt = sqlx::query(
            r#"
            SELECT
                command_id,
                command_name,
                content,
                is_mod_only,
                created_at,
                updated_at
            FROM commands
            WHERE command_name = LOWER(?)
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row_opt {
            Some(r) => Ok(Some(row_to_command(&r)?)),
            None => Ok(None),
        }
    }

    async fn delete_command(&self, name: &str) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM commands WHERE command_name = LOWER(?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_commands(&self) -> Result<Vec<CustomCommand>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT
                command_id,
                command_name,
                content,
                is_mod_only,
                created_at,
                updated_at
            FROM commands
            ORDER BY command_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_command).collect()
    }
}
