//! Schema for the event ledger. Statements are idempotent so startup can run
//! them unconditionally.

use crate::DbPool;

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS slack_event (
        event_id TEXT PRIMARY KEY NOT NULL,
        status TEXT NOT NULL,
        processing_message_ts TEXT,
        last_error TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_slack_event_expires_at ON slack_event (expires_at)",
];

pub async fn run_pending(pool: &DbPool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
