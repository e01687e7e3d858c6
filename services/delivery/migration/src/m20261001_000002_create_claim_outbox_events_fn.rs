use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::ConnectionTrait;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Atomic dequeue: selects eligible rows with `FOR UPDATE SKIP LOCKED` and flips
/// them to `processing` in the same statement, so concurrent callers never
/// receive the same row. `p_lease_secs` NULL disables reclaiming stale
/// `processing` rows.
const CREATE_CLAIM_FN: &str = r#"
CREATE OR REPLACE FUNCTION claim_outbox_events(
    p_topic TEXT,
    p_limit INTEGER,
    p_now TIMESTAMPTZ,
    p_lease_secs INTEGER
) RETURNS SETOF outbox_events
LANGUAGE sql
AS $$
    WITH due AS (
        SELECT id, COALESCE(next_run_at, created_at) AS due_at
          FROM outbox_events
         WHERE topic = p_topic
           AND (
                (status = 'pending' AND (next_run_at IS NULL OR next_run_at <= p_now))
             OR (p_lease_secs IS NOT NULL
                 AND status = 'processing'
                 AND claimed_at <= p_now - p_lease_secs * INTERVAL '1 second')
           )
         ORDER BY COALESCE(next_run_at, created_at), created_at
         LIMIT p_limit
         FOR UPDATE SKIP LOCKED
    ),
    claimed AS (
        UPDATE outbox_events AS e
           SET status = 'processing',
               attempts = e.attempts + 1,
               next_run_at = NULL,
               claimed_at = p_now
          FROM due
         WHERE e.id = due.id
        RETURNING e.*
    )
    SELECT claimed.*
      FROM claimed
      JOIN due ON due.id = claimed.id
     ORDER BY due.due_at, claimed.created_at
$$;
"#;

const DROP_CLAIM_FN: &str =
    "DROP FUNCTION IF EXISTS claim_outbox_events(TEXT, INTEGER, TIMESTAMPTZ, INTEGER);";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(CREATE_CLAIM_FN)
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DROP_CLAIM_FN)
            .await?;
        Ok(())
    }
}
