use sea_orm::entity::prelude::*;

/// Durable record of an intended side effect, drained by the outbox worker.
/// Unique on (tenant_id, topic, idempotency_key); NULL keys never collide.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "outbox_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub topic: String,
    pub payload: Json,
    pub idempotency_key: Option<String>,
    /// One of `pending`, `processing`, `processed`, `dead`.
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_run_at: Option<chrono::DateTime<chrono::Utc>>,
    pub claimed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub processed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
