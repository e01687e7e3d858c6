use sea_orm::entity::prelude::*;

/// Admission draft awaiting a reservation document.
/// `artifact_path` doubles as the generation mutex: it only goes from NULL to a
/// value through a conditional update.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "admission_drafts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub applicant_name: String,
    pub grade_level: String,
    pub artifact_path: Option<String>,
    pub artifact_ready_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
