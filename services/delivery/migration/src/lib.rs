use sea_orm_migration::prelude::*;

mod m20261001_000001_create_outbox_events;
mod m20261001_000002_create_claim_outbox_events_fn;
mod m20261001_000003_create_payments;
mod m20261001_000004_create_admission_drafts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_outbox_events::Migration),
            Box::new(m20261001_000002_create_claim_outbox_events_fn::Migration),
            Box::new(m20261001_000003_create_payments::Migration),
            Box::new(m20261001_000004_create_admission_drafts::Migration),
        ]
    }
}
