pub mod admission_drafts;
pub mod outbox_events;
pub mod payments;
