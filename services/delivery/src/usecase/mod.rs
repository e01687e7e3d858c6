pub mod idempotency;
pub mod outbox;
pub mod payment;
pub mod provision;
pub mod reservation;
pub mod worker;
