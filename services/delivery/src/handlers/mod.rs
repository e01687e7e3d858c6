pub mod admission;
pub mod common;
pub mod health;
pub mod outbox;
pub mod payment;
