//! Request identity types shared by Campus services.
//!
//! `identity` carries the gateway-injected tenant and user; `worker` guards the
//! internal trigger endpoints that only the scheduler may call.

pub mod identity;
pub mod worker;
