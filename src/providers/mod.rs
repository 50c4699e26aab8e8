//! Outbound provider clients: Stripe, bulk email, object storage.

pub mod email;
pub mod object_store;
pub mod stripe;
