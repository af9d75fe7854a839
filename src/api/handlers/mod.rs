//! Control surface handlers.
//!
//! Everything here sits behind [`auth::access_gate`]; handlers read the
//! caller from the `Identity` request extension when they need it.

pub mod auth;
pub mod health;
pub mod profile;
pub mod root;
