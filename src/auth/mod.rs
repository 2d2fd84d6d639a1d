//! Authentication module.
//!
//! Owns the user directory and issues/verifies stateless HMAC-signed
//! bearer tokens.

mod authority;
mod user;

pub use authority::TokenAuthority;
pub use user::User;
