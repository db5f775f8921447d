//! Credential values, the expiry oracle, and user identity types.

pub mod credential;
pub mod expiry;
pub mod user;

pub use credential::*;
pub use expiry::*;
pub use user::*;
