//! Request authentication
//!
//! - [`middleware`] classifies requests and validates bearer tokens
//! - [`context`] holds the authenticated caller for one request
//!
//! Author: hephaex@gmail.com

pub mod context;
pub mod middleware;

pub use context::{current_user, UserContext};
pub use middleware::{auth_middleware, Access, AccessPolicy, AuthError};
