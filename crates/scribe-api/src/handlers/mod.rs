//! HTTP handlers
//!
//! Author: hephaex@gmail.com

pub mod auth;
pub mod health;
pub mod users;
