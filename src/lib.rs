#![doc = "The `taskdeck` library crate."]
#![doc = ""]
#![doc = "Accounts with an email-verified credential lifecycle (signup, verification, login,"]
#![doc = "password change and reset, JWT sessions) and per-user task records, served as a"]
#![doc = "REST/JSON API. The binary (`main.rs`) builds the `App` from `routes::config`."]

pub mod auth;
pub mod config;
pub mod error;
pub mod mail;
pub mod models;
pub mod rate_limit;
pub mod resource;
pub mod routes;
pub mod state;
pub mod store;

pub use crate::config::Config;
pub use crate::error::AppError;
pub use crate::state::AppState;
