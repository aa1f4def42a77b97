//! The identity & authorization engine: password hashing, command-level
//! rule evaluation, the service-token window and first-run bootstrap.
//!
//! The engine holds no durable state of its own — every answer is a
//! function of persistence-layer state plus the inbound principal.

pub mod authorizer;
pub mod bootstrap;
pub mod passwords;
pub mod service;

pub use authorizer::authorize_command;
pub use bootstrap::{bootstrap, BootstrappedUser, DEFAULT_BUNDLE_YAML};
pub use passwords::{generate_password, hash_password, verify_password};
pub use service::{ServiceTokenWindow, SERVICE_TOKEN_ENV};
