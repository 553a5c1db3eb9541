//! Account registration, login and credential handling.
//!
//! [`credentials::CredentialCodec`] owns every cryptographic primitive,
//! [`store::AccountStore`] is the durable account collaborator and
//! [`session::SessionCore`] runs the register, login and update workflows on
//! top of both. [`api::router`] exposes them under `/auth`.

pub mod api;
pub mod credentials;
pub mod metrics_defs;
pub mod session;
pub mod store;

#[cfg(test)]
mod testutils;
