//! Core types and orchestration for the Merit achievement tracker.
//!
//! An achievement is split across two stores with no shared transaction: a
//! relational *reference* (workflow state) and a *content* document
//! (substance). This crate owns the protocol that keeps them consistent, the
//! approval state machine and role-scoped visibility. It is free of HTTP and
//! database dependencies; backends implement the traits in [`store`].

// Native `async fn` in traits; futures are declared `Send` explicitly.
#![allow(async_fn_in_trait)]

pub mod access;
pub mod achievement;
pub mod error;
pub mod integrity;
pub mod reference;
pub mod service;
pub mod store;
pub mod view;
pub mod visibility;
pub mod workflow;

pub use error::{Error, ErrorKind, Result};
pub use service::AchievementService;

#[cfg(test)]
mod tests;
