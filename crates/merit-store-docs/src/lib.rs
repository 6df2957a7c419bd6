//! Document store for achievement content.
//!
//! Each achievement's content is one JSON document in its own SQLite file,
//! kept apart from the reference database so the two share no transaction.

mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::DocumentStore;
