//! SQLite storage for the buildpack index.
//!
//! The schema is managed through embedded diesel migrations; every access
//! goes through [`IndexRepository`].

pub mod connection;
pub mod error;
pub mod migration;
pub mod models;
pub mod repository;
pub mod schema;

pub use connection::DbConnection;
pub use error::{DbError, Result};
pub use models::{IndexedBuildpack, NewBuildpack};
pub use repository::IndexRepository;
