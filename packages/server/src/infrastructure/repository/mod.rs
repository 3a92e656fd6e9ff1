//! Collaborator adapters.
//!
//! Both adapters implement [`MessageStore`](crate::domain::MessageStore) and
//! [`AccessChecker`](crate::domain::AccessChecker).
//!
//! - `inmemory`: process-local maps, used when no database is configured and in tests
//! - `sqlite`: relational store with parameterized statements

pub mod inmemory;
pub mod sqlite;

pub use inmemory::InMemoryStore;
pub use sqlite::SqliteStore;
