//! Database layer for churnlens
//!
//! This module provides the storage layer using SQLite with:
//! - Idempotent table creation inside a named schema
//! - Repository pattern for queries
//! - Dependency-ordered teardown

pub mod repo;
pub mod schema;

pub use repo::{Database, EventTypeCounts};
pub use schema::{SchemaName, Table};
