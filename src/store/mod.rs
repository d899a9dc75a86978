//! Storage layer for rules, the execution ledger, events and logs.
//!
//! Backends plug in through [`DbStore`] by registering one [`DbCollection`]
//! per [`StoreIden`]. `MemStore` is the built-in in-memory backend.

pub mod data;
mod db;
pub mod query;
mod store;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter};

use crate::Result;

use query::*;

pub use db::MemStore;
pub use store::{Pagination, RunTimestamps, Store};

/// Identifiers for different storage collections.
#[derive(Debug, Clone, AsRefStr, PartialEq, Hash, Eq, EnumIter)]
pub enum StoreIden {
    /// Rule definitions and their run timestamps.
    #[strum(serialize = "rules")]
    Rules,
    /// The execution ledger, one row per attempt.
    #[strum(serialize = "executions")]
    Executions,
    /// Published tracker events.
    #[strum(serialize = "events")]
    Events,
    /// Log entries.
    #[strum(serialize = "logs")]
    Logs,
}

/// Paginated query result.
#[derive(Debug, Deserialize, Serialize)]
pub struct PageData<T> {
    /// Total number of matching records.
    pub count: usize,
    /// Current page number (1-based).
    pub page_num: usize,
    /// Total number of pages.
    pub page_count: usize,
    /// Number of records per page.
    pub page_size: usize,
    /// Records in the current page.
    pub rows: Vec<T>,
}

/// Trait for types that can identify their storage collection.
pub trait DbCollectionIden {
    /// Returns the collection identifier for this type.
    fn iden() -> StoreIden;
}

/// Trait for database collection operations.
pub trait DbCollection: Send + Sync {
    /// The type of items stored in this collection.
    type Item;

    /// Checks if a record with the given ID exists.
    fn exists(
        &self,
        id: &str,
    ) -> Result<bool>;

    /// Finds a record by ID.
    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item>;

    /// Queries records with pagination and filtering.
    fn query(
        &self,
        query: &Query,
    ) -> Result<PageData<Self::Item>>;

    /// Creates a new record. Returns `false` if the ID is already taken.
    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool>;

    /// Updates an existing record.
    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool>;

    /// Deletes a record by ID.
    fn delete(
        &self,
        id: &str,
    ) -> Result<bool>;

    /// Read-modify-write of one record, atomic with respect to other writers
    /// of the collection. Nothing is written if `f` fails.
    fn transact(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut Self::Item) -> Result<()>,
    ) -> Result<Self::Item>;
}

/// Trait for database store initialization.
pub trait DbStore {
    /// Initializes the database and registers collections with the store.
    fn init(
        &self,
        s: &Store,
    );
}
