//! Repository seam and transaction bookkeeping.
//!
//! The service never talks to a database. A [`Repository`] implementation
//! executes compiled queries and persists entities; the service decides when
//! transactions begin, commit and roll back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::error::ServiceResult;
use crate::schema::EntityMeta;
use crate::sql::CompiledQuery;

/// A page of results. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub page: u64,
    pub per_page: u64,
}

impl Paging {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self {
            page: page.max(1),
            per_page,
        }
    }

    /// Rows to skip before this page.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

/// Persistence for one entity type.
///
/// Write methods return the number of affected rows.
#[async_trait]
pub trait Repository: Send + Sync {
    type Entity: Entity;

    /// Metadata of the managed entity.
    fn metadata(&self) -> &EntityMeta;

    /// A blank entity for inserts.
    fn new_entity(&self) -> Self::Entity;

    async fn begin_transaction(&self) -> ServiceResult<()>;
    async fn commit(&self) -> ServiceResult<()>;
    async fn rollback(&self) -> ServiceResult<()>;

    /// Push pending changes.
    async fn flush(&self) -> ServiceResult<()>;

    async fn find_all(&self, query: &CompiledQuery) -> ServiceResult<Vec<Self::Entity>>;

    async fn paginate(
        &self,
        query: &CompiledQuery,
        paging: Paging,
    ) -> ServiceResult<Vec<Self::Entity>>;

    async fn find_one(&self, query: &CompiledQuery) -> ServiceResult<Option<Self::Entity>>;

    /// Insert `entity`, writing back any generated key.
    async fn insert(&self, entity: &mut Self::Entity) -> ServiceResult<u64>;

    async fn update(&self, entity: &Self::Entity, query: &CompiledQuery) -> ServiceResult<u64>;

    async fn delete(&self, entity: &Self::Entity) -> ServiceResult<u64>;
}

// =============================================================================
// Transactions
// =============================================================================

/// Nesting depth and rollback-only flag of the current transaction.
///
/// Commit only when a transaction is active and not marked rollback-only.
/// Roll back only when one is active. Rolling back a nested level marks
/// the outer levels rollback-only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionState {
    depth: u32,
    rollback_only: bool,
}

impl TransactionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) {
        self.depth += 1;
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn mark_rollback_only(&mut self) {
        if self.is_active() {
            self.rollback_only = true;
        }
    }

    pub fn can_commit(&self) -> bool {
        self.is_active() && !self.rollback_only
    }

    pub fn can_rollback(&self) -> bool {
        self.is_active()
    }

    pub fn committed(&mut self) {
        self.leave();
    }

    pub fn rolled_back(&mut self) {
        if self.depth > 1 {
            self.rollback_only = true;
        }
        self.leave();
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.rollback_only = false;
        }
    }
}
