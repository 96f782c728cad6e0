//! CRUD orchestration over a [`Repository`].
//!
//! Each write runs the same pipeline:
//!
//! ```text
//! load (update/delete) ─▶ onExchangeArray ─▶ exchange ─▶ onValidate ─▶ validate
//!                                                                        │
//!        ┌───────────────────────────────────────────────────────────────┘
//!        ▼
//! begin ─▶ onBeforeSave ─▶ insert/update ─▶ onAfterSave ─▶ commit ─▶ re-read
//!   └──────────────── any error: rollback, propagate ──────────────┘
//! ```
//!
//! A service instance tracks one transaction at a time, like the
//! connection behind its repository.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::entity::{Entity, Payload};
use super::error::{ServiceError, ServiceResult};
use super::events::{EventArgs, EventDispatcher, LifecycleEvent, LifecycleListener};
use super::repository::{Paging, Repository, TransactionState};
use crate::criteria::{
    CompilerOptions, Criteria, CriteriaCompiler, FilterClause, PredicateGroup, PredicateNode,
};
use crate::schema::Schema;
use crate::sql::{table_col, CompiledQuery, Expr, ExprExt};

/// Payload fields copied onto their creation counterparts on create.
const CREATION_STAMPS: [(&str, &str); 2] = [("ModifiedAt", "AddedAt"), ("ModifiedBy", "AddedBy")];

// =============================================================================
// Requests and responses
// =============================================================================

/// What to read: a primary key value or criteria.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadTarget {
    Id(Value),
    Criteria(Criteria),
}

impl From<i64> for ReadTarget {
    fn from(id: i64) -> Self {
        ReadTarget::Id(Value::from(id))
    }
}

impl From<&str> for ReadTarget {
    fn from(id: &str) -> Self {
        ReadTarget::Id(Value::from(id))
    }
}

impl From<Value> for ReadTarget {
    fn from(id: Value) -> Self {
        ReadTarget::Id(id)
    }
}

impl From<Criteria> for ReadTarget {
    fn from(criteria: Criteria) -> Self {
        ReadTarget::Criteria(criteria)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadAllResponse<E> {
    pub data: Vec<E>,
    pub total: usize,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadResponse<E> {
    pub data: E,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

// =============================================================================
// Service
// =============================================================================

/// Read, create, update and delete for one entity type.
pub struct CrudService<R: Repository> {
    repository: Arc<R>,
    compiler: CriteriaCompiler,
    events: EventDispatcher<R::Entity>,
    transaction: Mutex<TransactionState>,
}

impl<R: Repository> CrudService<R> {
    pub fn new(repository: Arc<R>, schema: Arc<Schema>) -> Self {
        let compiler = CriteriaCompiler::new(schema, &repository.metadata().name);
        Self {
            repository,
            compiler,
            events: EventDispatcher::new(),
            transaction: Mutex::new(TransactionState::new()),
        }
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.compiler = self.compiler.with_options(options);
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn compiler(&self) -> &CriteriaCompiler {
        &self.compiler
    }

    /// Register a lifecycle listener.
    pub fn on(
        &mut self,
        event: LifecycleEvent,
        listener: Arc<dyn LifecycleListener<R::Entity>>,
    ) -> &mut Self {
        self.events.on(event, listener);
        self
    }

    pub fn events_mut(&mut self) -> &mut EventDispatcher<R::Entity> {
        &mut self.events
    }

    pub async fn transaction_state(&self) -> TransactionState {
        *self.transaction.lock().await
    }

    fn primary_key(&self) -> &[String] {
        &self.repository.metadata().primary_key
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// All entities matching `criteria`, optionally one page of them.
    pub async fn read_all(
        &self,
        criteria: &Criteria,
        paging: Option<Paging>,
    ) -> ServiceResult<ReadAllResponse<R::Entity>> {
        let query = self.compiler.compile(criteria, None)?;
        let data = match paging {
            Some(paging) => self.repository.paginate(&query, paging).await?,
            None => self.repository.find_all(&query).await?,
        };
        debug!(entity = %self.compiler.entity(), total = data.len(), "read all");
        Ok(ReadAllResponse {
            total: data.len(),
            data,
            success: true,
        })
    }

    /// One entity by primary key value or criteria.
    pub async fn read(&self, target: impl Into<ReadTarget>) -> ServiceResult<ReadResponse<R::Entity>> {
        let (data, _) = self.load(target.into()).await?;
        Ok(ReadResponse {
            data,
            success: true,
        })
    }

    async fn load(&self, target: ReadTarget) -> ServiceResult<(R::Entity, CompiledQuery)> {
        let query = match target {
            ReadTarget::Id(id) => self.query_by_id(&id)?,
            ReadTarget::Criteria(criteria) => {
                if criteria.is_empty() {
                    return Err(ServiceError::invalid("criteria must not be empty"));
                }
                self.compiler.compile(&criteria, None)?
            }
        };

        match self.repository.find_one(&query).await? {
            Some(entity) => Ok((entity, query)),
            None => Err(ServiceError::NotFound {
                entity: self.compiler.entity().to_string(),
            }),
        }
    }

    /// `pk1 = ?0 OR pk2 = ?1 ...` over every primary key field.
    fn query_by_id(&self, id: &Value) -> ServiceResult<CompiledQuery> {
        let id = normalize_id(id)
            .ok_or_else(|| ServiceError::invalid("id must be a positive integer or a non-blank string"))?;

        let primary_key = self.primary_key();
        if primary_key.is_empty() {
            return Err(ServiceError::invalid(format!(
                "{} has no primary key",
                self.compiler.entity()
            )));
        }

        let mut query = self.compiler.new_query();
        let alias = query
            .aliases()
            .first()
            .map(|(alias, _)| alias.to_string())
            .unwrap_or_default();
        for field in primary_key {
            let key = query.bind(id.clone());
            query.or_where(table_col(&alias, field).eq(Expr::Param(key)));
        }
        Ok(query)
    }

    /// Criteria matching every key field `value_of` yields, AND-ed so a
    /// composite key selects a single row.
    fn primary_key_criteria<F>(&self, value_of: F) -> Criteria
    where
        F: Fn(&str) -> Option<Value>,
    {
        let group = self
            .primary_key()
            .iter()
            .filter_map(|field| value_of(field).map(|v| PredicateNode::eq(field, v)))
            .fold(PredicateGroup::new(), PredicateGroup::and);
        if group.is_empty() {
            Criteria::new()
        } else {
            Criteria::new().filter(FilterClause::Predicate(group))
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert a new entity from `payload`.
    pub async fn create(&self, mut payload: Payload) -> ServiceResult<ReadResponse<R::Entity>> {
        if payload.is_empty() {
            return Err(ServiceError::invalid("payload must not be empty"));
        }
        for (from, to) in CREATION_STAMPS {
            if let Some(value) = payload.get(from).filter(|v| !v.is_null()).cloned() {
                payload.insert(to.to_string(), value);
            }
        }
        self.save(payload, None, true).await
    }

    /// Update the entity selected by `criteria`, or by the primary key
    /// fields present in `payload`.
    pub async fn update(
        &self,
        payload: Payload,
        criteria: Option<Criteria>,
    ) -> ServiceResult<ReadResponse<R::Entity>> {
        self.save(payload, criteria, false).await
    }

    async fn save(
        &self,
        payload: Payload,
        criteria: Option<Criteria>,
        is_new: bool,
    ) -> ServiceResult<ReadResponse<R::Entity>> {
        if payload.is_empty() {
            return Err(ServiceError::invalid("payload must not be empty"));
        }

        let (entity, query) = if is_new {
            (self.repository.new_entity(), None)
        } else {
            let criteria = criteria.unwrap_or_else(|| {
                self.primary_key_criteria(|field| payload.get(field).filter(|v| !v.is_null()).cloned())
            });
            let (entity, query) = self.load(ReadTarget::Criteria(criteria)).await?;
            (entity, Some(query))
        };

        let mut args = EventArgs::new(entity, payload, is_new);
        self.events.fire(LifecycleEvent::ExchangeArray, &mut args).await?;
        args.entity.exchange(&args.post);
        self.events.fire(LifecycleEvent::Validate, &mut args).await?;

        let errors = args.entity.validate();
        if !errors.is_empty() {
            debug!(entity = %self.compiler.entity(), errors = errors.len(), "validation failed");
            return Err(ServiceError::Validation(errors));
        }

        self.begin().await?;
        if let Err(err) = self.persist(&mut args, query.as_ref()).await {
            self.rollback().await;
            return Err(err);
        }

        let success = args.success.unwrap_or(false);
        let criteria = self.primary_key_criteria(|field| {
            Some(args.entity.get(field).cloned().unwrap_or(Value::Null))
        });
        if criteria.is_empty() {
            // No key to re-read by
            return Ok(ReadResponse {
                data: args.entity,
                success,
            });
        }

        let mut response = self.read(criteria).await?;
        response.success = success;
        Ok(response)
    }

    async fn persist(
        &self,
        args: &mut EventArgs<R::Entity>,
        query: Option<&CompiledQuery>,
    ) -> ServiceResult<()> {
        self.events.fire(LifecycleEvent::BeforeSave, args).await?;
        let affected = match query {
            None => self.repository.insert(&mut args.entity).await?,
            Some(query) => self.repository.update(&args.entity, query).await?,
        };
        args.success = Some(affected != 0);
        self.events.fire(LifecycleEvent::AfterSave, args).await?;
        self.commit().await
    }

    /// Delete one entity by primary key value or criteria.
    pub async fn delete(&self, target: impl Into<ReadTarget>) -> ServiceResult<DeleteResponse> {
        let (entity, _) = self.load(target.into()).await?;
        let mut args = EventArgs::new(entity, Payload::new(), false);

        self.begin().await?;
        if let Err(err) = self.remove(&mut args).await {
            self.rollback().await;
            return Err(err);
        }

        Ok(DeleteResponse {
            success: args.success.unwrap_or(false),
        })
    }

    async fn remove(&self, args: &mut EventArgs<R::Entity>) -> ServiceResult<()> {
        self.events.fire(LifecycleEvent::BeforeDelete, args).await?;
        let affected = self.repository.delete(&args.entity).await?;
        args.success = Some(affected != 0);
        self.events.fire(LifecycleEvent::AfterDelete, args).await?;
        self.commit().await
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    async fn begin(&self) -> ServiceResult<()> {
        let mut tx = self.transaction.lock().await;
        self.repository.begin_transaction().await?;
        tx.begin();
        Ok(())
    }

    async fn commit(&self) -> ServiceResult<()> {
        let mut tx = self.transaction.lock().await;
        if !tx.is_active() {
            debug!("no active transaction, skipping commit");
            return Ok(());
        }
        if !tx.can_commit() {
            return Err(ServiceError::repository("transaction is marked rollback-only"));
        }
        self.repository.flush().await?;
        self.repository.commit().await?;
        tx.committed();
        Ok(())
    }

    async fn rollback(&self) {
        let mut tx = self.transaction.lock().await;
        if !tx.can_rollback() {
            return;
        }
        if let Err(err) = self.repository.rollback().await {
            warn!(error = %err, "rollback failed");
        }
        tx.rolled_back();
    }
}

/// A positive integer, or a non-blank string that is not numeric.
fn normalize_id(id: &Value) -> Option<Value> {
    match id {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .filter(|n| *n >= 1)
            .map(Value::from),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(n) if n >= 1 => Some(Value::from(n)),
                Ok(_) => None,
                Err(_) if s.is_empty() => None,
                Err(_) => Some(Value::from(s)),
            }
        }
        _ => None,
    }
}
