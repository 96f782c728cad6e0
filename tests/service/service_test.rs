//! Tests for the CRUD service against an in-memory repository.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sieve::criteria::Criteria;
use sieve::schema::{EntityMeta, Schema};
use sieve::service::{
    CrudService, Entity, EventArgs, LifecycleEvent, LifecycleListener, Paging, Payload, Record,
    Repository, ServiceError, ServiceResult,
};
use sieve::sql::{BinaryOperator, CompiledQuery, Dialect, Expr, LogicalOp, Parameters};
use std::sync::{Arc, Mutex};

// =============================================================================
// In-memory repository
// =============================================================================

struct MemoryRepository {
    meta: EntityMeta,
    records: Mutex<Vec<Record>>,
    calls: Mutex<Vec<&'static str>>,
    wheres: Mutex<Vec<String>>,
    fail_insert: bool,
}

impl MemoryRepository {
    fn new(meta: EntityMeta) -> Self {
        Self {
            meta,
            records: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            wheres: Mutex::new(Vec::new()),
            fail_insert: false,
        }
    }

    fn seeded(meta: EntityMeta) -> Self {
        let repo = Self::new(meta);
        let rows = vec![
            repo.new_entity().with_value("Id", 1).with_value("Name", "alice"),
            repo.new_entity().with_value("Id", 2).with_value("Name", "bob"),
        ];
        *repo.records.lock().unwrap() = rows;
        repo
    }

    fn failing_insert(mut self) -> Self {
        self.fail_insert = true;
        self
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn stored(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    fn where_clauses(&self) -> Vec<String> {
        self.wheres.lock().unwrap().clone()
    }

    /// Rows satisfying the query's WHERE tree; every row when it has none.
    fn matching(&self, query: &CompiledQuery) -> Vec<Record> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                query
                    .where_clause
                    .as_ref()
                    .map_or(true, |expr| satisfies(r, expr, &query.parameters))
            })
            .cloned()
            .collect()
    }

    fn same_key(&self, a: &Record, b: &Record) -> bool {
        self.meta.primary_key.iter().all(|field| a.get(field) == b.get(field))
    }
}

/// Evaluates the equality/AND/OR subset of a WHERE tree against a record.
fn satisfies(record: &Record, expr: &Expr, params: &Parameters) -> bool {
    match expr {
        Expr::Composite { op: LogicalOp::And, parts } => {
            parts.iter().all(|p| satisfies(record, p, params))
        }
        Expr::Composite { op: LogicalOp::Or, parts } => {
            parts.iter().any(|p| satisfies(record, p, params))
        }
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (Expr::Column { column, .. }, Expr::Param(key)) => {
                record.get(column).is_some() && record.get(column) == params.get(key)
            }
            _ => false,
        },
        _ => false,
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    type Entity = Record;

    fn metadata(&self) -> &EntityMeta {
        &self.meta
    }

    fn new_entity(&self) -> Record {
        Record::for_entity(&self.meta).with_required(["Name"])
    }

    async fn begin_transaction(&self) -> ServiceResult<()> {
        self.record("begin");
        Ok(())
    }

    async fn commit(&self) -> ServiceResult<()> {
        self.record("commit");
        Ok(())
    }

    async fn rollback(&self) -> ServiceResult<()> {
        self.record("rollback");
        Ok(())
    }

    async fn flush(&self) -> ServiceResult<()> {
        self.record("flush");
        Ok(())
    }

    async fn find_all(&self, query: &CompiledQuery) -> ServiceResult<Vec<Record>> {
        self.record("find_all");
        Ok(self.matching(query))
    }

    async fn paginate(&self, query: &CompiledQuery, paging: Paging) -> ServiceResult<Vec<Record>> {
        self.record("paginate");
        Ok(self
            .matching(query)
            .into_iter()
            .skip(paging.offset() as usize)
            .take(paging.per_page as usize)
            .collect())
    }

    async fn find_one(&self, query: &CompiledQuery) -> ServiceResult<Option<Record>> {
        self.record("find_one");
        if let Some(expr) = &query.where_clause {
            self.wheres.lock().unwrap().push(expr.to_text(Dialect::Dql));
        }
        Ok(self.matching(query).into_iter().next())
    }

    async fn insert(&self, entity: &mut Record) -> ServiceResult<u64> {
        self.record("insert");
        if self.fail_insert {
            return Err(ServiceError::repository("disk full"));
        }
        let mut records = self.records.lock().unwrap();
        let next = records
            .iter()
            .filter_map(|r| r.get("Id").and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
            + 1;
        if self.meta.has_field("Id") {
            entity.set("Id", next);
        }
        records.push(entity.clone());
        Ok(1)
    }

    async fn update(&self, entity: &Record, _query: &CompiledQuery) -> ServiceResult<u64> {
        self.record("update");
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| self.same_key(r, entity)) {
            Some(slot) => {
                *slot = entity.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, entity: &Record) -> ServiceResult<u64> {
        self.record("delete");
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| !self.same_key(r, entity));
        Ok((before - records.len()) as u64)
    }
}

// =============================================================================
// Listeners
// =============================================================================

#[derive(Default)]
struct Journal {
    seen: Mutex<Vec<LifecycleEvent>>,
}

#[async_trait]
impl LifecycleListener<Record> for Journal {
    async fn handle(&self, event: LifecycleEvent, _args: &mut EventArgs<Record>) -> ServiceResult<()> {
        self.seen.lock().unwrap().push(event);
        Ok(())
    }
}

struct Veto;

#[async_trait]
impl LifecycleListener<Record> for Veto {
    async fn handle(&self, event: LifecycleEvent, _args: &mut EventArgs<Record>) -> ServiceResult<()> {
        Err(ServiceError::listener(event, "vetoed"))
    }
}

struct UppercaseName;

#[async_trait]
impl LifecycleListener<Record> for UppercaseName {
    async fn handle(&self, _event: LifecycleEvent, args: &mut EventArgs<Record>) -> ServiceResult<()> {
        if let Some(Value::String(name)) = args.post.get("Name").cloned() {
            args.post.insert("Name".to_string(), json!(name.to_uppercase()));
        }
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn user_meta() -> EntityMeta {
    EntityMeta::new("App\\Entity\\User")
        .with_fields(["Id", "Name", "Email", "AddedAt", "ModifiedAt"])
        .with_primary_key(["Id"])
}

fn service_for(repo: MemoryRepository) -> (CrudService<MemoryRepository>, Arc<MemoryRepository>) {
    let schema = Schema::new().with_entity(repo.meta.clone()).unwrap();
    let repo = Arc::new(repo);
    (CrudService::new(Arc::clone(&repo), Arc::new(schema)), repo)
}

fn payload(value: Value) -> Payload {
    value.as_object().cloned().unwrap()
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn test_read_by_id() {
    let (service, _) = service_for(MemoryRepository::seeded(user_meta()));
    let response = service.read(2i64).await.unwrap();
    assert!(response.success);
    assert_eq!(response.data.get("Name"), Some(&json!("bob")));
}

#[tokio::test]
async fn test_read_by_numeric_string_id() {
    let (service, _) = service_for(MemoryRepository::seeded(user_meta()));
    let response = service.read("1").await.unwrap();
    assert_eq!(response.data.get("Name"), Some(&json!("alice")));
}

#[tokio::test]
async fn test_read_rejects_invalid_ids_before_querying() {
    let (service, repo) = service_for(MemoryRepository::seeded(user_meta()));
    for id in [json!(0), json!("  "), json!(-4), json!(null)] {
        let err = service.read(id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)), "{err}");
    }
    assert!(repo.calls().is_empty());
}

#[tokio::test]
async fn test_read_by_id_requires_primary_key() {
    let meta = EntityMeta::new("App\\Entity\\Log").with_fields(["Message"]);
    let (service, _) = service_for(MemoryRepository::new(meta));
    let err = service.read(1i64).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid request: App\\Entity\\Log has no primary key"
    );
}

#[tokio::test]
async fn test_read_not_found() {
    let (service, _) = service_for(MemoryRepository::seeded(user_meta()));
    let err = service.read(99i64).await.unwrap_err();
    assert!(
        matches!(&err, ServiceError::NotFound { entity } if entity == "App\\Entity\\User"),
        "{err}"
    );
}

#[tokio::test]
async fn test_read_with_empty_criteria_is_invalid() {
    let (service, _) = service_for(MemoryRepository::seeded(user_meta()));
    let err = service.read(Criteria::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_read_all_with_and_without_paging() {
    let (service, repo) = service_for(MemoryRepository::seeded(user_meta()));

    let all = service.read_all(&Criteria::new(), None).await.unwrap();
    assert_eq!(all.total, 2);
    assert!(all.success);

    let page = service
        .read_all(&Criteria::new(), Some(Paging::new(2, 1)))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].get("Name"), Some(&json!("bob")));

    assert_eq!(repo.calls(), vec!["find_all", "paginate"]);
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn test_create_copies_stamps_and_rereads() {
    let (service, repo) = service_for(MemoryRepository::seeded(user_meta()));
    let response = service
        .create(payload(json!({
            "Name": "carol",
            "ModifiedAt": "2024-05-01",
            "Password": "secret"
        })))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.data.get("Id"), Some(&json!(3)));
    assert_eq!(response.data.get("AddedAt"), Some(&json!("2024-05-01")));
    assert_eq!(response.data.get("Password"), None);
    assert_eq!(
        repo.calls(),
        vec!["begin", "insert", "flush", "commit", "find_one"]
    );
    assert!(!service.transaction_state().await.is_active());
}

#[tokio::test]
async fn test_create_empty_payload_is_invalid() {
    let (service, repo) = service_for(MemoryRepository::seeded(user_meta()));
    let err = service.create(Payload::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)));
    assert!(repo.calls().is_empty());
}

#[tokio::test]
async fn test_create_validation_failure_skips_transaction() {
    let (service, repo) = service_for(MemoryRepository::seeded(user_meta()));
    let err = service
        .create(payload(json!({"Email": "x@example.com"})))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "validation failed: Name is required.");
    assert!(repo.calls().is_empty());
    assert_eq!(repo.stored().len(), 2);
}

#[tokio::test]
async fn test_update_selects_by_primary_key_in_payload() {
    let (service, repo) = service_for(MemoryRepository::seeded(user_meta()));
    let response = service
        .update(payload(json!({"Id": 1, "Name": "alicia"})), None)
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.data.get("Name"), Some(&json!("alicia")));
    assert_eq!(
        repo.calls(),
        vec!["find_one", "begin", "update", "flush", "commit", "find_one"]
    );
}

#[tokio::test]
async fn test_update_with_explicit_criteria() {
    let (service, _) = service_for(MemoryRepository::seeded(user_meta()));
    let criteria = Criteria::new().where_eq([("Id", json!(2))]);
    let response = service
        .update(payload(json!({"Email": "bob@example.com"})), Some(criteria))
        .await
        .unwrap();
    assert_eq!(response.data.get("Name"), Some(&json!("bob")));
    assert_eq!(response.data.get("Email"), Some(&json!("bob@example.com")));
}

#[tokio::test]
async fn test_update_without_key_or_criteria_is_invalid() {
    let (service, _) = service_for(MemoryRepository::seeded(user_meta()));
    let err = service
        .update(payload(json!({"Name": "nobody"})), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_exchange_listener_rewrites_post() {
    let (mut service, repo) = service_for(MemoryRepository::seeded(user_meta()));
    service.on(LifecycleEvent::ExchangeArray, Arc::new(UppercaseName));

    service
        .update(payload(json!({"Id": 2, "Name": "robert"})), None)
        .await
        .unwrap();
    assert_eq!(repo.stored()[1].get("Name"), Some(&json!("ROBERT")));
}

#[tokio::test]
async fn test_listener_error_rolls_back() {
    let (mut service, repo) = service_for(MemoryRepository::seeded(user_meta()));
    service.on(LifecycleEvent::BeforeSave, Arc::new(Veto));

    let err = service
        .create(payload(json!({"Name": "dave"})))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "onBeforeSave listener failed: vetoed");
    assert_eq!(repo.calls(), vec!["begin", "rollback"]);
    assert_eq!(repo.stored().len(), 2);
    assert!(!service.transaction_state().await.is_active());
}

#[tokio::test]
async fn test_repository_error_rolls_back() {
    let (service, repo) = service_for(MemoryRepository::seeded(user_meta()).failing_insert());
    let err = service
        .create(payload(json!({"Name": "erin"})))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Repository(_)));
    assert_eq!(repo.calls(), vec!["begin", "insert", "rollback"]);
}

#[tokio::test]
async fn test_validate_listener_runs_before_transaction() {
    let (mut service, repo) = service_for(MemoryRepository::seeded(user_meta()));
    service.on(LifecycleEvent::Validate, Arc::new(Veto));

    let err = service
        .update(payload(json!({"Id": 1, "Name": "x"})), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Listener { event: LifecycleEvent::Validate, .. }));
    assert_eq!(repo.calls(), vec!["find_one"]);
}

// =============================================================================
// Composite keys
// =============================================================================

fn user_role_meta() -> EntityMeta {
    EntityMeta::new("App\\Entity\\UserRole")
        .with_fields(["UserId", "RoleId", "Name"])
        .with_primary_key(["UserId", "RoleId"])
}

fn user_roles() -> MemoryRepository {
    let repo = MemoryRepository::new(user_role_meta());
    let rows = vec![
        repo.new_entity().with_value("UserId", 1).with_value("RoleId", 1).with_value("Name", "a"),
        repo.new_entity().with_value("UserId", 1).with_value("RoleId", 2).with_value("Name", "b"),
        repo.new_entity().with_value("UserId", 2).with_value("RoleId", 2).with_value("Name", "c"),
    ];
    *repo.records.lock().unwrap() = rows;
    repo
}

#[tokio::test]
async fn test_update_composite_key_matches_every_key_field() {
    let (service, repo) = service_for(user_roles());
    let response = service
        .update(payload(json!({"UserId": 2, "RoleId": 2, "Name": "z"})), None)
        .await
        .unwrap();

    assert_eq!(response.data.get("UserId"), Some(&json!(2)));
    assert_eq!(response.data.get("Name"), Some(&json!("z")));
    let names: Vec<_> = repo.stored().iter().map(|r| r.get("Name").cloned()).collect();
    assert_eq!(names, vec![Some(json!("a")), Some(json!("b")), Some(json!("z"))]);

    // Load and re-read both require every key field
    assert_eq!(
        repo.where_clauses(),
        vec![
            "UserRole.UserId = ?0 AND UserRole.RoleId = ?1",
            "UserRole.UserId = ?0 AND UserRole.RoleId = ?1",
        ]
    );
}

#[tokio::test]
async fn test_update_composite_key_without_full_match_is_not_found() {
    let (service, repo) = service_for(user_roles());
    let err = service
        .update(payload(json!({"UserId": 2, "RoleId": 1, "Name": "z"})), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }), "{err}");
    assert!(!repo.calls().contains(&"update"));
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn test_delete_fires_events_in_order() {
    let (mut service, repo) = service_for(MemoryRepository::seeded(user_meta()));
    let journal = Arc::new(Journal::default());
    service.events_mut().on_all(journal.clone());

    let response = service.delete(1i64).await.unwrap();
    assert!(response.success);
    assert_eq!(
        *journal.seen.lock().unwrap(),
        vec![LifecycleEvent::BeforeDelete, LifecycleEvent::AfterDelete]
    );
    assert_eq!(repo.stored().len(), 1);
    assert_eq!(
        repo.calls(),
        vec!["find_one", "begin", "delete", "flush", "commit"]
    );
}

#[tokio::test]
async fn test_delete_missing_entity() {
    let (service, repo) = service_for(MemoryRepository::seeded(user_meta()));
    let err = service.delete(42i64).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));
    assert_eq!(repo.calls(), vec!["find_one"]);
}

#[tokio::test]
async fn test_save_fires_events_in_order() {
    let (mut service, _) = service_for(MemoryRepository::seeded(user_meta()));
    let journal = Arc::new(Journal::default());
    service.events_mut().on_all(journal.clone());

    service
        .create(payload(json!({"Name": "frank"})))
        .await
        .unwrap();
    assert_eq!(
        *journal.seen.lock().unwrap(),
        vec![
            LifecycleEvent::ExchangeArray,
            LifecycleEvent::Validate,
            LifecycleEvent::BeforeSave,
            LifecycleEvent::AfterSave,
        ]
    );
}
