//! CRUD service layer.
//!
//! [`CrudService`] compiles criteria with the
//! [`CriteriaCompiler`](crate::criteria::CriteriaCompiler), hands the
//! resulting queries to a [`Repository`], and wraps every write in a
//! transaction with [`LifecycleEvent`] hooks around it.

pub mod entity;
pub mod error;
pub mod events;
pub mod repository;
#[allow(clippy::module_inception)]
pub mod service;

pub use entity::{Entity, Payload, Record};
pub use error::{ServiceError, ServiceResult};
pub use events::{EventArgs, EventDispatcher, LifecycleEvent, LifecycleListener};
pub use repository::{Paging, Repository, TransactionState};
pub use service::{CrudService, DeleteResponse, ReadAllResponse, ReadResponse, ReadTarget};
