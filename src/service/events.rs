//! Lifecycle events fired around create, update and delete.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use super::entity::{Entity, Payload};
use super::error::ServiceResult;

/// Points in an entity's lifecycle where listeners run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Before the payload is copied onto the entity.
    ExchangeArray,
    /// After the copy, before validation.
    Validate,
    /// Inside the transaction, before insert or update.
    BeforeSave,
    /// Inside the transaction, after insert or update.
    AfterSave,
    /// Inside the transaction, before delete.
    BeforeDelete,
    /// Inside the transaction, after delete.
    AfterDelete,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 6] = [
        LifecycleEvent::ExchangeArray,
        LifecycleEvent::Validate,
        LifecycleEvent::BeforeSave,
        LifecycleEvent::AfterSave,
        LifecycleEvent::BeforeDelete,
        LifecycleEvent::AfterDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::ExchangeArray => "onExchangeArray",
            LifecycleEvent::Validate => "onValidate",
            LifecycleEvent::BeforeSave => "onBeforeSave",
            LifecycleEvent::AfterSave => "onAfterSave",
            LifecycleEvent::BeforeDelete => "onBeforeDelete",
            LifecycleEvent::AfterDelete => "onAfterDelete",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared with listeners for one operation.
///
/// For deletes `payload` and `post` are empty.
#[derive(Debug, Clone)]
pub struct EventArgs<E> {
    pub is_new: bool,
    /// The payload as received.
    pub payload: Payload,
    /// The payload restricted to the entity's properties. Listeners may
    /// rewrite it before [`LifecycleEvent::ExchangeArray`] returns.
    pub post: Payload,
    pub entity: E,
    /// Snapshot of the entity before any change.
    pub master: E,
    /// Set once the repository reported its affected rows.
    pub success: Option<bool>,
}

impl<E: Entity> EventArgs<E> {
    pub fn new(entity: E, payload: Payload, is_new: bool) -> Self {
        let post = payload
            .iter()
            .filter(|(field, _)| entity.has_property(field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        Self {
            is_new,
            payload,
            post,
            master: entity.clone(),
            entity,
            success: None,
        }
    }
}

/// Reacts to lifecycle events. An error aborts the operation.
#[async_trait]
pub trait LifecycleListener<E: Entity>: Send + Sync {
    async fn handle(&self, event: LifecycleEvent, args: &mut EventArgs<E>) -> ServiceResult<()>;
}

/// Listeners per event, run in registration order.
pub struct EventDispatcher<E: Entity> {
    listeners: Vec<(LifecycleEvent, Arc<dyn LifecycleListener<E>>)>,
}

impl<E: Entity> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<E: Entity> fmt::Debug for EventDispatcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<E: Entity> EventDispatcher<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for one event.
    pub fn on(&mut self, event: LifecycleEvent, listener: Arc<dyn LifecycleListener<E>>) -> &mut Self {
        self.listeners.push((event, listener));
        self
    }

    /// Register `listener` for every event.
    pub fn on_all(&mut self, listener: Arc<dyn LifecycleListener<E>>) -> &mut Self {
        for event in LifecycleEvent::ALL {
            self.listeners.push((event, Arc::clone(&listener)));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Run the listeners for `event`, stopping at the first error.
    pub async fn fire(&self, event: LifecycleEvent, args: &mut EventArgs<E>) -> ServiceResult<()> {
        let mut fired = 0usize;
        for (_, listener) in self.listeners.iter().filter(|(e, _)| *e == event) {
            if let Err(err) = listener.handle(event, args).await {
                debug!(event = %event, error = %err, "listener aborted operation");
                return Err(err);
            }
            fired += 1;
        }
        trace!(event = %event, listeners = fired, "fired lifecycle event");
        Ok(())
    }
}
