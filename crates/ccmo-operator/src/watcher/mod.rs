//! Watches on individual applied objects. Every object the operator applies is registered
//! once, and any later change to it wakes the ClusterOperator reconciler through a single
//! event stream.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use kube::api::DynamicObject;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::{
    error::{OperatorError, OperatorResult},
    k8s::ResourceKind,
};

pub mod kube_cache;

pub use kube_cache::KubeInformerCache;

/// Tells the reconciler that a watched object changed. `key` is `GroupKind/name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub key: String,
}

#[derive(Debug, Clone)]
pub enum InformerEvent {
    Added(DynamicObject),
    Updated { old: DynamicObject, new: DynamicObject },
    Deleted(DynamicObject),
}

impl InformerEvent {
    fn object(&self) -> &DynamicObject {
        match self {
            InformerEvent::Added(obj) | InformerEvent::Deleted(obj) => obj,
            InformerEvent::Updated { new, .. } => new,
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: InformerEvent);
}

/// A shared stream of events for one kind of object.
#[cfg_attr(test, automock)]
pub trait Informer: Send + Sync {
    fn add_event_handler(&self, handler: Arc<dyn EventHandler>) -> OperatorResult<()>;
}

/// Hands out one shared informer per kind.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InformerCache: Send + Sync {
    async fn get_informer(&self, kind: ResourceKind) -> OperatorResult<Arc<dyn Informer>>;
}

/// Resolves the watch key of a typed object, `Kind.group/name`.
pub fn watch_key(obj: &DynamicObject) -> OperatorResult<(ResourceKind, String)> {
    let types = obj.types.as_ref().ok_or_else(|| {
        OperatorError::SchemeResolution("object carries no apiVersion and kind".to_string())
    })?;
    let kind = ResourceKind::from_type_meta(&types.api_version, &types.kind).ok_or_else(|| {
        OperatorError::SchemeResolution(format!(
            "no kind {} is registered for version {}",
            types.kind, types.api_version
        ))
    })?;
    let name = obj.metadata.name.as_deref().unwrap_or_default();
    Ok((kind, format!("{}/{}", kind.group_kind(), name)))
}

pub struct ObjectWatcher {
    cache: Arc<dyn InformerCache>,
    watched: Mutex<HashSet<String>>,
    events_tx: mpsc::Sender<WatchEvent>,
    events_rx: std::sync::Mutex<Option<mpsc::Receiver<WatchEvent>>>,
}

impl ObjectWatcher {
    pub fn new(cache: Arc<dyn InformerCache>) -> Self {
        // Capacity 1: a handler waits until the reconciler picked up the previous event.
        let (events_tx, events_rx) = mpsc::channel(1);
        Self {
            cache,
            watched: Mutex::new(HashSet::new()),
            events_tx,
            events_rx: std::sync::Mutex::new(Some(events_rx)),
        }
    }

    /// Registers a watch on `obj`. Objects already watched are skipped.
    pub async fn watch(&self, obj: &DynamicObject) -> OperatorResult<()> {
        let (kind, key) = watch_key(obj)?;

        let mut watched = self.watched.lock().await;
        if watched.contains(&key) {
            return Ok(());
        }

        let informer = self.cache.get_informer(kind).await?;
        let handler = NameFilteredHandler {
            key: key.clone(),
            name: obj.metadata.name.clone().unwrap_or_default(),
            namespace: obj.metadata.namespace.clone(),
            namespaced: kind.is_namespaced(),
            events: self.events_tx.clone(),
        };
        informer.add_event_handler(Arc::new(handler))?;

        info!(key = %key, "Watching applied object");
        watched.insert(key);
        Ok(())
    }

    /// Receiver side of the change notifications. Can be taken once.
    pub fn event_stream(&self) -> Option<mpsc::Receiver<WatchEvent>> {
        self.events_rx
            .lock()
            .map(|mut rx| rx.take())
            .unwrap_or_default()
    }
}

/// Forwards changes to a single object and drops no-op updates.
struct NameFilteredHandler {
    key: String,
    name: String,
    namespace: Option<String>,
    namespaced: bool,
    events: mpsc::Sender<WatchEvent>,
}

impl NameFilteredHandler {
    fn matches(&self, obj: &DynamicObject) -> bool {
        obj.metadata.name.as_deref() == Some(self.name.as_str())
            && (!self.namespaced || obj.metadata.namespace == self.namespace)
    }
}

/// Copy without the fields the API server bumps on every write.
fn without_bookkeeping(obj: &DynamicObject) -> DynamicObject {
    let mut obj = obj.clone();
    obj.metadata.managed_fields = None;
    obj.metadata.resource_version = None;
    obj
}

#[async_trait]
impl EventHandler for NameFilteredHandler {
    async fn handle(&self, event: InformerEvent) {
        if !self.matches(event.object()) {
            return;
        }
        if let InformerEvent::Updated { old, new } = &event {
            if without_bookkeeping(old) == without_bookkeeping(new) {
                return;
            }
        }
        debug!(key = %self.key, "Watched object changed");
        if self
            .events
            .send(WatchEvent {
                key: self.key.clone(),
            })
            .await
            .is_err()
        {
            debug!(key = %self.key, "Watch event stream closed");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Keeps registered handlers so tests can replay events through them.
    #[derive(Default)]
    pub struct RecordingInformer {
        pub handlers: std::sync::Mutex<Vec<Arc<dyn EventHandler>>>,
    }

    impl RecordingInformer {
        pub fn handler_count(&self) -> usize {
            self.handlers.lock().unwrap().len()
        }

        pub async fn emit(&self, event: InformerEvent) {
            let handlers = self.handlers.lock().unwrap().clone();
            for handler in handlers {
                handler.handle(event.clone()).await;
            }
        }
    }

    impl Informer for RecordingInformer {
        fn add_event_handler(&self, handler: Arc<dyn EventHandler>) -> OperatorResult<()> {
            self.handlers.lock().unwrap().push(handler);
            Ok(())
        }
    }

    /// Cache handing out one recording informer for every kind.
    pub struct RecordingCache {
        pub informer: Arc<RecordingInformer>,
    }

    impl Default for RecordingCache {
        fn default() -> Self {
            Self {
                informer: Arc::new(RecordingInformer::default()),
            }
        }
    }

    #[async_trait]
    impl InformerCache for RecordingCache {
        async fn get_informer(&self, _kind: ResourceKind) -> OperatorResult<Arc<dyn Informer>> {
            Ok(self.informer.clone())
        }
    }
}
