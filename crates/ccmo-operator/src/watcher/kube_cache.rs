use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use futures::StreamExt;
use kube::{
    api::{Api, DynamicObject},
    runtime::watcher,
    Client,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    error::{OperatorError, OperatorResult},
    k8s::ResourceKind,
    watcher::{EventHandler, Informer, InformerCache, InformerEvent},
};

/// Informers backed by API watches. Namespaced kinds are watched in the managed namespace
/// only.
pub struct KubeInformerCache {
    client: Client,
    namespace: String,
    informers: Mutex<HashMap<ResourceKind, Arc<KubeInformer>>>,
}

impl KubeInformerCache {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            informers: Mutex::new(HashMap::new()),
        }
    }

    fn api_for(&self, kind: ResourceKind) -> Api<DynamicObject> {
        let ar = kind.api_resource();
        if kind.is_namespaced() {
            Api::namespaced_with(self.client.clone(), &self.namespace, &ar)
        } else {
            Api::all_with(self.client.clone(), &ar)
        }
    }
}

#[async_trait]
impl InformerCache for KubeInformerCache {
    async fn get_informer(&self, kind: ResourceKind) -> OperatorResult<Arc<dyn Informer>> {
        let mut informers = self.informers.lock().await;
        if let Some(informer) = informers.get(&kind) {
            return Ok(informer.clone());
        }
        let informer = Arc::new(KubeInformer::default());
        tokio::spawn(run_informer(kind, self.api_for(kind), informer.clone()));
        informers.insert(kind, informer.clone());
        Ok(informer)
    }
}

#[derive(Default)]
pub struct KubeInformer {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl KubeInformer {
    fn handlers(&self) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .read()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    async fn dispatch(&self, event: InformerEvent) {
        for handler in self.handlers() {
            handler.handle(event.clone()).await;
        }
    }
}

impl Informer for KubeInformer {
    fn add_event_handler(&self, handler: Arc<dyn EventHandler>) -> OperatorResult<()> {
        self.handlers
            .write()
            .map_err(|e| OperatorError::Runtime(anyhow::anyhow!("informer handlers poisoned: {e}")))?
            .push(handler);
        Ok(())
    }
}

fn object_key(obj: &DynamicObject) -> (Option<String>, String) {
    (
        obj.metadata.namespace.clone(),
        obj.metadata.name.clone().unwrap_or_default(),
    )
}

/// Turns the raw watch stream into add/update/delete events by remembering the last seen
/// version of every object.
async fn run_informer(kind: ResourceKind, api: Api<DynamicObject>, informer: Arc<KubeInformer>) {
    let mut known: HashMap<(Option<String>, String), DynamicObject> = HashMap::new();
    let mut stream = watcher(api, watcher::Config::default()).boxed();

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!(kind = %kind.group_kind(), "Watch stream error: {e}");
                continue;
            }
        };
        match event {
            watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
                let informer_event = match known.insert(object_key(&obj), obj.clone()) {
                    Some(old) => InformerEvent::Updated { old, new: obj },
                    None => InformerEvent::Added(obj),
                };
                informer.dispatch(informer_event).await;
            }
            watcher::Event::Delete(obj) => {
                known.remove(&object_key(&obj));
                informer.dispatch(InformerEvent::Deleted(obj)).await;
            }
            watcher::Event::Init | watcher::Event::InitDone => {}
        }
    }
    debug!(kind = %kind.group_kind(), "Watch stream ended");
}
