//! PtlClient: the batching request queue and the owner of the remote mirror.
//!
//! # How a request travels (for beginners)
//!
//! 1. A caller (the client itself or a mirror node) calls
//!    [`PtlClient::make_request`].  The action is pushed onto the buffer
//!    *before* the call returns, together with a one-shot reply channel.
//! 2. When the client is not buffering, the returned future flushes the
//!    buffer the first time it is polled.  Requests made back to back and
//!    awaited together therefore travel in one batch.
//! 3. [`PtlClient::flush_buffer`] swaps the buffer for an empty one, posts
//!    the actions as one envelope and processes the response: the context is
//!    merged, patches are applied to the mirror, and every reply channel
//!    receives its positional outcome.
//!
//! Overlapping flushes queue behind an async gate, so responses are
//! processed in the order the batches were taken from the buffer.  Hook
//! listeners run after the gate is released and may issue requests of their
//! own.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use ptl_core::{
    request_tag, response_tag, Action, ActionOutcome, LayerSync, Patch, PropertySync, PtlError,
    RequestEnvelope, ResponseEnvelope, TypeRegistry, VarType, WILDCARD_LAYER,
};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use super::hooks::{HookEvent, HookListener, Hooks};
use super::transport::Transport;
use crate::domain::{
    ClientConfig, ClientError, ClientResult, Link, MirrorScope, PropertyFactories, RemoteLayer,
    RemoteProperty, Requester,
};
use crate::infrastructure::http_transport::HttpTransport;

/// An action waiting in the buffer.
struct Pending {
    action: Action,
    reply: oneshot::Sender<ClientResult<Value>>,
}

/// State shared by every clone of a [`PtlClient`] and, weakly, by its mirror.
struct ClientShared {
    me: Weak<ClientShared>,
    url: String,
    version: String,
    transport: Arc<dyn Transport>,
    types: RwLock<TypeRegistry>,
    factories: RwLock<PropertyFactories>,
    layers: RwLock<Vec<Arc<RemoteLayer>>>,
    context: Mutex<Map<String, Value>>,
    buffer: Mutex<Vec<Pending>>,
    buffering: AtomicBool,
    flush_gate: tokio::sync::Mutex<()>,
    hooks: Hooks,
}

/// A Projectile client.
///
/// Cheap to clone; clones share the buffer, context and mirror.
#[derive(Clone)]
pub struct PtlClient {
    shared: Arc<ClientShared>,
}

impl PtlClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let shared = Arc::new_cyclic(|me| ClientShared {
            me: me.clone(),
            url: config.url,
            version: config.protocol_version,
            transport,
            types: RwLock::new(TypeRegistry::with_builtins()),
            factories: RwLock::new(PropertyFactories::with_builtins()),
            layers: RwLock::new(Vec::new()),
            context: Mutex::new(Map::new()),
            buffer: Mutex::new(Vec::new()),
            buffering: AtomicBool::new(false),
            flush_gate: tokio::sync::Mutex::new(()),
            hooks: Hooks::default(),
        });
        Self { shared }
    }

    /// A client posting over HTTP with `reqwest`.
    pub fn http(config: ClientConfig) -> Self {
        Self::new(config, Arc::new(HttpTransport::default()))
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn version(&self) -> &str {
        &self.shared.version
    }

    // ── Requests ──────────────────────────────────────────────────────────────

    /// Queues `action` and returns the future of its outcome.
    ///
    /// The action is in the buffer when this returns.  Whether the future
    /// flushes is decided when it is first polled: while buffering, it only
    /// resolves after [`stop_buffering_and_flush`] or [`flush_buffer`] sends
    /// it.
    ///
    /// [`stop_buffering_and_flush`]: Self::stop_buffering_and_flush
    /// [`flush_buffer`]: Self::flush_buffer
    pub fn make_request(&self, action: Action) -> BoxFuture<'static, ClientResult<Value>> {
        self.shared.request(action)
    }

    /// `get` of `"<layer>/<path>"`.
    pub fn get_property_value(&self, full_name: &str) -> BoxFuture<'static, ClientResult<Value>> {
        self.make_request(Action::get(full_name))
    }

    /// `set` of `"<layer>/<path>"`.
    pub fn set_property_value(
        &self,
        full_name: &str,
        value: Value,
    ) -> BoxFuture<'static, ClientResult<Value>> {
        self.make_request(Action::set(full_name, value))
    }

    /// `call` of `"<layer>/<method>"`.
    pub fn call(&self, method_name: &str, args: Vec<Value>) -> BoxFuture<'static, ClientResult<Value>> {
        self.make_request(Action::call(method_name, args))
    }

    pub fn start_buffering(&self) {
        self.shared.buffering.store(true, Ordering::SeqCst);
    }

    pub fn is_buffering(&self) -> bool {
        self.shared.buffering.load(Ordering::SeqCst)
    }

    /// Leaves buffering mode and sends everything queued so far.
    pub fn stop_buffering_and_flush(&self) -> BoxFuture<'static, ClientResult<Vec<ActionOutcome>>> {
        self.shared.buffering.store(false, Ordering::SeqCst);
        self.flush_buffer()
    }

    /// Takes every queued action and sends them as one batch.
    ///
    /// The buffer is emptied when this is called, not when the future runs.
    /// An empty buffer sends nothing and resolves to an empty list.
    ///
    /// # Errors
    ///
    /// Transport failures, a foreign protocol tag, patch failures and
    /// whole-batch rejections.  Every caller in the batch receives the same
    /// error.
    pub fn flush_buffer(&self) -> BoxFuture<'static, ClientResult<Vec<ActionOutcome>>> {
        self.shared.flush()
    }

    // ── Mirror ────────────────────────────────────────────────────────────────

    /// Fetches every exposed layer and (re)builds its mirror.
    ///
    /// # Errors
    ///
    /// Request failures, unknown property tags and unknown variable types.
    pub async fn sync(&self) -> ClientResult<Vec<Arc<RemoteLayer>>> {
        let data = self.make_request(Action::sync(WILDCARD_LAYER)).await?;
        let synced: Vec<LayerSync> =
            serde_json::from_value(data).map_err(|e| ClientError::Decode(e.to_string()))?;
        let layers = self.shared.mirror(&synced)?;
        info!(
            layers = layers.len(),
            "synced {}",
            layers.iter().map(|l| l.name()).collect::<Vec<_>>().join(", ")
        );
        Ok(layers)
    }

    pub fn layer(&self, name: &str) -> Option<Arc<RemoteLayer>> {
        self.shared
            .layers
            .read()
            .iter()
            .find(|l| l.name() == name)
            .cloned()
    }

    pub fn layers(&self) -> Vec<Arc<RemoteLayer>> {
        self.shared.layers.read().clone()
    }

    /// Mirror node at `"<layer>/<dotted.path>"`.
    ///
    /// # Errors
    ///
    /// [`PtlError::NotFound`] when the layer or the path is unknown.
    pub fn property(&self, full_name: &str) -> ClientResult<RemoteProperty> {
        let (layer_name, path) = full_name.split_once('/').unwrap_or((full_name, ""));
        let layer = self.layer(layer_name).ok_or_else(|| {
            PtlError::NotFound(format!("Layer \"{layer_name}\" is not synced"))
        })?;
        layer.get_property(path).cloned()
    }

    // ── Registries ────────────────────────────────────────────────────────────

    /// Adds a variable type.  Takes effect on the next [`sync`](Self::sync).
    pub fn register_type(&self, ty: VarType) {
        self.shared.types.write().register(ty);
    }

    /// Adds a type given by a predicate.
    pub fn register_type_fn<F>(&self, name: impl Into<String>, check: F)
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.shared.types.write().register_fn(name, check);
    }

    /// Adds (or replaces) the mirror factory for a `_type` tag.
    pub fn register_property_factory<F>(&self, tag: impl Into<String>, factory: F)
    where
        F: Fn(&MirrorScope<'_>, &PropertySync) -> ClientResult<RemoteProperty>
            + Send
            + Sync
            + 'static,
    {
        self.shared.factories.write().register(tag, factory);
    }

    /// # Errors
    ///
    /// [`ClientError::UnknownHook`] for names other than
    /// `afterResponseProcessed` and `onResponseError`.
    pub fn add_hook_listener(
        &self,
        name: &str,
        listener: impl HookListener + 'static,
    ) -> ClientResult<()> {
        self.shared.hooks.add(name, Arc::new(listener))
    }

    // ── Context ───────────────────────────────────────────────────────────────

    /// Snapshot of the context sent with every batch.
    pub fn context(&self) -> Map<String, Value> {
        self.shared.context.lock().clone()
    }

    pub fn merge_context(&self, fields: Map<String, Value>) {
        self.shared.context.lock().extend(fields);
    }
}

impl std::fmt::Debug for PtlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtlClient")
            .field("url", &self.shared.url)
            .field("version", &self.shared.version)
            .field("buffered", &self.shared.buffer.lock().len())
            .field("hooks", &self.shared.hooks)
            .finish()
    }
}

impl Requester for ClientShared {
    fn request(&self, action: Action) -> BoxFuture<'static, ClientResult<Value>> {
        let (reply, receiver) = oneshot::channel();
        self.buffer.lock().push(Pending { action, reply });
        let me = self.me.clone();
        async move {
            let flusher = me
                .upgrade()
                .filter(|shared| !shared.buffering.load(Ordering::SeqCst));
            if let Some(shared) = flusher {
                // A failed flush answers this caller through its reply.
                let _ = shared.flush().await;
            }
            receiver.await.unwrap_or(Err(ClientError::ClientDropped))
        }
        .boxed()
    }
}

impl ClientShared {
    fn link(&self) -> Link {
        let me: Weak<dyn Requester> = self.me.clone();
        Link::new(me)
    }

    fn flush(self: &Arc<Self>) -> BoxFuture<'static, ClientResult<Vec<ActionOutcome>>> {
        let pending = mem::take(&mut *self.buffer.lock());
        let shared = Arc::clone(self);
        async move { shared.send(pending).await }.boxed()
    }

    async fn send(self: Arc<Self>, pending: Vec<Pending>) -> ClientResult<Vec<ActionOutcome>> {
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let (outcome, event) = {
            let _gate = self.flush_gate.lock().await;

            let (actions, replies): (Vec<Action>, Vec<_>) =
                pending.into_iter().map(|p| (p.action, p.reply)).unzip();
            let envelope = RequestEnvelope {
                ptl: request_tag(&self.version),
                ctx: Value::Object(self.context.lock().clone()),
                actions,
            };
            debug!(actions = envelope.actions.len(), url = %self.url, "flushing batch");

            match self.transport.post(&self.url, &envelope).await {
                Ok(response) => self.process_response(response, replies),
                Err(err) => {
                    error!("batch transport failed: {err}");
                    let err = ClientError::from(err);
                    reject_all(replies, &err);
                    (Err(err), None)
                }
            }
        };

        if let Some(event) = event {
            self.trigger(event).await;
        }
        outcome
    }

    /// Resolves every reply and returns the hook event to fire once the
    /// gate is released.
    fn process_response(
        &self,
        response: ResponseEnvelope,
        replies: Vec<oneshot::Sender<ClientResult<Value>>>,
    ) -> (ClientResult<Vec<ActionOutcome>>, Option<HookEvent>) {
        let expected = response_tag(&self.version);
        if response.ptl != expected {
            let err = ClientError::VersionMismatch {
                expected,
                got: response.ptl,
            };
            error!("{err}");
            reject_all(replies, &err);
            return (Err(err), None);
        }

        self.context.lock().extend(response.ctx);

        if let Some(patch) = &response.patch {
            if let Err(err) = self.apply_patch(patch) {
                error!("cannot apply patch: {err}");
                reject_all(replies, &err);
                return (Err(err), None);
            }
        }

        if let Some(first) = response.errors.first().cloned() {
            for info in &response.errors {
                error!("batch rejected: {info}");
            }
            let err = ClientError::Batch(first.clone());
            reject_all(replies, &err);
            return (Err(err), Some(HookEvent::ResponseError(first)));
        }

        let result = response.result.unwrap_or_default();
        for (index, reply) in replies.into_iter().enumerate() {
            let outcome = match result.get(index) {
                None => Err(ClientError::MissingResult(index)),
                Some(ActionOutcome {
                    error: Some(info), ..
                }) => Err(PtlError::from_info(info).into()),
                Some(ActionOutcome { data, .. }) => Ok(data.clone()),
            };
            // The caller may have stopped waiting.
            let _ = reply.send(outcome);
        }

        let event = HookEvent::AfterResponseProcessed(result.clone());
        (Ok(result), Some(event))
    }

    fn apply_patch(&self, patch: &Patch) -> ClientResult<()> {
        let layers = self.layers.read();
        for (layer_name, layer_patch) in patch {
            let layer = layers.iter().find(|l| l.name() == layer_name).ok_or_else(|| {
                PtlError::NotFound(format!(
                    "Cannot apply patch for layer \"{layer_name}\": layer not found"
                ))
            })?;
            layer.apply_patch(layer_patch)?;
        }
        Ok(())
    }

    /// Builds mirrors for `synced` and stores them, replacing layers of the
    /// same name.
    fn mirror(&self, synced: &[LayerSync]) -> ClientResult<Vec<Arc<RemoteLayer>>> {
        let link = self.link();
        let built = {
            let types = self.types.read();
            let factories = self.factories.read();
            synced
                .iter()
                .map(|sync| RemoteLayer::from_sync(sync, &types, &factories, &link).map(Arc::new))
                .collect::<ClientResult<Vec<_>>>()?
        };

        let mut layers = self.layers.write();
        for layer in &built {
            match layers.iter_mut().find(|l| l.name() == layer.name()) {
                Some(slot) => *slot = Arc::clone(layer),
                None => layers.push(Arc::clone(layer)),
            }
        }
        Ok(built)
    }

    async fn trigger(self: &Arc<Self>, event: HookEvent) {
        let client = PtlClient {
            shared: Arc::clone(self),
        };
        for listener in self.hooks.listeners(event.hook()) {
            listener.on_event(&client, &event).await;
        }
    }
}

fn reject_all(replies: Vec<oneshot::Sender<ClientResult<Value>>>, err: &ClientError) {
    for reply in replies {
        let _ = reply.send(Err(err.clone()));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
