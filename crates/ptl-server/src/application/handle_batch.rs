//! HandleBatch: runs one request envelope against the exposed layers.
//!
//! This is the heart of the server.  For every incoming batch it:
//!
//! 1. checks the protocol tag (`req@<version>`),
//! 2. builds the [`RequestContext`] and the batch's [`ExposedLayers`],
//! 3. runs the pre-request hooks in registration order,
//! 4. runs every action **sequentially**, capturing each outcome on its own
//!    so that one failing action never aborts its siblings,
//! 5. collects a patch for every layer a `call` or `set` touched,
//! 6. answers with `{ptl: "res@<version>", ctx, patch, result}`.
//!
//! [`PtlServer::handle_http`] wraps all of this for a transport: it checks
//! the HTTP method, parses the body and turns whole-batch failures into the
//! error envelope plus a status code.
//!
//! Independent batches may run concurrently against the same layers; there
//! is no isolation between them beyond each property's own lock.

use std::sync::Arc;

use ptl_core::error::{BAD_REQUEST, INTERNAL_ERROR, METHOD_NOT_ALLOWED, NOT_FOUND};
use ptl_core::{
    request_tag, response_tag, Action, ActionKind, ActionOutcome, Patch, PtlError, PtlResult,
    RequestEnvelope, ResponseEnvelope, PROTOCOL_VERSION, WILDCARD_LAYER,
};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::request_hooks::{ExposedLayers, RequestHook};
use crate::domain::{Layer, PropertyOps, RequestContext};

/// Status code and body produced for one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: ResponseEnvelope,
}

/// The request pipeline: layers, hooks and the protocol version they speak.
pub struct PtlServer {
    version: String,
    layers: Vec<Arc<Layer>>,
    hooks: Vec<Arc<dyn RequestHook>>,
}

impl Default for PtlServer {
    fn default() -> Self {
        Self::new()
    }
}

impl PtlServer {
    /// A server speaking [`PROTOCOL_VERSION`] with no layers.
    pub fn new() -> Self {
        Self::with_version(PROTOCOL_VERSION)
    }

    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            layers: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Adds a layer, replacing one with the same name.
    pub fn add_layer(mut self, layer: Layer) -> Self {
        let layer = Arc::new(layer);
        match self.layers.iter_mut().find(|l| l.name() == layer.name()) {
            Some(slot) => *slot = layer,
            None => self.layers.push(layer),
        }
        self
    }

    /// Registers a hook run before the actions of every batch.
    pub fn on_request(mut self, hook: impl RequestHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn layer(&self, name: &str) -> Option<Arc<Layer>> {
        self.layers.iter().find(|l| l.name() == name).cloned()
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.name())
    }

    // ── Transport boundary ────────────────────────────────────────────────────

    /// Handles one HTTP exchange given its method and raw body.
    ///
    /// Never fails: whole-batch errors become the error envelope with
    /// `405` for non-POST methods, `400` for bodies that are not JSON, the
    /// error's own code when it has one, and `500` otherwise.  Once the body
    /// parses, a shape the envelope decoder rejects counts as `500`.
    pub async fn handle_http(&self, method: &str, body: &[u8]) -> HttpReply {
        match self.handle_raw(method, body).await {
            Ok(envelope) => HttpReply {
                status: 200,
                body: envelope,
            },
            Err(err) => {
                let status = err.code().unwrap_or(INTERNAL_ERROR);
                if status >= INTERNAL_ERROR {
                    error!(status, "batch failed: {err}");
                } else {
                    warn!(status, "batch rejected: {err}");
                }
                HttpReply {
                    status,
                    body: ResponseEnvelope::failure(self.response_tag(), err.to_string()),
                }
            }
        }
    }

    async fn handle_raw(&self, method: &str, body: &[u8]) -> PtlResult<ResponseEnvelope> {
        if !method.eq_ignore_ascii_case("POST") {
            return Err(PtlError::protocol("Method not Allowed", METHOD_NOT_ALLOWED));
        }
        let raw: Value = serde_json::from_slice(body)
            .map_err(|e| PtlError::protocol(format!("Malformed request body: {e}"), BAD_REQUEST))?;
        self.check_version(raw.get("ptl"))?;
        let envelope: RequestEnvelope = serde_json::from_value(raw)
            .map_err(|e| PtlError::Internal(format!("Cannot decode request envelope: {e}")))?;
        self.process_batch(envelope).await
    }

    /// Runs an already decoded envelope.
    ///
    /// # Errors
    ///
    /// Version mismatches and hook rejections fail the whole batch.
    /// Per-action failures are reported inside the envelope instead.
    pub async fn handle_envelope(&self, envelope: RequestEnvelope) -> PtlResult<ResponseEnvelope> {
        self.check_version(Some(&Value::String(envelope.ptl.clone())))?;
        self.process_batch(envelope).await
    }

    fn check_version(&self, tag: Option<&Value>) -> PtlResult<()> {
        let expected = request_tag(&self.version);
        match tag.and_then(Value::as_str) {
            Some(got) if got == expected => Ok(()),
            other => Err(PtlError::bad_request(format!(
                "Ptl versions mismatch: expected {expected}, got {}",
                other.unwrap_or("undefined")
            ))),
        }
    }

    fn response_tag(&self) -> String {
        response_tag(&self.version)
    }

    // ── Batch processing ──────────────────────────────────────────────────────

    async fn process_batch(&self, envelope: RequestEnvelope) -> PtlResult<ResponseEnvelope> {
        let mut context = RequestContext::new(envelope.ctx);
        let mut exposed = ExposedLayers::new(self.layers.clone());

        for hook in &self.hooks {
            hook.on_request(&mut context, &mut exposed).await?;
        }

        let mut watched: Vec<Arc<Layer>> = Vec::new();
        let mut result = Vec::with_capacity(envelope.actions.len());
        for action in &envelope.actions {
            let outcome = self.process_action(action, &exposed, &context, &mut watched).await;
            if let Err(err) = &outcome {
                debug!(action = %action.action, name = %action.name, "action failed: {err}");
            }
            result.push(ActionOutcome::from(outcome));
        }

        let mut patch = Patch::new();
        for layer in watched {
            patch.insert(layer.name().to_string(), layer.check_changes());
            layer.end_watch();
        }

        debug!(
            actions = result.len(),
            patched = patch.len(),
            "batch processed"
        );
        Ok(ResponseEnvelope::success(
            self.response_tag(),
            context.response(),
            patch,
            result,
        ))
    }

    async fn process_action(
        &self,
        action: &Action,
        exposed: &ExposedLayers,
        context: &RequestContext,
        watched: &mut Vec<Arc<Layer>>,
    ) -> PtlResult<Value> {
        let kind = action.kind()?;
        let (layer_name, path) = action.target();

        let layer = exposed.get(layer_name);
        if layer.is_none() && layer_name != WILDCARD_LAYER {
            return Err(PtlError::protocol(
                format!("Cannot find layer \"{layer_name}\""),
                NOT_FOUND,
            ));
        }

        if kind == ActionKind::Sync {
            if path.is_some() {
                return Err(PtlError::bad_request(format!(
                    "Action \"sync\" can be applied to layers only, but \"{}\" is not a layer",
                    action.name
                )));
            }
            let synced = match layer {
                Some(layer) => to_json(&layer.sync())?,
                None => to_json(&exposed.iter().map(|l| l.sync()).collect::<Vec<_>>())?,
            };
            return Ok(synced);
        }

        let Some(layer) = layer else {
            return Err(PtlError::bad_request(
                "Layer name \"*\" can be used only to sync all layers",
            ));
        };
        let Some(path) = path else {
            return Err(PtlError::Type(format!(
                "Action \"{kind}\" needs a property path, got \"{}\"",
                action.name
            )));
        };

        if kind == ActionKind::Call {
            watch(layer, watched);
            return layer.call(context, path, action.args.clone()).await;
        }

        let property = layer.get_property(path)?;
        if kind == ActionKind::Get {
            return property.read();
        }

        watch(layer, watched);
        property.write(action.args.first().cloned())?;
        if property.allow().r {
            property.read()
        } else {
            Ok(Value::Null)
        }
    }
}

/// Opens the layer's watch window once per batch.
fn watch(layer: &Arc<Layer>, watched: &mut Vec<Arc<Layer>>) {
    if !watched.iter().any(|l| Arc::ptr_eq(l, layer)) {
        layer.start_watch();
        watched.push(Arc::clone(layer));
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> PtlResult<Value> {
    serde_json::to_value(value).map_err(|e| PtlError::Internal(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Invocation, Method, Schema, Variable};
    use serde_json::json;

    fn server() -> PtlServer {
        PtlServer::new().add_layer(Layer::new(
            "api",
            Schema::new()
                .with("counter", Variable::number(0).readonly())
                .with("x", Variable::number(5))
                .with("secret", Variable::string("s").writeonly())
                .with(
                    "increment",
                    Method::new(|inv: Invocation| async move {
                        inv.this.update("counter", |c| {
                            *c = json!(c.as_i64().unwrap_or(0) + 1);
                            c.clone()
                        })
                    }),
                )
                .with(
                    "fail",
                    Method::new(|_inv: Invocation| async move {
                        Err(PtlError::protocol("Wrong credentials", 401))
                    }),
                ),
        ))
    }

    fn envelope(actions: Vec<Action>) -> RequestEnvelope {
        RequestEnvelope {
            ptl: "req@0.0.1".into(),
            ctx: json!({}),
            actions,
        }
    }

    fn outcomes(response: &ResponseEnvelope) -> &[ActionOutcome] {
        response.result.as_deref().unwrap()
    }

    #[tokio::test]
    async fn test_call_returns_result_and_patch() {
        // Arrange
        let server = server();

        // Act
        let response = server
            .handle_envelope(envelope(vec![Action::call("api/increment", vec![])]))
            .await
            .unwrap();

        // Assert
        assert_eq!(response.ptl, "res@0.0.1");
        assert_eq!(outcomes(&response)[0].data, json!(1));
        assert_eq!(response.patch.unwrap()["api"]["counter"], json!(1));
    }

    #[tokio::test]
    async fn test_set_returns_stored_value_and_patches_it() {
        let server = server();

        let response = server
            .handle_envelope(envelope(vec![Action::set("api/x", json!(8))]))
            .await
            .unwrap();

        assert_eq!(outcomes(&response)[0], ActionOutcome::success(json!(8)));
        assert_eq!(response.patch.unwrap()["api"]["x"], json!(8));
    }

    #[tokio::test]
    async fn test_set_on_writeonly_returns_null() {
        let server = server();
        let response = server
            .handle_envelope(envelope(vec![Action::set("api/secret", json!("new"))]))
            .await
            .unwrap();
        assert_eq!(outcomes(&response)[0], ActionOutcome::success(Value::Null));
        // Unreadable properties never show up in patches.
        assert!(response.patch.unwrap()["api"].is_empty());
    }

    #[tokio::test]
    async fn test_get_does_not_watch_the_layer() {
        let server = server();
        let response = server
            .handle_envelope(envelope(vec![Action::get("api/x")]))
            .await
            .unwrap();
        assert_eq!(outcomes(&response)[0].data, json!(5));
        assert!(response.patch.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_actions_do_not_abort_siblings() {
        // Arrange
        let server = server();
        let actions = vec![
            Action::get("api/secret"),
            Action::call("api/increment", vec![]),
            Action::get("nope/x"),
            Action::new("api/x", ActionKind::Set, vec![]),
            Action::call("api/fail", vec![]),
            Action::call("api/increment", vec![]),
        ];

        // Act
        let response = server.handle_envelope(envelope(actions)).await.unwrap();
        let result = outcomes(&response);

        // Assert: one outcome per action, in order
        assert_eq!(result.len(), 6);
        assert_eq!(result[0].error.as_ref().unwrap().code, Some(403));
        assert_eq!(result[1].data, json!(1));
        assert_eq!(result[2].error.as_ref().unwrap().code, Some(404));
        assert!(result[3].error.as_ref().unwrap().message.contains("got undefined"));
        assert_eq!(result[4].error.as_ref().unwrap().code, Some(401));
        assert_eq!(result[5].data, json!(2));
    }

    #[tokio::test]
    async fn test_unknown_action_is_400() {
        let server = server();
        let mut action = Action::get("api/x");
        action.action = "delete".into();

        let response = server.handle_envelope(envelope(vec![action])).await.unwrap();

        let error = outcomes(&response)[0].error.clone().unwrap();
        assert_eq!(error.code, Some(400));
        assert_eq!(error.message, "Unknown action \"delete\"");
    }

    #[tokio::test]
    async fn test_sync_rules() {
        // Arrange
        let server = server();
        let actions = vec![
            Action::sync("*"),
            Action::sync("api"),
            Action::sync("api/x"),
            Action::get("*/x"),
        ];

        // Act
        let response = server.handle_envelope(envelope(actions)).await.unwrap();
        let result = outcomes(&response);

        // Assert
        assert_eq!(result[0].data[0]["name"], "api");
        assert_eq!(result[1].data["schema"]["counter"]["_value"], 0);
        assert_eq!(result[2].error.as_ref().unwrap().code, Some(400));
        assert_eq!(
            result[3].error.as_ref().unwrap().message,
            "Layer name \"*\" can be used only to sync all layers"
        );
    }

    #[tokio::test]
    async fn test_version_mismatch_names_both_tags() {
        let server = server();
        let mut request = envelope(vec![]);
        request.ptl = "req@9.9.9".into();

        let err = server.handle_envelope(request).await.unwrap_err();

        assert_eq!(err.code(), Some(400));
        assert_eq!(
            err.to_string(),
            "Ptl versions mismatch: expected req@0.0.1, got req@9.9.9"
        );
    }

    #[tokio::test]
    async fn test_hook_rejection_aborts_batch() {
        // Arrange
        let server = server().on_request(
            |_ctx: &mut RequestContext, _layers: &mut ExposedLayers| -> PtlResult<()> {
                Err(PtlError::protocol("Unauthorized", 401))
            },
        );

        // Act
        let reply = server
            .handle_http("POST", br#"{"ptl":"req@0.0.1","do":[{"name":"api/increment"}]}"#)
            .await;

        // Assert
        assert_eq!(reply.status, 401);
        assert_eq!(reply.body.errors[0].message, "Unauthorized");
        assert_eq!(server.layer("api").unwrap().content().get("counter").unwrap(), json!(0));
    }

    #[tokio::test]
    async fn test_hidden_layer_is_not_found() {
        let server = server().on_request(
            |_ctx: &mut RequestContext, layers: &mut ExposedLayers| -> PtlResult<()> {
                layers.hide("api");
                Ok(())
            },
        );

        let response = server
            .handle_envelope(envelope(vec![Action::get("api/x"), Action::sync("*")]))
            .await
            .unwrap();

        assert_eq!(outcomes(&response)[0].error.as_ref().unwrap().code, Some(404));
        assert_eq!(outcomes(&response)[1].data, json!([]));
    }

    #[tokio::test]
    async fn test_http_boundary_status_codes() {
        let server = server();

        let not_post = server.handle_http("GET", b"").await;
        let not_json = server.handle_http("POST", b"{not json").await;
        let bad_shape = server.handle_http("POST", br#"{"ptl":"req@0.0.1","do":5}"#).await;
        let ok = server.handle_http("POST", br#"{"ptl":"req@0.0.1","do":[]}"#).await;

        assert_eq!(not_post.status, 405);
        assert_eq!(not_post.body.errors[0].message, "Method not Allowed");
        assert_eq!(not_json.status, 400);
        assert_eq!(bad_shape.status, 500);
        assert!(bad_shape.body.errors[0].message.starts_with("Cannot decode request envelope"));
        assert!(not_json.body.result.is_none());
        assert_eq!(ok.status, 200);
        assert_eq!(ok.body.result, Some(vec![]));
    }
}
