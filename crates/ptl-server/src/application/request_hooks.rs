//! Pre-request hooks and the per-batch set of exposed layers.
//!
//! Hooks run before any action of a batch.  They see the request context and
//! the layers exposed to this batch, and may:
//!
//! - enrich `context.data` (e.g. resolve a session token into roles),
//! - hide a layer from this batch, or expose an extra one,
//! - reject the whole batch by returning an error.

use std::sync::Arc;

use async_trait::async_trait;
use ptl_core::PtlResult;

use crate::domain::{Layer, RequestContext};

/// Layers visible to one batch.
///
/// Starts as a copy of the server's layer list; changes made by hooks do not
/// outlive the batch.
#[derive(Debug, Clone, Default)]
pub struct ExposedLayers {
    layers: Vec<Arc<Layer>>,
}

impl ExposedLayers {
    pub fn new(layers: Vec<Arc<Layer>>) -> Self {
        Self { layers }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Layer>> {
        self.layers.iter().find(|l| l.name() == name)
    }

    /// Removes a layer from this batch, returning it if it was exposed.
    pub fn hide(&mut self, name: &str) -> Option<Arc<Layer>> {
        let index = self.layers.iter().position(|l| l.name() == name)?;
        Some(self.layers.remove(index))
    }

    /// Exposes `layer`, replacing one with the same name.
    pub fn expose(&mut self, layer: Arc<Layer>) {
        match self.layers.iter_mut().find(|l| l.name() == layer.name()) {
            Some(slot) => *slot = layer,
            None => self.layers.push(layer),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Layer>> {
        self.layers.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.name())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Code run before the actions of every batch.
///
/// Plain closures implement this trait:
///
/// ```rust
/// use ptl_server::application::request_hooks::ExposedLayers;
/// use ptl_server::domain::RequestContext;
/// use ptl_server::PtlServer;
/// use ptl_core::PtlResult;
///
/// let server = PtlServer::new().on_request(
///     |ctx: &mut RequestContext, layers: &mut ExposedLayers| -> PtlResult<()> {
///         if ctx.data.get("token").is_none() {
///             layers.hide("admin");
///         }
///         Ok(())
///     },
/// );
/// # drop(server);
/// ```
#[async_trait]
pub trait RequestHook: Send + Sync {
    /// # Errors
    ///
    /// Any error aborts the batch before its actions run.
    async fn on_request(
        &self,
        context: &mut RequestContext,
        layers: &mut ExposedLayers,
    ) -> PtlResult<()>;
}

#[async_trait]
impl<F> RequestHook for F
where
    F: Fn(&mut RequestContext, &mut ExposedLayers) -> PtlResult<()> + Send + Sync,
{
    async fn on_request(
        &self,
        context: &mut RequestContext,
        layers: &mut ExposedLayers,
    ) -> PtlResult<()> {
        self(context, layers)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Schema;

    fn layers() -> ExposedLayers {
        ExposedLayers::new(vec![
            Arc::new(Layer::new("api", Schema::new())),
            Arc::new(Layer::new("admin", Schema::new())),
        ])
    }

    #[test]
    fn test_hide_removes_layer_for_this_batch() {
        // Arrange
        let mut exposed = layers();

        // Act
        let hidden = exposed.hide("admin");

        // Assert
        assert!(hidden.is_some());
        assert_eq!(exposed.names().collect::<Vec<_>>(), vec!["api"]);
        assert!(exposed.hide("admin").is_none());
    }

    #[test]
    fn test_expose_replaces_same_name() {
        let mut exposed = layers();
        let replacement = Arc::new(Layer::new("api", Schema::new()));

        exposed.expose(Arc::clone(&replacement));
        exposed.expose(Arc::new(Layer::new("extra", Schema::new())));

        assert_eq!(exposed.len(), 3);
        assert!(Arc::ptr_eq(exposed.get("api").unwrap(), &replacement));
    }

    #[tokio::test]
    async fn test_closure_hook_runs_through_trait() {
        // Arrange
        let hook = |ctx: &mut RequestContext, layers: &mut ExposedLayers| -> PtlResult<()> {
            ctx.data = serde_json::json!({"roles": ["user"]});
            layers.hide("admin");
            Ok(())
        };
        let mut ctx = RequestContext::default();
        let mut exposed = layers();

        // Act
        hook.on_request(&mut ctx, &mut exposed).await.unwrap();

        // Assert
        assert_eq!(ctx.data["roles"][0], "user");
        assert!(exposed.get("admin").is_none());
    }
}
