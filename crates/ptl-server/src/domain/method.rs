//! Callable layer properties.
//!
//! # Calling convention
//!
//! A method body receives one [`Invocation`]: the layer content it operates
//! on (`this`), the request context when the method is contextual, and the
//! arguments sent by the client.  Bodies are asynchronous and may fail with
//! any [`PtlError`]; a panicking body is turned into an internal error
//! instead of tearing down the batch.
//!
//! `is_arrow` does not change how a body is called; it is synced to clients
//! as metadata.  [`Method::wrap`] sets it, like a decorated function.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use ptl_core::protocol::METHOD_TAG;
use ptl_core::types::assign_error;
use ptl_core::{Allow, PropertySync, PtlError, PtlResult};
use serde_json::Value;

use super::context::RequestContext;
use super::layer::LayerContent;
use super::property::{PropertyCore, PropertyOps};

/// Boxed method body.
pub type MethodBody = Arc<dyn Fn(Invocation) -> BoxFuture<'static, PtlResult<Value>> + Send + Sync>;

/// Everything a method body is called with.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Plain view of the layer owning the method.
    pub this: LayerContent,
    /// Set for contextual methods only.
    pub context: Option<RequestContext>,
    pub args: Vec<Value>,
}

impl Invocation {
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// The request context.
    ///
    /// # Errors
    ///
    /// [`PtlError::Type`] when called from a method that is not contextual.
    pub fn context(&self) -> PtlResult<&RequestContext> {
        self.context
            .as_ref()
            .ok_or_else(|| PtlError::Type("Method is not contextual".into()))
    }
}

pub struct Method {
    core: PropertyCore,
    body: MethodBody,
    is_arrow: bool,
    is_contextual: bool,
}

impl Method {
    /// A regular method.
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PtlResult<Value>> + Send + 'static,
    {
        Self::with_convention(body, false)
    }

    /// A method synced with `isArrow: true`.
    pub fn arrow<F, Fut>(body: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PtlResult<Value>> + Send + 'static,
    {
        Self::with_convention(body, true)
    }

    fn with_convention<F, Fut>(body: F, is_arrow: bool) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PtlResult<Value>> + Send + 'static,
    {
        Self {
            core: PropertyCore::new(Value::Null, Allow::READ_ONLY),
            body: Arc::new(move |invocation| body(invocation).boxed()),
            is_arrow,
            is_contextual: false,
        }
    }

    /// Passes the request context to the body.
    pub fn contextual(mut self) -> Self {
        self.is_contextual = true;
        self
    }

    /// Intercepts every call with `wrapper(invocation, original_body)`.
    ///
    /// Used for cross-cutting checks such as authorization:
    ///
    /// ```rust
    /// use ptl_core::PtlError;
    /// use ptl_server::domain::Method;
    /// use serde_json::Value;
    ///
    /// let guarded = Method::new(|_| async { Ok(Value::Null) })
    ///     .wrap(|invocation, original| async move {
    ///         if invocation.args.is_empty() {
    ///             return Err(PtlError::protocol("Forbidden", 403));
    ///         }
    ///         original(invocation).await
    ///     });
    /// assert!(guarded.is_arrow());
    /// ```
    pub fn wrap<W, Fut>(mut self, wrapper: W) -> Self
    where
        W: Fn(Invocation, MethodBody) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PtlResult<Value>> + Send + 'static,
    {
        let original = Arc::clone(&self.body);
        self.body = Arc::new(move |invocation| wrapper(invocation, Arc::clone(&original)).boxed());
        self.is_arrow = true;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.core.set_allow(Allow::READ_ONLY);
        self
    }

    pub fn allow(mut self, allow: Allow) -> Self {
        self.core.set_allow(allow);
        self
    }

    pub fn internal(mut self) -> Self {
        self.core.set_internal();
        self
    }

    pub fn is_arrow(&self) -> bool {
        self.is_arrow
    }

    pub fn is_contextual(&self) -> bool {
        self.is_contextual
    }

    /// Runs the body against `this`.
    ///
    /// # Errors
    ///
    /// Whatever the body returns, or [`PtlError::Internal`] if it panics.
    pub async fn call(
        &self,
        this: LayerContent,
        context: &RequestContext,
        args: Vec<Value>,
    ) -> PtlResult<Value> {
        let invocation = Invocation {
            this,
            context: self.is_contextual.then(|| context.clone()),
            args,
        };
        let body = Arc::clone(&self.body);
        let future = std::panic::catch_unwind(AssertUnwindSafe(|| body(invocation)))
            .map_err(|panic| panic_error(self.name(), panic))?;
        AssertUnwindSafe(future)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panic_error(self.name(), panic)))
    }

    pub(crate) fn core(&self) -> &PropertyCore {
        &self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut PropertyCore {
        &mut self.core
    }
}

fn panic_error(name: &str, panic: Box<dyn std::any::Any + Send>) -> PtlError {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(method = name, "method body panicked: {detail}");
    PtlError::Internal(format!("Method {name} failed: {detail}"))
}

impl PropertyOps for Method {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn allow(&self) -> Allow {
        self.core.allow()
    }

    fn is_internal(&self) -> bool {
        self.core.is_internal()
    }

    /// JSON values are never callable.
    fn typecheck(&self, _value: Option<&Value>) -> bool {
        false
    }

    fn read(&self) -> PtlResult<Value> {
        Err(PtlError::Type(format!(
            "Cannot get \"{}\": not a variable",
            self.name()
        )))
    }

    fn write(&self, value: Option<Value>) -> PtlResult<()> {
        self.core.ensure_writable()?;
        Err(assign_error(self.name(), "Function", value.as_ref()))
    }

    fn sync(&self) -> PropertySync {
        let mut sync = PropertySync::new(METHOD_TAG, self.name(), Value::Null, self.allow());
        sync.is_arrow = Some(self.is_arrow);
        sync.is_contextual = Some(self.is_contextual);
        sync
    }

    fn visible_value(&self) -> Value {
        Value::Null
    }

    fn start_watch(&self) {
        self.core.start_watch();
    }

    fn check_changes(&self) -> bool {
        !self.core.is_hidden() && self.core.changed()
    }

    fn end_watch(&self) {
        self.core.end_watch();
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.core.name())
            .field("is_arrow", &self.is_arrow)
            .field("is_contextual", &self.is_contextual)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
