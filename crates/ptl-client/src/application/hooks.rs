//! Client hooks run after each processed response.
//!
//! | Hook name                 | Fired when                         | Event                                   |
//! |---------------------------|------------------------------------|-----------------------------------------|
//! | `afterResponseProcessed`  | every caller has been answered     | [`HookEvent::AfterResponseProcessed`]   |
//! | `onResponseError`         | the server rejected the whole batch| [`HookEvent::ResponseError`]            |
//!
//! Listeners run one after another, in registration order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use ptl_core::{ActionOutcome, ErrorInfo};

use super::client::PtlClient;
use crate::domain::ClientError;

pub const AFTER_RESPONSE_PROCESSED: &str = "afterResponseProcessed";
pub const ON_RESPONSE_ERROR: &str = "onResponseError";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
    AfterResponseProcessed,
    OnResponseError,
}

impl HookName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AfterResponseProcessed => AFTER_RESPONSE_PROCESSED,
            Self::OnResponseError => ON_RESPONSE_ERROR,
        }
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookName {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            AFTER_RESPONSE_PROCESSED => Ok(Self::AfterResponseProcessed),
            ON_RESPONSE_ERROR => Ok(Self::OnResponseError),
            other => Err(ClientError::UnknownHook(other.to_string())),
        }
    }
}

/// What a listener is told.
#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    /// The full, positional result list of the batch.
    AfterResponseProcessed(Vec<ActionOutcome>),
    /// First entry of the response's `errors` list.
    ResponseError(ErrorInfo),
}

impl HookEvent {
    pub fn hook(&self) -> HookName {
        match self {
            Self::AfterResponseProcessed(_) => HookName::AfterResponseProcessed,
            Self::ResponseError(_) => HookName::OnResponseError,
        }
    }
}

/// A hook listener.
///
/// Plain closures `Fn(&PtlClient, &HookEvent)` implement it; implement the
/// trait directly when the listener has to await something.
#[async_trait]
pub trait HookListener: Send + Sync {
    async fn on_event(&self, client: &PtlClient, event: &HookEvent);
}

#[async_trait]
impl<F> HookListener for F
where
    F: Fn(&PtlClient, &HookEvent) + Send + Sync,
{
    async fn on_event(&self, client: &PtlClient, event: &HookEvent) {
        self(client, event)
    }
}

/// Listener lists per hook.
#[derive(Default)]
pub struct Hooks {
    listeners: RwLock<HashMap<HookName, Vec<Arc<dyn HookListener>>>>,
}

impl Hooks {
    /// # Errors
    ///
    /// [`ClientError::UnknownHook`] when `name` is not a hook.
    pub fn add(&self, name: &str, listener: Arc<dyn HookListener>) -> Result<(), ClientError> {
        let hook: HookName = name.parse()?;
        self.listeners.write().entry(hook).or_default().push(listener);
        Ok(())
    }

    /// Snapshot of the listeners of `hook`, so none is held across awaits.
    pub fn listeners(&self, hook: HookName) -> Vec<Arc<dyn HookListener>> {
        self.listeners.read().get(&hook).cloned().unwrap_or_default()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<HookName, usize> = self
            .listeners
            .read()
            .iter()
            .map(|(hook, list)| (*hook, list.len()))
            .collect();
        f.debug_struct("Hooks").field("listeners", &counts).finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_names_parse() {
        assert_eq!(
            "afterResponseProcessed".parse::<HookName>().unwrap(),
            HookName::AfterResponseProcessed
        );
        assert_eq!(
            "onResponseError".parse::<HookName>().unwrap(),
            HookName::OnResponseError
        );
    }

    #[test]
    fn test_unknown_hook_fails_loudly() {
        // Arrange
        let hooks = Hooks::default();
        let listener: Arc<dyn HookListener> = Arc::new(|_: &PtlClient, _: &HookEvent| {});

        // Act
        let err = hooks.add("beforeRequest", listener).unwrap_err();

        // Assert
        assert_eq!(err, ClientError::UnknownHook("beforeRequest".into()));
        assert!(hooks.listeners(HookName::AfterResponseProcessed).is_empty());
    }

    #[test]
    fn test_listeners_are_kept_per_hook() {
        let hooks = Hooks::default();
        let listener: Arc<dyn HookListener> = Arc::new(|_: &PtlClient, _: &HookEvent| {});

        hooks.add(ON_RESPONSE_ERROR, Arc::clone(&listener)).unwrap();
        hooks.add(ON_RESPONSE_ERROR, listener).unwrap();

        assert_eq!(hooks.listeners(HookName::OnResponseError).len(), 2);
        assert!(hooks.listeners(HookName::AfterResponseProcessed).is_empty());
    }

    #[test]
    fn test_event_names_its_hook() {
        let event = HookEvent::ResponseError(ErrorInfo::message("boom"));
        assert_eq!(event.hook(), HookName::OnResponseError);
        assert_eq!(event.hook().to_string(), "onResponseError");
    }
}
