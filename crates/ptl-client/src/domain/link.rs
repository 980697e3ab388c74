//! The handle mirror nodes use to reach the client that built them.
//!
//! Mirror nodes live inside the client, so they only hold a weak reference
//! back to it.

use std::fmt;
use std::sync::Weak;

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use ptl_core::Action;
use serde_json::Value;

use super::error::{ClientError, ClientResult};

/// Something that accepts actions and eventually answers them.
///
/// `request` must enqueue the action before returning; the future only
/// waits for the reply.
pub trait Requester: Send + Sync {
    fn request(&self, action: Action) -> BoxFuture<'static, ClientResult<Value>>;
}

/// Weak link from a mirror node to its [`Requester`].
#[derive(Clone)]
pub struct Link {
    target: Weak<dyn Requester>,
}

impl Link {
    pub fn new(target: Weak<dyn Requester>) -> Self {
        Self { target }
    }

    /// Forwards `action`, or fails with [`ClientError::ClientDropped`].
    pub fn request(&self, action: Action) -> BoxFuture<'static, ClientResult<Value>> {
        match self.target.upgrade() {
            Some(target) => target.request(action),
            None => future::ready(Err(ClientError::ClientDropped)).boxed(),
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("alive", &(self.target.strong_count() > 0))
            .finish()
    }
}

// ── Test support ──────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::recording::recorder;
    use super::*;

    #[tokio::test]
    async fn test_link_forwards_to_live_target() {
        let (recorder, link) = recorder();
        *recorder.reply.lock() = Value::from(7);

        let reply = link.request(Action::get("api/x")).await.unwrap();

        assert_eq!(reply, Value::from(7));
        assert_eq!(recorder.actions.lock()[0].name, "api/x");
    }

    #[tokio::test]
    async fn test_link_to_dropped_target_fails() {
        let (recorder, link) = recorder();
        drop(recorder);

        let err = link.request(Action::get("api/x")).await.unwrap_err();

        assert_eq!(err, ClientError::ClientDropped);
    }
}
