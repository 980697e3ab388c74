//! The demo `api` layer served by the `ptl-server` binary.
//!
//! | Property    | Kind                       | Notes                                  |
//! |-------------|----------------------------|----------------------------------------|
//! | `counter`   | Number, read-only          | changed by `increment` / `reset`       |
//! | `title`     | String, read-only          |                                        |
//! | `tokens`    | Object, internal           | session token → `{username, roles}`    |
//! | `increment` | method, contextual         | requires the `user` role               |
//! | `reset`     | method, contextual         | requires the `admin` role              |
//! | `echo`      | method                     | returns its arguments                  |
//! | `time`      | arrow method               | milliseconds since the Unix epoch      |
//! | `auth`      | method, contextual         | `{username, password}` → session token |
//! | `logout`    | method, contextual         | drops the session token                |
//!
//! [`session_roles`] is the pre-request hook that turns the client's `token`
//! into `context.data.roles` for the guards to check.

use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use ptl_core::{PtlError, PtlResult};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::application::handle_batch::PtlServer;
use crate::application::request_hooks::ExposedLayers;
use crate::domain::{Invocation, Layer, Method, MethodBody, RequestContext, Schema, Variable};

/// Name of the demo layer.
pub const API_LAYER: &str = "api";

/// Demo accounts: username, password, roles.
const ACCOUNTS: &[(&str, &str, &[&str])] = &[
    ("bob", "111", &["admin", "user"]),
    ("alice", "222", &["user"]),
];

/// The demo server: the `api` layer plus the session hook.
///
/// # Errors
///
/// Only if the layer schema is inconsistent.
pub fn demo_server(version: &str) -> PtlResult<PtlServer> {
    Ok(PtlServer::with_version(version)
        .add_layer(api_layer()?)
        .on_request(session_roles))
}

/// Builds the `api` layer.
///
/// # Errors
///
/// Only if the layer schema is inconsistent.
pub fn api_layer() -> PtlResult<Layer> {
    let schema = Schema::new()
        .with("counter", Variable::number(0).readonly())
        .with("title", Variable::string("ptl test").readonly())
        .with("tokens", Variable::hash().internal()?)
        .with(
            "increment",
            Method::new(|inv: Invocation| async move {
                inv.this.update("counter", |c| {
                    *c = json!(c.as_i64().unwrap_or(0) + 1);
                    c.clone()
                })
            })
            .wrap(allow_only_for(&["user"]))
            .contextual(),
        )
        .with(
            "reset",
            Method::new(|inv: Invocation| async move {
                inv.this.set("counter", json!(0))?;
                Ok(Value::Null)
            })
            .wrap(allow_only_for(&["admin"]))
            .contextual(),
        )
        .with("echo", Method::new(|inv: Invocation| async move { echo(inv.args) }))
        .with("time", Method::arrow(|_inv: Invocation| async move { now_millis() }))
        .with("auth", Method::new(auth).contextual())
        .with("logout", Method::new(logout).contextual());

    Ok(Layer::new(API_LAYER, schema))
}

/// Pre-request hook: resolves `context.data.token` into `context.data.roles`.
///
/// Unknown or missing tokens get no roles; the batch itself is never
/// rejected here.
pub fn session_roles(context: &mut RequestContext, layers: &mut ExposedLayers) -> PtlResult<()> {
    let roles = match (context.data.get("token"), layers.get(API_LAYER)) {
        (Some(Value::String(token)), Some(layer)) => layer
            .content()
            .get("tokens")?
            .get(token)
            .and_then(|session| session.get("roles"))
            .cloned()
            .unwrap_or_else(|| json!([])),
        _ => json!([]),
    };
    if !context.data.is_object() {
        context.data = json!({});
    }
    context.data["roles"] = roles;
    Ok(())
}

fn allow_only_for(
    roles: &'static [&'static str],
) -> impl Fn(Invocation, MethodBody) -> BoxFuture<'static, PtlResult<Value>> + Send + Sync + 'static {
    move |invocation, original| {
        async move {
            let granted = invocation
                .context()?
                .data
                .get("roles")
                .and_then(Value::as_array)
                .is_some_and(|have| {
                    have.iter()
                        .filter_map(Value::as_str)
                        .any(|role| roles.contains(&role))
                });
            if granted {
                original(invocation).await
            } else {
                Err(PtlError::protocol("Forbidden", 403))
            }
        }
        .boxed()
    }
}

fn echo(args: Vec<Value>) -> PtlResult<Value> {
    let line = args
        .iter()
        .map(|a| a.as_str().map_or_else(|| a.to_string(), str::to_string))
        .collect::<Vec<_>>()
        .join(" ");
    info!("echo: {line}");
    Ok(Value::Array(args))
}

fn now_millis() -> PtlResult<Value> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| PtlError::Internal(e.to_string()))?;
    Ok(json!(elapsed.as_millis() as u64))
}

async fn auth(inv: Invocation) -> PtlResult<Value> {
    let context = inv.context()?;
    let credentials = inv.arg(0).ok_or_else(|| PtlError::required("credentials"))?;
    let username = credentials.get("username").and_then(Value::as_str);
    let password = credentials.get("password").and_then(Value::as_str);

    let account = ACCOUNTS
        .iter()
        .find(|(user, pass, _)| Some(*user) == username && Some(*pass) == password);
    let Some((user, _, roles)) = account else {
        return Err(PtlError::protocol("Wrong credentials", 401));
    };

    let token = Uuid::new_v4().to_string();
    let session = json!({"username": user, "roles": roles});
    inv.this
        .update("tokens", |tokens| tokens[token.as_str()] = session.clone())?;
    context.send_field("token", json!(token));
    info!(user = *user, "session opened");
    Ok(session)
}

async fn logout(inv: Invocation) -> PtlResult<Value> {
    let context = inv.context()?;
    let token = context.data.get("token").and_then(Value::as_str);
    let removed = match token {
        Some(token) => inv.this.update("tokens", |tokens| {
            tokens
                .as_object_mut()
                .and_then(|map| map.remove(token))
                .is_some()
        })?,
        None => false,
    };
    if !removed {
        return Err(PtlError::protocol("Unauthorized", 401));
    }
    context.send_field("token", Value::Null);
    Ok(Value::Null)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
