//! Layers and their plain content view.

use std::fmt;
use std::sync::{Arc, OnceLock};

use ptl_core::{LayerPatch, LayerSync, PtlError, PtlResult};
use serde_json::{Map, Value};

use super::context::RequestContext;
use super::object::Object;
use super::property::{Property, PropertyCore, PropertyOps, Schema};

/// A named, ordered set of properties exposed to clients.
///
/// The layer itself holds no watch state; watch calls fan out to its
/// properties.
#[derive(Debug)]
pub struct Layer {
    name: String,
    schema: Arc<Schema>,
    content: OnceLock<LayerContent>,
}

impl Layer {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(schema),
            content: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The plain view handed to method bodies, built on first use.
    pub fn content(&self) -> LayerContent {
        self.content
            .get_or_init(|| LayerContent::new(Arc::clone(&self.schema)))
            .clone()
    }

    /// Resolves a dotted path such as `"point.x"`.
    ///
    /// Internal properties are not reachable from here.
    ///
    /// # Errors
    ///
    /// [`PtlError::NotFound`] citing the full path at the first missing
    /// segment.
    pub fn get_property(&self, path: &str) -> PtlResult<&Property> {
        let missing = || PtlError::NotFound(format!("Path \"{path}\" does not exist on {self}"));
        let mut schema = Some(self.schema.as_ref());
        let mut property = None;
        for segment in path.split('.') {
            let next = schema
                .and_then(|s| s.get(segment))
                .filter(|p| !p.is_internal())
                .ok_or_else(missing)?;
            schema = next.as_object().map(Object::schema);
            property = Some(next);
        }
        property.ok_or_else(missing)
    }

    /// Calls the method at `path`.
    ///
    /// # Errors
    ///
    /// [`PtlError::NotFound`] for unknown paths, [`PtlError::Type`] when the
    /// target is not a method, and whatever the method body returns.
    pub async fn call(
        &self,
        context: &RequestContext,
        path: &str,
        args: Vec<Value>,
    ) -> PtlResult<Value> {
        match self.get_property(path)?.as_method() {
            Some(method) => method.call(self.content(), context, args).await,
            None => Err(PtlError::Type(format!("Cannot call \"{path}\": not a function"))),
        }
    }

    /// Schema description without internal properties.
    pub fn sync(&self) -> LayerSync {
        LayerSync {
            name: self.name.clone(),
            schema: self
                .schema
                .iter()
                .filter(|p| !p.is_internal())
                .map(PropertyOps::sync)
                .collect(),
        }
    }

    pub fn start_watch(&self) {
        self.schema.iter().for_each(PropertyOps::start_watch);
    }

    /// Current values of the properties changed since `start_watch`.
    pub fn check_changes(&self) -> LayerPatch {
        self.schema
            .iter()
            .filter(|p| p.check_changes())
            .map(|p| (p.name().to_string(), p.visible_value()))
            .collect()
    }

    pub fn end_watch(&self) {
        self.schema.iter().for_each(PropertyOps::end_watch);
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PtlLayer \"{}\"]", self.name)
    }
}

// ── Layer content ─────────────────────────────────────────────────────────────

/// Trusted view over a layer (or object) used by method bodies.
///
/// Reads and writes ignore permission flags and type checks, but every write
/// marks the property as changed so it shows up in the batch patch.
///
/// ```rust
/// use ptl_server::domain::{Layer, Schema, Variable};
/// use serde_json::json;
///
/// let layer = Layer::new("api", Schema::new().with("counter", Variable::number(0).readonly()));
/// let this = layer.content();
/// this.update("counter", |c| *c = json!(c.as_i64().unwrap_or(0) + 1)).unwrap();
/// assert_eq!(this.get("counter").unwrap(), json!(1));
/// ```
#[derive(Debug, Clone)]
pub struct LayerContent {
    schema: Arc<Schema>,
}

impl LayerContent {
    pub(crate) fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    fn property(&self, name: &str) -> PtlResult<&Property> {
        self.schema
            .get(name)
            .ok_or_else(|| PtlError::NotFound(format!("Variable {name} does not exist")))
    }

    fn variable_core(&self, name: &str) -> PtlResult<&PropertyCore> {
        match self.property(name)? {
            Property::Variable(v) => Ok(v.core()),
            Property::Method(_) => Err(PtlError::Type(format!("{name} is a method"))),
            Property::Object(_) => Err(PtlError::Type(format!(
                "{name} is an object, use object(\"{name}\") to reach its fields"
            ))),
        }
    }

    /// Raw value of a variable, or the composed value of an object.
    ///
    /// Reading never marks anything changed.
    pub fn get(&self, name: &str) -> PtlResult<Value> {
        match self.property(name)? {
            Property::Object(o) => Ok(LayerContent::new(o.shared_schema()).to_value()),
            _ => Ok(self.variable_core(name)?.load()),
        }
    }

    pub fn set(&self, name: &str, value: Value) -> PtlResult<()> {
        self.variable_core(name)?.store(value);
        Ok(())
    }

    /// Mutates a variable in place.
    pub fn update<R>(&self, name: &str, f: impl FnOnce(&mut Value) -> R) -> PtlResult<R> {
        Ok(self.variable_core(name)?.update(f))
    }

    /// View over the fields of an object variable.
    ///
    /// Writes through the view mark the touched fields, and so the object.
    pub fn object(&self, name: &str) -> PtlResult<LayerContent> {
        match self.property(name)? {
            Property::Object(o) => Ok(LayerContent::new(o.shared_schema())),
            _ => Err(PtlError::Type(format!("{name} is not an object"))),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schema.names()
    }

    /// Raw values of every variable and object, methods excluded.
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .schema
            .iter()
            .filter_map(|p| match p {
                Property::Variable(v) => Some((p.name().to_string(), v.core().load())),
                Property::Object(o) => Some((
                    p.name().to_string(),
                    LayerContent::new(o.shared_schema()).to_value(),
                )),
                Property::Method(_) => None,
            })
            .collect();
        Value::Object(map)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Method, Variable};
    use ptl_core::VarType;
    use serde_json::json;

    fn layer() -> Layer {
        Layer::new(
            "api",
            Schema::new()
                .with("counter", Variable::number(0).readonly())
                .with("tokens", Variable::hash().internal().unwrap())
                .with(
                    "point",
                    Object::new(
                        Schema::new()
                            .with("x", Variable::number(1))
                            .with("y", Variable::number(2)),
                    ),
                )
                .with(
                    "increment",
                    Method::new(|inv: crate::domain::Invocation| async move {
                        inv.this.update("counter", |c| {
                            *c = json!(c.as_i64().unwrap_or(0) + 1);
                            c.clone()
                        })
                    }),
                ),
        )
    }

    #[test]
    fn test_get_property_walks_dotted_paths() {
        let layer = layer();
        assert_eq!(layer.get_property("point.y").unwrap().read().unwrap(), json!(2));
    }

    #[test]
    fn test_get_property_reports_full_missing_path() {
        // Arrange
        let layer = layer();

        // Act
        let err = layer.get_property("point.z").unwrap_err();

        // Assert
        assert_eq!(err.code(), Some(404));
        assert_eq!(
            err.to_string(),
            "Path \"point.z\" does not exist on [PtlLayer \"api\"]"
        );
    }

    #[test]
    fn test_get_property_does_not_descend_into_variables() {
        assert!(layer().get_property("counter.x").is_err());
    }

    #[test]
    fn test_internal_property_is_not_reachable_by_path() {
        assert!(layer().get_property("tokens").is_err());
    }

    #[tokio::test]
    async fn test_call_runs_method_against_content() {
        // Arrange
        let layer = layer();
        let ctx = RequestContext::default();

        // Act
        let first = layer.call(&ctx, "increment", vec![]).await;
        let second = layer.call(&ctx, "increment", vec![]).await;

        // Assert
        assert_eq!(first, Ok(json!(1)));
        assert_eq!(second, Ok(json!(2)));
    }

    #[tokio::test]
    async fn test_call_on_variable_is_type_error() {
        let err = layer()
            .call(&RequestContext::default(), "counter", vec![])
            .await
            .unwrap_err();
        assert_eq!(err, PtlError::Type("Cannot call \"counter\": not a function".into()));
    }

    #[test]
    fn test_sync_omits_internal_properties() {
        let sync = layer().sync();
        assert_eq!(sync.name, "api");
        assert_eq!(
            sync.schema.names().collect::<Vec<_>>(),
            vec!["counter", "point", "increment"]
        );
    }

    #[tokio::test]
    async fn test_patch_contains_only_changed_properties() {
        // Arrange
        let layer = layer();
        layer.start_watch();

        // Act
        layer.call(&RequestContext::default(), "increment", vec![]).await.unwrap();
        layer.content().update("tokens", |t| t["a"] = json!(1)).unwrap();
        let patch = layer.check_changes();
        layer.end_watch();

        // Assert
        assert_eq!(patch.len(), 1);
        assert_eq!(patch["counter"], json!(1));
    }

    #[test]
    fn test_content_view_reaches_object_fields() {
        // Arrange
        let layer = layer();
        layer.start_watch();

        // Act
        layer.content().object("point").unwrap().set("x", json!(10)).unwrap();

        // Assert
        assert_eq!(layer.content().get("point").unwrap(), json!({"x": 10, "y": 2}));
        assert_eq!(layer.check_changes()["point"], json!({"x": 10, "y": 2}));
    }

    #[test]
    fn test_reading_through_content_view_changes_nothing() {
        // Arrange
        let layer = layer();
        layer.start_watch();

        // Act
        let point = layer.content().get("point").unwrap();
        let x = layer.content().object("point").unwrap().get("x").unwrap();
        let patch = layer.check_changes();
        layer.end_watch();

        // Assert
        assert_eq!(point, json!({"x": 1, "y": 2}));
        assert_eq!(x, json!(1));
        assert!(patch.is_empty());
    }

    #[test]
    fn test_content_view_errors() {
        let this = layer().content();
        assert_eq!(this.get("nope").unwrap_err().code(), Some(404));
        assert!(matches!(this.set("increment", json!(1)), Err(PtlError::Type(_))));
        assert!(matches!(this.set("point", json!({})), Err(PtlError::Type(_))));
    }

    #[test]
    fn test_content_is_memoized() {
        let layer = Layer::new("l", Schema::new().with("s", Variable::new(json!("a"), VarType::string())));
        let a = layer.content();
        a.set("s", json!("b")).unwrap();
        assert_eq!(layer.content().get("s").unwrap(), json!("b"));
    }
}
