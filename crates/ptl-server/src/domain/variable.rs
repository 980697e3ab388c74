//! Typed, permission-gated stored values.

use ptl_core::protocol::VARIABLE_TAG;
use ptl_core::types::assign_error;
use ptl_core::{Allow, PropertySync, PtlError, PtlResult, VarType};
use serde_json::Value;

use super::property::{PropertyCore, PropertyOps};

/// A layer variable.
///
/// Variables are readable and writable unless told otherwise, and accept
/// `null` only if they were created with a `null` value or marked
/// [`Variable::nullable`].
#[derive(Debug)]
pub struct Variable {
    core: PropertyCore,
    ty: VarType,
    nullable: bool,
    volatile: bool,
}

impl Variable {
    pub fn new(value: impl Into<Value>, ty: VarType) -> Self {
        let value = value.into();
        Self {
            nullable: value.is_null(),
            core: PropertyCore::new(value, Allow::READ_WRITE),
            ty,
            volatile: false,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(value.into(), VarType::string())
    }

    /// Any JSON number; integers stay integers on the wire.
    pub fn number(value: impl Into<serde_json::Number>) -> Self {
        Self::new(Value::Number(value.into()), VarType::number())
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(value, VarType::boolean())
    }

    /// A free-form JSON object, typically used as an internal hash.
    pub fn hash() -> Self {
        Self::new(Value::Object(Default::default()), VarType::object())
    }

    pub fn readonly(mut self) -> Self {
        self.core.set_allow(Allow::READ_ONLY);
        self
    }

    pub fn writeonly(mut self) -> Self {
        self.core.set_allow(Allow::WRITE_ONLY);
        self
    }

    pub fn allow(mut self, allow: Allow) -> Self {
        self.core.set_allow(allow);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Hides the variable from clients.
    ///
    /// # Errors
    ///
    /// [`PtlError::Type`] if the variable is already volatile.
    pub fn internal(mut self) -> PtlResult<Self> {
        if self.volatile {
            return Err(PtlError::Type(
                "Volatile variable should not be marked as internal".into(),
            ));
        }
        self.core.set_internal();
        Ok(self)
    }

    /// Reports the variable as changed in every patch of a batch that
    /// watched its layer.
    ///
    /// # Errors
    ///
    /// [`PtlError::Type`] if the variable is already internal.
    pub fn volatile(mut self) -> PtlResult<Self> {
        if self.core.is_internal() {
            return Err(PtlError::Type(
                "Internal variable should not be marked as volatile".into(),
            ));
        }
        self.volatile = true;
        Ok(self)
    }

    pub fn var_type(&self) -> &VarType {
        &self.ty
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    pub(crate) fn core(&self) -> &PropertyCore {
        &self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut PropertyCore {
        &mut self.core
    }
}

impl PropertyOps for Variable {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn allow(&self) -> Allow {
        self.core.allow()
    }

    fn is_internal(&self) -> bool {
        self.core.is_internal()
    }

    fn typecheck(&self, value: Option<&Value>) -> bool {
        match value {
            None => false,
            Some(Value::Null) => self.nullable,
            Some(v) => self.ty.accepts(v),
        }
    }

    fn read(&self) -> PtlResult<Value> {
        self.core.ensure_readable()?;
        Ok(self.core.load())
    }

    fn write(&self, value: Option<Value>) -> PtlResult<()> {
        self.core.ensure_writable()?;
        match value {
            Some(v) if self.typecheck(Some(&v)) => {
                self.core.store(v);
                Ok(())
            }
            other => Err(assign_error(self.name(), self.ty.name(), other.as_ref())),
        }
    }

    fn sync(&self) -> PropertySync {
        let mut sync = PropertySync::new(
            VARIABLE_TAG,
            self.name(),
            self.visible_value(),
            self.allow(),
        );
        sync.nullable = Some(self.nullable);
        sync.volatile = Some(self.volatile);
        sync.type_name = Some(self.ty.name().to_string());
        sync
    }

    fn visible_value(&self) -> Value {
        if self.allow().r {
            self.core.load()
        } else {
            Value::Null
        }
    }

    fn start_watch(&self) {
        self.core.start_watch();
    }

    fn check_changes(&self) -> bool {
        if self.core.is_hidden() {
            return false;
        }
        self.volatile || self.core.changed()
    }

    fn end_watch(&self) {
        self.core.end_watch();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
