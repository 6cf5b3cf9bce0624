//! Schema binding for decoded configuration documents.
//!
//! The helper never hands application code an untyped document. Every
//! payload goes through a [`Validator`] which either produces the caller's
//! schema type or a [`ValidationError`] listing each violated field.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// A single field-level problem found while validating a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Dotted path to the offending field (`.` for the document root).
    pub path: String,
    /// Constraint that was violated.
    pub message: String,
}

impl FieldViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Error returned when a document does not satisfy the configured schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration does not match schema {schema}: {}", join_violations(.violations))]
pub struct ValidationError {
    schema: &'static str,
    violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(schema: &'static str, violations: Vec<FieldViolation>) -> Self {
        Self { schema, violations }
    }

    /// Name of the schema the document was validated against.
    pub fn schema(&self) -> &'static str {
        self.schema
    }

    /// Every violation reported for the document.
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    if violations.is_empty() {
        return "no details reported".to_string();
    }
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Capability implemented by configuration schema types.
///
/// Structural rules (required fields, types, unknown-field policy) come from
/// the type's `Deserialize` implementation, so `#[serde(deny_unknown_fields)]`
/// and friends apply as usual. [`ConfigSchema::check`] adds semantic rules
/// that serde cannot express and should report every violation it finds.
pub trait ConfigSchema: DeserializeOwned + Send + Sync + 'static {
    /// Human-readable schema name used in errors and logs.
    fn schema_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Semantic checks applied after deserialisation succeeded.
    fn check(&self) -> Result<(), Vec<FieldViolation>> {
        Ok(())
    }

    /// Machine-readable description of the schema (e.g. JSON Schema), if the
    /// type can provide one. The helper only passes it through.
    fn describe() -> Option<Value> {
        None
    }
}

/// Binds an untyped document to a typed configuration value.
pub trait Validator<T>: Send + Sync {
    fn validate(&self, value: Value) -> Result<T, ValidationError>;

    /// Machine-readable schema description, when available.
    fn describe(&self) -> Option<Value> {
        None
    }
}

impl<T, F> Validator<T> for F
where
    F: Fn(Value) -> Result<T, ValidationError> + Send + Sync,
{
    fn validate(&self, value: Value) -> Result<T, ValidationError> {
        self(value)
    }
}

/// Default validator for any [`ConfigSchema`] type.
pub struct SchemaValidator<T> {
    _schema: PhantomData<fn() -> T>,
}

impl<T> SchemaValidator<T> {
    pub fn new() -> Self {
        Self {
            _schema: PhantomData,
        }
    }
}

impl<T> Default for SchemaValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SchemaValidator<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SchemaValidator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("schema", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: ConfigSchema> Validator<T> for SchemaValidator<T> {
    fn validate(&self, value: Value) -> Result<T, ValidationError> {
        let typed: T = serde_path_to_error::deserialize(value).map_err(|err| {
            let path = err.path().to_string();
            let message = err.into_inner().to_string();
            ValidationError::new(T::schema_name(), vec![FieldViolation::new(path, message)])
        })?;
        typed
            .check()
            .map_err(|violations| ValidationError::new(T::schema_name(), violations))?;
        Ok(typed)
    }

    fn describe(&self) -> Option<Value> {
        T::describe()
    }
}
