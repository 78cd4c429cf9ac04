//! Input validation contract.
//!
//! After a successful bind, the typed input's [`Validate`] implementation
//! runs. A failed validation always aborts the request with the fault it
//! returned; invalid inputs never reach business code.

use crate::error::{Fault, FaultResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Self-validation hook for typed inputs.
///
/// The default implementation accepts everything; input shapes with
/// field-level constraints override [`Validate::validate`] and return a
/// fault (conventionally [`Fault::bad_request`], so the request aborts
/// with 400).
///
/// # Example
///
/// ```
/// use stoa_core::{Fault, FaultResult, Validate};
///
/// struct WidgetQuery {
///     id: i64,
/// }
///
/// impl Validate for WidgetQuery {
///     fn validate(&self) -> FaultResult<()> {
///         if self.id < 1 {
///             return Err(Fault::bad_request("invalid id"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Validate {
    /// Checks field-level constraints on a bound input.
    fn validate(&self) -> FaultResult<()> {
        Ok(())
    }
}

/// Canonical empty input shape for handlers that take nothing from the
/// request. Binding short-circuits to the zero value without touching the
/// request at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

impl Validate for Empty {}

/// Accumulates per-field validation messages.
///
/// A convenience for validators that check several fields before failing;
/// convert the collected errors into a single fault with
/// [`FieldErrors::into_fault`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldErrors {
    fields: IndexMap<String, Vec<String>>,
}

impl FieldErrors {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error message for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Returns `true` if no errors were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of fields with errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Converts the collected errors into a 400 fault, or `Ok(())` when
    /// nothing was recorded.
    pub fn into_fault(self) -> FaultResult<()> {
        if self.fields.is_empty() {
            return Ok(());
        }

        let detail = self
            .fields
            .iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");

        Err(Fault::bad_request(detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;

    #[test]
    fn test_default_validate_accepts() {
        struct Anything;
        impl Validate for Anything {}

        assert!(Anything.validate().is_ok());
    }

    #[test]
    fn test_empty_deserializes_from_object() {
        let empty: Empty = serde_json::from_str("{}").expect("should deserialize");
        assert_eq!(empty, Empty {});
    }

    #[test]
    fn test_field_errors_accumulate() {
        let mut errors = FieldErrors::new();
        assert!(errors.is_empty());

        errors.add("id", "must be positive");
        errors.add("id", "must fit in 32 bits");
        errors.add("name", "too long");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_field_errors_into_fault() {
        let mut errors = FieldErrors::new();
        errors.add("id", "must be positive");

        let fault = errors.into_fault().unwrap_err();
        assert_eq!(fault.kind(), FaultKind::BadRequest);
        assert!(fault.message().contains("id: must be positive"));
    }

    #[test]
    fn test_empty_field_errors_are_ok() {
        assert!(FieldErrors::new().into_fault().is_ok());
    }
}
