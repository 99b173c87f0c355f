//! Validator contract for typed reads and checked writes.
//!
//! A validator inspects an untyped JSON value and either returns a typed
//! value or rejects it with a message. Closures of the shape
//! `Fn(&Value) -> anyhow::Result<T>` are validators, and [`Typed`] turns any
//! `DeserializeOwned` type into one.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

/// Inspects a raw value and produces a typed value or a rejection.
pub trait Validator<T> {
    /// Validates `raw`.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason; the store wraps it in
    /// [`Error::ValidationFailed`](crate::Error::ValidationFailed).
    fn validate(&self, raw: &Value) -> anyhow::Result<T>;
}

impl<T, F> Validator<T> for F
where
    F: Fn(&Value) -> anyhow::Result<T>,
{
    fn validate(&self, raw: &Value) -> anyhow::Result<T> {
        self(raw)
    }
}

/// Validator that deserializes the raw value into `T` with serde.
///
/// # Example
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct Settings { theme: String }
///
/// let settings = store.get_with("settings", &Typed::<Settings>::new())?;
/// ```
pub struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Typed<T> {
    /// Creates a serde-backed validator for `T`.
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Typed")
            .field(&std::any::type_name::<T>())
            .finish()
    }
}

impl<T: DeserializeOwned> Validator<T> for Typed<T> {
    fn validate(&self, raw: &Value) -> anyhow::Result<T> {
        Ok(T::deserialize(raw)?)
    }
}

/// Formats a validator failure, including its cause chain.
pub(crate) fn rejection_message(err: &anyhow::Error) -> String {
    format!("{err:#}")
}
