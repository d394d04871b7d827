//! In-memory parameter store backing deploy-time secrets.

use std::collections::BTreeMap;

use stackline_common::error::{Result, StacklineError};
use stackline_model::container::SecretRef;

/// Named string parameters.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    entries: BTreeMap<String, String>,
}

impl ParameterStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or overwrites `name`.
    pub fn put(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        tracing::debug!(parameter = %name, "parameter stored");
        let _ = self.entries.insert(name, value.into());
    }

    /// Value of `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Deletes `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }

    /// Resolves a secret reference.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::Deploy` if the parameter does not exist.
    pub fn resolve(&self, secret: &SecretRef) -> Result<&str> {
        match secret {
            SecretRef::Parameter { name } => self.get(name).ok_or_else(|| StacklineError::Deploy {
                message: format!("parameter \"{name}\" does not exist"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_resolve() {
        let mut store = ParameterStore::new();
        store.put("flask-cw-agent", "{}");
        assert_eq!(store.resolve(&SecretRef::parameter("flask-cw-agent")).expect("resolve"), "{}");
    }

    #[test]
    fn missing_parameter_is_deploy_error() {
        let store = ParameterStore::new();
        let err = store.resolve(&SecretRef::parameter("flask-cw-agent")).unwrap_err();
        assert!(matches!(err, StacklineError::Deploy { .. }));
        assert!(err.to_string().contains("flask-cw-agent"), "got: {err}");
    }

    #[test]
    fn remove_deletes_entry() {
        let mut store = ParameterStore::new();
        store.put("a", "1");
        assert_eq!(store.remove("a").as_deref(), Some("1"));
        assert!(store.get("a").is_none());
    }
}
