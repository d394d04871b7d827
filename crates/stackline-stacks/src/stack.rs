//! A named, independently synthesizable collection of resources.

use std::collections::BTreeSet;

use stackline_common::error::{Result, StacklineError};
use stackline_common::types::{LogicalId, StackId};
use stackline_model::reference::{CrossStackRef, ResourceRef};
use stackline_model::resource::{Resource, ResourceKind, ResourceNode, ResourceType};

/// Resources declared together, plus the handles imported from other stacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    id: StackId,
    resources: Vec<ResourceNode>,
    imports: BTreeSet<ResourceRef>,
}

impl Stack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: StackId::new(id),
            resources: Vec::new(),
            imports: BTreeSet::new(),
        }
    }

    /// Stack name.
    #[must_use]
    pub const fn id(&self) -> &StackId {
        &self.id
    }

    /// Declares `resource` under `local_name`, returning its logical ID.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::Duplicate` if the name is already declared.
    pub fn add(&mut self, local_name: &str, resource: Resource) -> Result<LogicalId> {
        if self.resources.iter().any(|n| n.local_name == local_name) {
            return Err(StacklineError::Duplicate {
                kind: "resource",
                name: format!("{}/{local_name}", self.id),
            });
        }
        let logical_id = LogicalId::derive(&self.id, local_name);
        tracing::debug!(
            stack = %self.id,
            %logical_id,
            kind = %resource.kind(),
            "resource declared"
        );
        self.resources.push(ResourceNode {
            logical_id: logical_id.clone(),
            local_name: local_name.to_string(),
            resource,
        });
        Ok(logical_id)
    }

    /// Records that this stack consumes `handle`.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::CrossStack` if the handle points into this
    /// stack.
    pub fn import<T>(&mut self, handle: &CrossStackRef<T>) -> Result<ResourceRef> {
        if handle.stack() == &self.id {
            return Err(StacklineError::CrossStack {
                message: format!(
                    "stack \"{}\" cannot import its own resource {}",
                    self.id,
                    handle.logical_id()
                ),
            });
        }
        let target = ResourceRef::from(handle);
        let _ = self.imports.insert(target.clone());
        Ok(target)
    }

    /// Produces a handle other stacks can consume.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::NotFound` if no resource of kind `T` has
    /// this logical ID.
    pub fn export<T: ResourceType>(&self, logical_id: &LogicalId) -> Result<CrossStackRef<T>> {
        match self.resource(logical_id) {
            Some(node) if node.resource.kind() == T::KIND => {
                Ok(CrossStackRef::new(self.id.clone(), logical_id.clone()))
            }
            _ => Err(StacklineError::NotFound {
                kind: T::KIND.as_str(),
                id: format!("{}/{logical_id}", self.id),
            }),
        }
    }

    /// Looks up a resource by logical ID.
    #[must_use]
    pub fn resource(&self, logical_id: &LogicalId) -> Option<&ResourceNode> {
        self.resources.iter().find(|n| &n.logical_id == logical_id)
    }

    /// Resources in declaration order.
    #[must_use]
    pub fn resources(&self) -> &[ResourceNode] {
        &self.resources
    }

    /// Handles consumed from other stacks.
    #[must_use]
    pub const fn imports(&self) -> &BTreeSet<ResourceRef> {
        &self.imports
    }

    /// Logical IDs of every declared resource of `kind`.
    #[must_use]
    pub fn ids_of_kind(&self, kind: ResourceKind) -> BTreeSet<LogicalId> {
        self.resources
            .iter()
            .filter(|n| n.resource.kind() == kind)
            .map(|n| n.logical_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use stackline_common::types::TagMutability;
    use stackline_model::logs::LogSink;
    use stackline_model::registry::Registry;

    use super::*;

    fn registry() -> Resource {
        Resource::Registry(Registry::new("flask-app", TagMutability::Mutable).expect("valid"))
    }

    #[test]
    fn add_returns_stable_logical_id() {
        let mut a = Stack::new("ECRStack");
        let mut b = Stack::new("ECRStack");
        let id_a = a.add("FlaskApp", registry()).expect("add");
        let id_b = b.add("FlaskApp", registry()).expect("add");
        assert_eq!(id_a, id_b);
        assert!(a.resource(&id_a).is_some());
    }

    #[test]
    fn duplicate_local_name_fails() {
        let mut stack = Stack::new("ECRStack");
        let _ = stack.add("FlaskApp", registry()).expect("first");
        let msg = stack.add("FlaskApp", registry()).unwrap_err().to_string();
        assert!(msg.contains("ECRStack/FlaskApp"), "got: {msg}");
    }

    #[test]
    fn export_checks_kind() {
        let mut stack = Stack::new("ECRStack");
        let id = stack.add("FlaskApp", registry()).expect("add");
        assert!(stack.export::<Registry>(&id).is_ok());
        let err = stack.export::<LogSink>(&id).unwrap_err();
        assert!(matches!(err, StacklineError::NotFound { kind: "log sink", .. }));
    }

    #[test]
    fn import_records_handle() {
        let mut producer = Stack::new("ECRStack");
        let id = producer.add("FlaskApp", registry()).expect("add");
        let handle = producer.export::<Registry>(&id).expect("export");

        let mut consumer = Stack::new("AppStack");
        let target = consumer.import(&handle).expect("import");
        assert_eq!(target.stack.as_str(), "ECRStack");
        assert!(consumer.imports().contains(&target));
    }

    #[test]
    fn self_import_fails() {
        let mut stack = Stack::new("ECRStack");
        let id = stack.add("FlaskApp", registry()).expect("add");
        let handle = stack.export::<Registry>(&id).expect("export");
        assert!(matches!(
            stack.import(&handle),
            Err(StacklineError::CrossStack { .. })
        ));
    }
}
