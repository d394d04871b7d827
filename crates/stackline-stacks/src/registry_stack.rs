//! Stack owning the image registry.

use stackline_common::config::RegistryConfig;
use stackline_common::constants::DEFAULT_MAX_IMAGE_COUNT;
use stackline_common::error::Result;
use stackline_common::types::{StackId, TagMutability};
use stackline_model::reference::CrossStackRef;
use stackline_model::registry::{Registry, TagSelection};
use stackline_model::resource::Resource;

use crate::app::App;
use crate::stack::Stack;

const REGISTRY_LOCAL_NAME: &str = "FlaskApp";

/// Parameters of [`RegistryStack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStackProps {
    /// Repository name.
    pub repository_name: String,
    /// Tag mutability policy.
    pub tag_mutability: TagMutability,
    /// Number of most recent images kept.
    pub max_image_count: u32,
}

impl From<&RegistryConfig> for RegistryStackProps {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            repository_name: config.repository_name.clone(),
            tag_mutability: config.tag_mutability,
            max_image_count: config.max_image_count,
        }
    }
}

/// Creates a registry whose single lifecycle rule keeps the newest
/// [`DEFAULT_MAX_IMAGE_COUNT`] images.
///
/// # Errors
///
/// Returns an error if `name` is not a valid repository name.
pub fn create_registry(name: &str, tag_mutability: TagMutability) -> Result<Registry> {
    create_registry_with_bound(name, tag_mutability, DEFAULT_MAX_IMAGE_COUNT)
}

fn create_registry_with_bound(
    name: &str,
    tag_mutability: TagMutability,
    bound: u32,
) -> Result<Registry> {
    let mut registry = Registry::new(name, tag_mutability)?;
    registry.add_lifecycle_rule(TagSelection::Any, bound)?;
    Ok(registry)
}

/// The registry stack and the handle it exports.
#[derive(Debug, Clone)]
pub struct RegistryStack {
    id: StackId,
    repository: CrossStackRef<Registry>,
}

impl RegistryStack {
    /// Declares the registry stack in `app`.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid repository names or image bounds, or
    /// if `app` already has a stack named `id`.
    pub fn new(app: &mut App, id: &str, props: RegistryStackProps) -> Result<Self> {
        let mut stack = Stack::new(id);
        let registry = create_registry_with_bound(
            &props.repository_name,
            props.tag_mutability,
            props.max_image_count,
        )?;
        tracing::info!(
            stack = id,
            repository = %registry.name,
            max_image_count = props.max_image_count,
            "declaring registry"
        );
        let logical_id = stack.add(REGISTRY_LOCAL_NAME, Resource::Registry(registry))?;
        let repository = stack.export::<Registry>(&logical_id)?;
        let id = app.add_stack(stack)?;
        Ok(Self { id, repository })
    }

    /// Stack name.
    #[must_use]
    pub const fn id(&self) -> &StackId {
        &self.id
    }

    /// Handle to the registry for consuming stacks.
    #[must_use]
    pub fn repository(&self) -> CrossStackRef<Registry> {
        self.repository.clone()
    }
}

#[cfg(test)]
mod tests {
    use stackline_common::config::EnvironmentConfig;
    use stackline_model::resource::ResourceKind;

    use super::*;

    #[test]
    fn create_registry_adds_one_terminal_rule() {
        let registry = create_registry("flask-app", TagMutability::Mutable).expect("create");
        assert_eq!(registry.lifecycle_rules.len(), 1);
        assert_eq!(registry.lifecycle_rules[0].max_image_count, 3);
        assert!(registry.has_terminal_rule());
    }

    #[test]
    fn create_registry_rejects_bad_name() {
        assert!(create_registry("Flask App", TagMutability::Mutable).is_err());
    }

    #[test]
    fn stack_exports_registry_handle() {
        let mut app = App::new("test", EnvironmentConfig::default());
        let stack = RegistryStack::new(
            &mut app,
            "ECRStack",
            RegistryStackProps::from(&RegistryConfig::default()),
        )
        .expect("stack");

        let handle = stack.repository();
        assert_eq!(handle.stack(), stack.id());
        let declared = app.stack(stack.id()).expect("added to app");
        let node = declared.resource(handle.logical_id()).expect("declared");
        assert_eq!(node.resource.kind(), ResourceKind::Registry);
    }

    #[test]
    fn duplicate_stack_name_fails() {
        let mut app = App::new("test", EnvironmentConfig::default());
        let props = RegistryStackProps::from(&RegistryConfig::default());
        let _ = RegistryStack::new(&mut app, "ECRStack", props.clone()).expect("first");
        assert!(RegistryStack::new(&mut app, "ECRStack", props).is_err());
    }
}
