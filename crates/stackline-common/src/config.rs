//! Configuration model for synthesizing the stacks.
//!
//! Every section has defaults, so an empty file (or no file at all)
//! describes the stock two-stack deployment.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, StacklineError};
use crate::types::TagMutability;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StacklineConfig {
    /// Account and region used to render physical identifiers.
    pub environment: EnvironmentConfig,
    /// Image registry stack settings.
    pub registry: RegistryConfig,
    /// Web service stack settings.
    pub service: ServiceConfig,
    /// Observability agent settings.
    pub agent: AgentConfig,
}

/// Deployment target supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Account identifier.
    pub account: String,
    /// Region name.
    pub region: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            account: constants::DEFAULT_ACCOUNT.into(),
            region: constants::DEFAULT_REGION.into(),
        }
    }
}

/// Settings of the registry stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Name of the stack owning the registry.
    pub stack_name: String,
    /// Repository name.
    pub repository_name: String,
    /// Tag mutability policy.
    pub tag_mutability: TagMutability,
    /// Number of most recent images the lifecycle rule keeps.
    pub max_image_count: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stack_name: constants::DEFAULT_REGISTRY_STACK.into(),
            repository_name: constants::DEFAULT_REPOSITORY_NAME.into(),
            tag_mutability: TagMutability::Mutable,
            max_image_count: constants::DEFAULT_MAX_IMAGE_COUNT,
        }
    }
}

/// Settings of the service stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name of the stack owning the service.
    pub stack_name: String,
    /// Number of task instances kept running.
    pub desired_count: u32,
    /// Whether the load balancer is internet-facing.
    pub public: bool,
    /// Task CPU units.
    pub cpu: u32,
    /// Task memory limit in MiB.
    pub memory_mib: u32,
    /// Tag the main image is pulled at.
    pub image_tag: String,
    /// Port the main container listens on.
    pub container_port: u16,
    /// Whether a sidecar exit stops the task.
    pub sidecar_essential: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            stack_name: constants::DEFAULT_SERVICE_STACK.into(),
            desired_count: 1,
            public: true,
            cpu: constants::DEFAULT_TASK_CPU,
            memory_mib: constants::DEFAULT_TASK_MEMORY_MIB,
            image_tag: constants::DEFAULT_IMAGE_TAG.into(),
            container_port: constants::DEFAULT_CONTAINER_PORT,
            sidecar_essential: true,
        }
    }
}

/// Settings of the observability pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Parameter store entry holding the sidecar configuration.
    pub parameter_name: String,
    /// Trace sampling ratio, as the agent reads it.
    pub sampler_ratio: String,
    /// Verbosity of the embedded agent.
    pub log_level: String,
    /// Service name reported in traces.
    pub service_name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            parameter_name: constants::DEFAULT_AGENT_PARAMETER.into(),
            sampler_ratio: constants::DEFAULT_SAMPLER_RATIO.into(),
            log_level: constants::DEFAULT_AGENT_LOG_LEVEL.into(),
            service_name: constants::DEFAULT_SERVICE_NAME.into(),
        }
    }
}

impl StacklineConfig {
    /// Loads a configuration file, choosing the format by extension.
    ///
    /// `.json` files are read as JSON; anything else as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| StacklineError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config: Self = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("registry.stack_name", &self.registry.stack_name),
            ("registry.repository_name", &self.registry.repository_name),
            ("service.stack_name", &self.service.stack_name),
            ("service.image_tag", &self.service.image_tag),
            ("agent.parameter_name", &self.agent.parameter_name),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(config_err(format!("{field} must not be empty")));
            }
        }
        if self.registry.stack_name == self.service.stack_name {
            return Err(config_err(format!(
                "registry and service stacks share the name \"{}\"",
                self.service.stack_name
            )));
        }
        if self.registry.max_image_count == 0 {
            return Err(config_err("registry.max_image_count must be at least 1".into()));
        }
        match self.agent.sampler_ratio.parse::<f64>() {
            Ok(ratio) if (0.0..=1.0).contains(&ratio) => Ok(()),
            _ => Err(config_err(format!(
                "agent.sampler_ratio must be a number in [0, 1], got \"{}\"",
                self.agent.sampler_ratio
            ))),
        }
    }
}

const fn config_err(message: String) -> StacklineError {
    StacklineError::Config { message }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_validate() {
        let config = StacklineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.registry.max_image_count, 3);
        assert_eq!(config.service.desired_count, 1);
        assert!(config.service.public);
    }

    #[test]
    fn load_partial_yaml_keeps_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("tempfile");
        writeln!(file, "service:\n  desired_count: 2\nagent:\n  sampler_ratio: \"0.5\"")
            .expect("write");

        let config = StacklineConfig::load(file.path()).expect("load");
        assert_eq!(config.service.desired_count, 2);
        assert_eq!(config.agent.sampler_ratio, "0.5");
        assert_eq!(config.registry.repository_name, "flask-app");
    }

    #[test]
    fn load_json_by_extension() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("tempfile");
        write!(file, r#"{{"registry": {{"tag_mutability": "immutable"}}}}"#).expect("write");

        let config = StacklineConfig::load(file.path()).expect("load");
        assert_eq!(config.registry.tag_mutability, TagMutability::Immutable);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = StacklineConfig::load(Path::new("/nonexistent/stackline.yaml")).unwrap_err();
        assert!(matches!(err, StacklineError::Io { .. }), "got: {err}");
    }

    #[test]
    fn sampler_ratio_out_of_range_fails() {
        let mut config = StacklineConfig::default();
        config.agent.sampler_ratio = "1.5".into();
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("sampler_ratio"), "got: {msg}");
    }

    #[test]
    fn zero_image_count_fails() {
        let mut config = StacklineConfig::default();
        config.registry.max_image_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn shared_stack_names_fail() {
        let mut config = StacklineConfig::default();
        config.service.stack_name = config.registry.stack_name.clone();
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("share the name"), "got: {msg}");
    }
}
