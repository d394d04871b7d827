//! Fluent API for declaring containers.

use stackline_common::error::{Result, StacklineError};
use stackline_model::container::{
    ContainerDependency, ContainerSpec, DependencyCondition, ImageRef, MountPoint, PortMapping,
    SecretRef,
};
use stackline_model::logs::LogConfiguration;

/// Builder for configuring a container before adding it to a task.
#[derive(Debug)]
pub struct ContainerBuilder {
    name: String,
    image: Option<ImageRef>,
    essential: bool,
    command: Vec<String>,
    env: Vec<(String, String)>,
    secrets: Vec<(String, SecretRef)>,
    ports: Vec<PortMapping>,
    mounts: Vec<MountPoint>,
    logging: Option<LogConfiguration>,
    depends_on: Vec<ContainerDependency>,
}

impl ContainerBuilder {
    /// Creates a new builder with the given container name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            essential: true,
            command: Vec::new(),
            env: Vec::new(),
            secrets: Vec::new(),
            ports: Vec::new(),
            mounts: Vec::new(),
            logging: None,
            depends_on: Vec::new(),
        }
    }

    /// Sets the image.
    #[must_use]
    pub fn image(mut self, image: ImageRef) -> Self {
        self.image = Some(image);
        self
    }

    /// Sets whether the task stops when this container exits.
    #[must_use]
    pub const fn essential(mut self, essential: bool) -> Self {
        self.essential = essential;
        self
    }

    /// Overrides the image's command.
    #[must_use]
    pub fn command<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = cmd.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Adds an environment variable resolved at deploy time.
    #[must_use]
    pub fn secret(mut self, key: impl Into<String>, secret: SecretRef) -> Self {
        self.secrets.push((key.into(), secret));
        self
    }

    /// Exposes a TCP port.
    #[must_use]
    pub fn port(mut self, container_port: u16) -> Self {
        self.ports.push(PortMapping::tcp(container_port));
        self
    }

    /// Mounts a task volume.
    #[must_use]
    pub fn mount(
        mut self,
        volume: impl Into<String>,
        path: impl Into<String>,
        read_only: bool,
    ) -> Self {
        self.mounts.push(MountPoint {
            source_volume: volume.into(),
            container_path: path.into(),
            read_only,
        });
        self
    }

    /// Routes output to a log sink.
    #[must_use]
    pub fn logging(mut self, logging: LogConfiguration) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Delays start until `container` reaches `condition`.
    #[must_use]
    pub fn depends_on(
        mut self,
        container: impl Into<String>,
        condition: DependencyCondition,
    ) -> Self {
        self.depends_on.push(ContainerDependency {
            container: container.into(),
            condition,
        });
        self
    }

    /// Builds the container spec.
    ///
    /// # Errors
    ///
    /// Returns an error if the image or the log routing is missing, or an
    /// environment key is set twice.
    pub fn build(self) -> Result<ContainerSpec> {
        let image = self.image.ok_or_else(|| StacklineError::Config {
            message: format!("container \"{}\" has no image", self.name),
        })?;
        let logging = self.logging.ok_or_else(|| StacklineError::Config {
            message: format!("container \"{}\" has no log sink", self.name),
        })?;

        let mut spec = ContainerSpec::new(self.name, image, logging);
        spec.essential = self.essential;
        spec.command = self.command;
        for (key, value) in self.env {
            if spec.environment.insert(key.clone(), value).is_some() {
                return Err(StacklineError::Duplicate {
                    kind: "environment variable",
                    name: format!("{}/{key}", spec.name),
                });
            }
        }
        for (key, secret) in self.secrets {
            if spec.environment.contains_key(&key)
                || spec.secrets.insert(key.clone(), secret).is_some()
            {
                return Err(StacklineError::Duplicate {
                    kind: "environment variable",
                    name: format!("{}/{key}", spec.name),
                });
            }
        }
        spec.port_mappings = self.ports;
        spec.mount_points = self.mounts;
        spec.depends_on = self.depends_on;
        Ok(spec)
    }
}
