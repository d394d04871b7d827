//! Stack running the web task behind a load balancer.

use stackline_common::config::StacklineConfig;
use stackline_common::error::Result;
use stackline_common::types::{LogicalId, StackId};
use stackline_model::reference::CrossStackRef;
use stackline_model::registry::Registry;
use stackline_model::resource::Resource;
use stackline_model::service::{self, ServiceWrapper};

use crate::app::App;
use crate::stack::Stack;
use crate::topology::{self, Topology, TopologyOptions};

const SERVICE_LOCAL_NAME: &str = "FlaskServer";

/// Parameters of [`ServiceStack`].
#[derive(Debug, Clone)]
pub struct ServiceStackProps {
    /// Registry the main image is pulled from.
    pub registry: CrossStackRef<Registry>,
    /// Number of task instances kept running.
    pub desired_count: u32,
    /// Whether the load balancer is internet-facing.
    pub public: bool,
    /// Task topology tunables.
    pub topology: TopologyOptions,
}

impl ServiceStackProps {
    /// Default props for `registry`: one public instance.
    #[must_use]
    pub fn new(registry: CrossStackRef<Registry>) -> Self {
        Self {
            registry,
            desired_count: 1,
            public: true,
            topology: TopologyOptions::default(),
        }
    }

    /// Props taken from the `service` and `agent` config sections.
    #[must_use]
    pub fn from_config(registry: CrossStackRef<Registry>, config: &StacklineConfig) -> Self {
        Self {
            registry,
            desired_count: config.service.desired_count,
            public: config.service.public,
            topology: TopologyOptions::from(config),
        }
    }
}

/// The service stack: task topology plus service wrapper.
#[derive(Debug, Clone)]
pub struct ServiceStack {
    id: StackId,
    topology: Topology,
    service_id: LogicalId,
    service: ServiceWrapper,
}

impl ServiceStack {
    /// Declares the service stack in `app`.
    ///
    /// # Errors
    ///
    /// Returns an error if the topology cannot be built, the task exposes
    /// nothing to publish, or `app` already has a stack named `id`.
    pub fn new(app: &mut App, id: &str, props: ServiceStackProps) -> Result<Self> {
        let mut stack = Stack::new(id);
        let topology = topology::build_topology(&mut stack, &props.registry, &props.topology)?;
        let service = service::publish(
            &topology.task,
            topology.task_id.clone(),
            props.desired_count,
            props.public,
        )?;
        let service_id = stack.add(SERVICE_LOCAL_NAME, Resource::Service(service.clone()))?;
        let id = app.add_stack(stack)?;
        Ok(Self {
            id,
            topology,
            service_id,
            service,
        })
    }

    /// Stack name.
    #[must_use]
    pub const fn id(&self) -> &StackId {
        &self.id
    }

    /// Everything the topology builder declared.
    #[must_use]
    pub const fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Logical ID of the task spec.
    #[must_use]
    pub const fn task(&self) -> &LogicalId {
        &self.topology.task_id
    }

    /// Logical ID of the service.
    #[must_use]
    pub const fn service_id(&self) -> &LogicalId {
        &self.service_id
    }

    /// The service wrapper.
    #[must_use]
    pub const fn service(&self) -> &ServiceWrapper {
        &self.service
    }
}
