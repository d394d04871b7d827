//! System-wide constants and defaults.

/// Application name used in CLI output and plan files.
pub const APP_NAME: &str = "stackline";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "stackline";

/// Number of SHA-256 bytes appended to derived logical IDs.
pub const LOGICAL_ID_HASH_BYTES: usize = 4;

/// Default account used when resolving physical identifiers.
pub const DEFAULT_ACCOUNT: &str = "000000000000";

/// Default region used when resolving physical identifiers.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default name of the stack owning the image registry.
pub const DEFAULT_REGISTRY_STACK: &str = "ECRStack";

/// Default name of the stack owning the web service.
pub const DEFAULT_SERVICE_STACK: &str = "AppStack";

/// Default image repository name.
pub const DEFAULT_REPOSITORY_NAME: &str = "flask-app";

/// Number of images the registry lifecycle rule retains.
pub const DEFAULT_MAX_IMAGE_COUNT: u32 = 3;

/// Tag the main container image is pulled at.
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Port the main container listens on.
pub const DEFAULT_CONTAINER_PORT: u16 = 80;

/// Task CPU units.
pub const DEFAULT_TASK_CPU: u32 = 256;

/// Task memory limit in MiB.
pub const DEFAULT_TASK_MEMORY_MIB: u32 = 512;

/// Principal trusted by both task roles.
pub const ECS_TASKS_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";

/// Managed policy granting image pulls and log writes to the runtime.
pub const EXECUTION_ROLE_POLICY: &str = "service-role/AmazonECSTaskExecutionRolePolicy";

/// Managed policy granting parameter store access to the running task.
pub const TASK_ROLE_PARAMETER_POLICY: &str = "AmazonSSMFullAccess";

/// Managed policy granting metric and log emission to the running task.
pub const TASK_ROLE_AGENT_POLICY: &str = "CloudWatchAgentServerPolicy";

/// Shared volume populated by the init container.
pub const INSTRUMENTATION_VOLUME: &str = "opentelemetry-auto-instrumentation-python";

/// Mount path of the shared volume in both main and init containers.
pub const INSTRUMENTATION_MOUNT_PATH: &str = "/otel-auto-instrumentation-python";

/// Monitoring agent image run as a sidecar.
pub const AGENT_IMAGE: &str = "public.ecr.aws/cloudwatch-agent/cloudwatch-agent:latest-arm64";

/// Instrumentation distribution image run as the init container.
pub const INSTRUMENTATION_IMAGE: &str =
    "public.ecr.aws/aws-observability/adot-autoinstrumentation-python:v0.5.0";

/// Directory inside the instrumentation image copied onto the volume.
pub const INSTRUMENTATION_SOURCE_DIR: &str = "/autoinstrumentation/.";

/// Environment key the sidecar reads its configuration from.
pub const AGENT_CONFIG_ENV: &str = "CW_CONFIG_CONTENT";

/// Parameter store entry holding the sidecar configuration.
pub const DEFAULT_AGENT_PARAMETER: &str = "flask-cw-agent";

/// Fixed log group name of the sidecar.
pub const AGENT_LOG_GROUP: &str = "/ecs/ecs-cw-agent";

/// Fixed log group name of the init container.
pub const INIT_LOG_GROUP: &str = "/ecs/ecs-init";

/// Log retention of the application log sink, in days.
pub const APP_LOG_RETENTION_DAYS: u32 = 7;

/// Log retention applied when none is requested, in days.
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 731;

/// Default trace sampling ratio of the embedded agent.
pub const DEFAULT_SAMPLER_RATIO: &str = "0.05";

/// Default verbosity of the embedded agent.
pub const DEFAULT_AGENT_LOG_LEVEL: &str = "debug";

/// Service name reported by the embedded agent.
pub const DEFAULT_SERVICE_NAME: &str = "APM_SAMPLE";

/// Local OTLP endpoint the sidecar exposes for metrics.
pub const OTLP_METRICS_ENDPOINT: &str = "http://127.0.0.1:4316/v1/metrics";

/// Local OTLP endpoint the sidecar exposes for traces.
pub const OTLP_TRACES_ENDPOINT: &str = "http://localhost:4316/v1/traces";

/// Application source directory inside the main image.
pub const APP_SOURCE_DIR: &str = "/usr/src/app";

/// Path probed by the load balancer health check.
pub const HEALTH_CHECK_PATH: &str = "/";
