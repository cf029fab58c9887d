//! Typed configuration sections.
//!
//! The YAML layout mirrors the deployment config: one document with
//! `layout_apply`, `db`, `hardware_control`, `get_information`,
//! `workflow_manager`, and `message_broker` sections. Every leaf has a
//! serde default so sparse override files stay small.

use serde::{Deserialize, Serialize};

use crate::policy::{PollingPolicy, RetryPolicy, SkipTarget};

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutApplyConfig {
    #[serde(default)]
    pub layout_apply: LayoutApplySection,
    #[serde(default)]
    pub db: DbSection,
    #[serde(default)]
    pub hardware_control: HardwareControlSection,
    #[serde(default)]
    pub get_information: GetInformationSection,
    #[serde(default)]
    pub workflow_manager: WorkflowManagerSection,
    #[serde(default)]
    pub message_broker: MessageBrokerSection,
    /// SHA-256 of the canonical merged config; filled in by the loader.
    #[serde(skip)]
    pub config_hash: String,
}

// ---------------------------------------------------------------------------
// layout_apply
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutApplySection {
    #[serde(default = "default_bind_host")]
    pub host: String,
    #[serde(default = "default_bind_port")]
    pub port: u16,
    #[serde(default)]
    pub request: RequestSection,
}

impl Default for LayoutApplySection {
    fn default() -> Self {
        LayoutApplySection {
            host: default_bind_host(),
            port: default_bind_port(),
            request: RequestSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestSection {
    /// Worker-pool size for one apply. `None` uses the host's
    /// available-parallelism hint.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_workers: Option<usize>,
}

// ---------------------------------------------------------------------------
// db
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbSection {
    #[serde(default = "default_dbname")]
    pub dbname: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    /// Overridable via `LAP_DB_PASSWORD`; see [`crate::secrets`].
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
}

impl Default for DbSection {
    fn default() -> Self {
        DbSection {
            dbname: default_dbname(),
            user: default_db_user(),
            password: String::new(),
            host: default_host(),
            port: default_db_port(),
        }
    }
}

impl DbSection {
    /// Postgres connection URL. Never log the result; it embeds the password.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.dbname
        )
    }
}

// ---------------------------------------------------------------------------
// hardware_control
// ---------------------------------------------------------------------------

/// Per-operation request behavior against a remote endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSpec {
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Responses treated as success-equivalent.
    #[serde(default)]
    pub skip: Vec<SkipTarget>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Boot-confirmation polling against `GET …/os-boot`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsBootSpec {
    #[serde(default)]
    pub polling: PollingPolicy,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareControlSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_remote_port")]
    pub port: u16,
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default)]
    pub connect: ApiSpec,
    #[serde(default)]
    pub disconnect: ApiSpec,
    #[serde(default)]
    pub boot: ApiSpec,
    #[serde(default)]
    pub shutdown: ApiSpec,
    #[serde(default)]
    pub isosboot: OsBootSpec,
}

impl Default for HardwareControlSection {
    fn default() -> Self {
        HardwareControlSection {
            host: default_host(),
            port: default_remote_port(),
            uri: default_uri(),
            connect: ApiSpec::default(),
            disconnect: ApiSpec::default(),
            boot: ApiSpec::default(),
            shutdown: ApiSpec::default(),
            isosboot: OsBootSpec::default(),
        }
    }
}

impl HardwareControlSection {
    pub fn base_url(&self) -> String {
        format!(
            "http://{}:{}/{}",
            self.host,
            self.port,
            self.uri.trim_matches('/')
        )
    }
}

// ---------------------------------------------------------------------------
// get_information
// ---------------------------------------------------------------------------

/// Shutdown-confirmation polling against `GET …/device-info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetInformationSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_remote_port")]
    pub port: u16,
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default)]
    pub polling: PollingPolicy,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for GetInformationSection {
    fn default() -> Self {
        GetInformationSection {
            host: default_host(),
            port: default_remote_port(),
            uri: default_uri(),
            polling: PollingPolicy::default(),
            timeout: default_timeout(),
        }
    }
}

impl GetInformationSection {
    pub fn base_url(&self) -> String {
        format!(
            "http://{}:{}/{}",
            self.host,
            self.port,
            self.uri.trim_matches('/')
        )
    }
}

// ---------------------------------------------------------------------------
// workflow_manager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowManagerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_remote_port")]
    pub port: u16,
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default)]
    pub extended_procedure: ExtendedProcedureSpec,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for WorkflowManagerSection {
    fn default() -> Self {
        WorkflowManagerSection {
            host: default_host(),
            port: default_remote_port(),
            uri: default_uri(),
            extended_procedure: ExtendedProcedureSpec::default(),
            timeout: default_timeout(),
        }
    }
}

impl WorkflowManagerSection {
    pub fn base_url(&self) -> String {
        format!(
            "http://{}:{}/{}",
            self.host,
            self.port,
            self.uri.trim_matches('/')
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtendedProcedureSpec {
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub skip: Vec<SkipTarget>,
    #[serde(default)]
    pub polling: PollingPolicy,
}

// ---------------------------------------------------------------------------
// message_broker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBrokerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default = "default_pubsub")]
    pub pubsub: String,
    #[serde(default = "default_topic")]
    pub topic: String,
}

impl Default for MessageBrokerSection {
    fn default() -> Self {
        MessageBrokerSection {
            host: default_host(),
            port: default_broker_port(),
            pubsub: default_pubsub(),
            topic: default_topic(),
        }
    }
}

impl MessageBrokerSection {
    /// Sidecar publish endpoint for the configured pubsub/topic pair.
    pub fn publish_url(&self) -> String {
        format!(
            "http://{}:{}/v1.0/publish/{}/{}",
            self.host, self.port, self.pubsub, self.topic
        )
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_bind_port() -> u16 {
    8003
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_dbname() -> String {
    "layoutapply".to_string()
}

fn default_db_user() -> String {
    "layoutapply".to_string()
}

fn default_remote_port() -> u16 {
    48889
}

fn default_broker_port() -> u16 {
    3500
}

fn default_uri() -> String {
    "api/v1".to_string()
}

fn default_pubsub() -> String {
    "layout_apply_apply".to_string()
}

fn default_topic() -> String {
    "layout_apply_apply.completed".to_string()
}

fn default_timeout() -> u64 {
    30
}
