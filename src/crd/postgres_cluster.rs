use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// PostgresCluster is the Schema for the postgresclusters API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "pgcluster.example.com",
    version = "v1alpha1",
    kind = "PostgresCluster",
    plural = "postgresclusters",
    shortname = "pgc",
    namespaced,
    status = "PostgresClusterStatus",
    printcolumn = r#"{"name":"Version", "type":"integer", "jsonPath":".spec.postgresVersion"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresClusterSpec {
    /// PostgreSQL major version (e.g. 16)
    pub postgres_version: i32,

    /// Port on which PostgreSQL listens
    #[serde(default = "default_port")]
    pub port: i32,

    /// Instance sets that make up the cluster
    pub instances: Vec<InstanceSetSpec>,

    /// PostgreSQL users to manage. When unset, a single user named after
    /// the cluster is created, owning a database of the same name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<UserSpec>>,

    /// Connection proxy configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxySpec>,

    /// User-defined labels merged onto every managed resource
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

fn default_port() -> i32 {
    5432
}

/// A set of PostgreSQL instances sharing one storage configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSetSpec {
    /// Name of the instance set, unique within the cluster
    pub name: String,

    /// Number of instances in this set
    #[serde(default = "default_instance_replicas")]
    pub replicas: i32,

    /// Claim template for the PostgreSQL data volume
    pub data_volume_claim_spec: VolumeClaimSpec,

    /// Claim template for a separate write-ahead log volume. When unset,
    /// WAL files live on the data volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wal_volume_claim_spec: Option<VolumeClaimSpec>,
}

fn default_instance_replicas() -> i32 {
    1
}

/// Storage request for a persistent volume claim
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaimSpec {
    /// Storage class name (uses the cluster default if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Size of the persistent volume (e.g. "10Gi")
    pub size: String,

    /// Access modes for the volume
    #[serde(default = "default_access_modes")]
    pub access_modes: Vec<String>,
}

fn default_access_modes() -> Vec<String> {
    vec!["ReadWriteOnce".to_string()]
}

/// A PostgreSQL user and the databases it has access to
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    /// Role name inside PostgreSQL
    pub name: String,

    /// Databases this user may connect to. The first one is included in
    /// the user's connection secret.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub databases: Vec<String>,
}

/// Connection proxy configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxySpec {
    /// PgBouncer connection pooler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg_bouncer: Option<PgBouncerSpec>,
}

/// PgBouncer connection pooler configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PgBouncerSpec {
    /// Port on which PgBouncer listens
    #[serde(default = "default_pgbouncer_port")]
    pub port: i32,
}

fn default_pgbouncer_port() -> i32 {
    5432
}

/// Status of the PostgresCluster
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PostgresClusterStatus {
    /// Current phase of the cluster lifecycle
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Fingerprint of the database DDL most recently applied in PostgreSQL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub database_revision: String,

    /// Fingerprint of the user DDL most recently applied in PostgreSQL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub users_revision: String,

    /// Observed generation of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Cluster lifecycle phase
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub enum ClusterPhase {
    /// Cluster has no writable instance yet
    #[default]
    Pending,
    /// Cluster has a writable instance
    Running,
    /// Cluster is being deleted
    Deleting,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterPhase::Pending => write!(f, "Pending"),
            ClusterPhase::Running => write!(f, "Running"),
            ClusterPhase::Deleting => write!(f, "Deleting"),
        }
    }
}
