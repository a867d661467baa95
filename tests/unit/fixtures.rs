//! Test fixtures and builders for PostgresCluster resources and pods
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let cluster = PostgresClusterBuilder::new("my-cluster", "default").build();
//! let pod = PodBuilder::new("my-cluster", "my-cluster-instance1-0")
//!     .primary()
//!     .running(true)
//!     .build();
//! ```

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateRunning, ContainerStatus, Pod, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::core::ObjectMeta;

use pgcluster_operator::controller::CONTAINER_DATABASE;
use pgcluster_operator::crd::{
    InstanceSetSpec, PgBouncerSpec, PostgresCluster, PostgresClusterSpec, PostgresClusterStatus,
    ProxySpec, UserSpec, VolumeClaimSpec,
};
use pgcluster_operator::postgres::executor::{ExecResult, Executor};
use pgcluster_operator::resources::common::{LABEL_CLUSTER, LABEL_INSTANCE, LABEL_PATRONI_ROLE};

// =============================================================================
// PostgresCluster Builder
// =============================================================================

/// Builder for PostgresCluster test fixtures
#[allow(dead_code)]
pub struct PostgresClusterBuilder {
    name: String,
    namespace: String,
    uid: Option<String>,
    postgres_version: i32,
    port: i32,
    instances: Vec<InstanceSetSpec>,
    users: Option<Vec<UserSpec>>,
    proxy: Option<ProxySpec>,
    labels: BTreeMap<String, String>,
    status: Option<PostgresClusterStatus>,
}

#[allow(dead_code)]
impl PostgresClusterBuilder {
    /// Create a new builder with one instance set and no declared users
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            uid: Some("test-uid-12345".to_string()),
            postgres_version: 16,
            port: 5432,
            instances: vec![instance_set("instance1", false)],
            users: None,
            proxy: None,
            labels: BTreeMap::new(),
            status: None,
        }
    }

    /// Set the PostgreSQL port
    pub fn with_port(mut self, port: i32) -> Self {
        self.port = port;
        self
    }

    /// Add a declared user
    pub fn with_user(mut self, name: &str, databases: &[&str]) -> Self {
        self.users.get_or_insert_with(Vec::new).push(UserSpec {
            name: name.to_string(),
            databases: databases.iter().map(|db| db.to_string()).collect(),
        });
        self
    }

    /// Declare an empty user list (distinct from no list at all)
    pub fn with_no_users(mut self) -> Self {
        self.users = Some(Vec::new());
        self
    }

    /// Replace the instance sets
    pub fn with_instance_set(mut self, name: &str, wal_volume: bool) -> Self {
        self.instances = vec![instance_set(name, wal_volume)];
        self
    }

    /// Enable PgBouncer on the given port
    pub fn with_pgbouncer(mut self, port: i32) -> Self {
        self.proxy = Some(ProxySpec {
            pg_bouncer: Some(PgBouncerSpec { port }),
        });
        self
    }

    /// Set the persisted status revisions
    pub fn with_revisions(mut self, database_revision: &str, users_revision: &str) -> Self {
        self.status = Some(PostgresClusterStatus {
            database_revision: database_revision.to_string(),
            users_revision: users_revision.to_string(),
            ..Default::default()
        });
        self
    }

    /// Build the PostgresCluster resource
    pub fn build(self) -> PostgresCluster {
        PostgresCluster {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(self.namespace),
                uid: self.uid,
                generation: Some(1),
                ..Default::default()
            },
            spec: PostgresClusterSpec {
                postgres_version: self.postgres_version,
                port: self.port,
                instances: self.instances,
                users: self.users,
                proxy: self.proxy,
                labels: self.labels,
            },
            status: self.status,
        }
    }
}

fn instance_set(name: &str, wal_volume: bool) -> InstanceSetSpec {
    InstanceSetSpec {
        name: name.to_string(),
        replicas: 1,
        data_volume_claim_spec: VolumeClaimSpec {
            storage_class: Some("standard".to_string()),
            size: "10Gi".to_string(),
            access_modes: vec!["ReadWriteOnce".to_string()],
        },
        wal_volume_claim_spec: wal_volume.then(|| VolumeClaimSpec {
            storage_class: Some("standard".to_string()),
            size: "5Gi".to_string(),
            access_modes: vec!["ReadWriteOnce".to_string()],
        }),
    }
}

// =============================================================================
// Pod Builder
// =============================================================================

/// Builder for pods as the observation layer sees them
#[allow(dead_code)]
pub struct PodBuilder {
    cluster: String,
    instance: String,
    patroni_role: Option<String>,
    running: Option<bool>,
    terminating: bool,
}

#[allow(dead_code)]
impl PodBuilder {
    pub fn new(cluster: &str, instance: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            instance: instance.to_string(),
            patroni_role: None,
            running: None,
            terminating: false,
        }
    }

    /// Mark this pod as the writable Patroni member
    pub fn primary(mut self) -> Self {
        self.patroni_role = Some("master".to_string());
        self
    }

    /// Mark this pod as a read-only Patroni member
    pub fn replica(mut self) -> Self {
        self.patroni_role = Some("replica".to_string());
        self
    }

    /// Report a container status for the database container
    pub fn running(mut self, running: bool) -> Self {
        self.running = Some(running);
        self
    }

    /// Give the pod a deletion timestamp
    pub fn terminating(mut self) -> Self {
        self.terminating = true;
        self
    }

    pub fn build(self) -> Pod {
        let mut labels = BTreeMap::from([
            (LABEL_CLUSTER.to_string(), self.cluster.clone()),
            (LABEL_INSTANCE.to_string(), self.instance.clone()),
        ]);
        if let Some(role) = &self.patroni_role {
            labels.insert(LABEL_PATRONI_ROLE.to_string(), role.clone());
        }

        let status = self.running.map(|running| PodStatus {
            container_statuses: Some(vec![ContainerStatus {
                name: CONTAINER_DATABASE.to_string(),
                state: running.then(|| ContainerState {
                    running: Some(ContainerStateRunning::default()),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        });

        Pod {
            metadata: ObjectMeta {
                name: Some(format!("{}-0", self.instance)),
                namespace: Some("default".to_string()),
                labels: Some(labels),
                deletion_timestamp: self.terminating.then(|| Time(chrono::Utc::now())),
                ..Default::default()
            },
            status,
            ..Default::default()
        }
    }
}

// =============================================================================
// Mock Executor
// =============================================================================

/// Executor that records what would run and answers with canned stdout
#[derive(Default)]
pub struct MockExecutor {
    pub stdout: Option<String>,
    calls: Mutex<Vec<(Vec<String>, Vec<u8>)>>,
}

#[allow(dead_code)]
impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor whose commands produce the given stdout
    pub fn with_stdout(stdout: &str) -> Self {
        Self {
            stdout: Some(stdout.to_string()),
            ..Self::default()
        }
    }

    /// Number of commands executed
    pub fn executions(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    /// All recorded invocations as (command, stdin)
    pub fn calls(&self) -> Vec<(Vec<String>, Vec<u8>)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn exec(
        &self,
        stdin: Option<&[u8]>,
        stdout: &mut Vec<u8>,
        _stderr: &mut Vec<u8>,
        command: &[String],
    ) -> ExecResult<()> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((command.to_vec(), stdin.unwrap_or_default().to_vec()));

        if let Some(canned) = &self.stdout {
            stdout.extend_from_slice(canned.as_bytes());
        }
        Ok(())
    }
}
