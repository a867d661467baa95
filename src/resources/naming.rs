//! Names of resources derived from a PostgresCluster

use kube::ResourceExt;

use crate::crd::PostgresCluster;

/// Name of the Service routing to the current primary
pub fn cluster_primary_service(cluster: &PostgresCluster) -> String {
    format!("{}-primary", cluster.name_any())
}

/// DNS name of the primary Service within the cluster domain
pub fn primary_service_host(cluster: &PostgresCluster) -> String {
    format!(
        "{}.{}.svc",
        cluster_primary_service(cluster),
        cluster.namespace().unwrap_or_default()
    )
}

/// Name of the PgBouncer Service
pub fn cluster_pgbouncer(cluster: &PostgresCluster) -> String {
    format!("{}-pgbouncer", cluster.name_any())
}

/// DNS name of the PgBouncer Service within the cluster domain
pub fn pgbouncer_host(cluster: &PostgresCluster) -> String {
    format!(
        "{}.{}.svc",
        cluster_pgbouncer(cluster),
        cluster.namespace().unwrap_or_default()
    )
}

/// Name of the Secret holding a PostgreSQL user's connection credentials
pub fn postgres_user_secret(cluster: &PostgresCluster, username: &str) -> String {
    format!("{}-pguser-{}", cluster.name_any(), username)
}

/// Name of the old Secret that held the default user's credentials before
/// secrets were named per user. Used only as a migration source; use
/// [`postgres_user_secret`] instead.
pub fn deprecated_postgres_user_secret(cluster: &PostgresCluster) -> String {
    format!("{}-pguser", cluster.name_any())
}

/// Name of one instance of an instance set
pub fn instance_name(cluster_name: &str, set_name: &str, ordinal: i32) -> String {
    format!("{cluster_name}-{set_name}-{ordinal}")
}

/// Name of the PersistentVolumeClaim for an instance's data volume
pub fn instance_data_volume(instance_name: &str) -> String {
    format!("{instance_name}-pgdata")
}

/// Name of the PersistentVolumeClaim for an instance's WAL volume
pub fn instance_wal_volume(instance_name: &str) -> String {
    format!("{instance_name}-pgwal")
}
