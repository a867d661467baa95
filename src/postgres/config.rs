//! PostgreSQL on-disk layout
//!
//! These paths mirror what the startup tooling configures inside the
//! database container: the data directory lives on the data volume, and
//! WAL files live either on a dedicated WAL volume or next to the data
//! directory on the data volume, reached through a `pg_wal` symlink.

use crate::crd::{InstanceSetSpec, PostgresCluster};

/// Mount path of the PostgreSQL data volume
pub const DATA_MOUNT_PATH: &str = "/pgdata";

/// Mount path of the PostgreSQL WAL volume, when one exists
pub const WAL_MOUNT_PATH: &str = "/pgwal";

/// The PostgreSQL data directory (`$PGDATA`) for a cluster
pub fn data_directory(cluster: &PostgresCluster) -> String {
    format!("{DATA_MOUNT_PATH}/pg{}", cluster.spec.postgres_version)
}

/// The directory where WAL files belong for an instance set.
///
/// With a WAL volume declared this is on that volume; without one, WAL
/// lives on the data volume outside the data directory. The data directory
/// contains a `pg_wal` symlink pointing here either way.
pub fn wal_directory(cluster: &PostgresCluster, set: &InstanceSetSpec) -> String {
    let storage = if set.wal_volume_claim_spec.is_some() {
        WAL_MOUNT_PATH
    } else {
        DATA_MOUNT_PATH
    };
    format!("{storage}/pg{}_wal", cluster.spec.postgres_version)
}
