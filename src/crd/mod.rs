pub mod postgres_cluster;

pub use postgres_cluster::{
    ClusterPhase, InstanceSetSpec, PgBouncerSpec, PostgresCluster, PostgresClusterSpec,
    PostgresClusterStatus, ProxySpec, UserSpec, VolumeClaimSpec,
};
