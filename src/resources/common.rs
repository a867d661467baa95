//! Common utilities for Kubernetes resource generation
//!
//! This module provides shared constants and functions used across all
//! resource generators to ensure consistency and reduce duplication.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::PostgresCluster;

/// API version for the PostgresCluster CRD
pub const API_VERSION: &str = "pgcluster.example.com/v1alpha1";

/// Kind for the PostgresCluster CRD
pub const KIND: &str = "PostgresCluster";

/// Operator field manager name for server-side apply
pub const FIELD_MANAGER: &str = "pgcluster-operator";

/// Label identifying the owning cluster
pub const LABEL_CLUSTER: &str = "pgcluster.example.com/cluster";

/// Label identifying the instance set a resource belongs to
pub const LABEL_INSTANCE_SET: &str = "pgcluster.example.com/instance-set";

/// Label identifying the individual instance a resource belongs to
pub const LABEL_INSTANCE: &str = "pgcluster.example.com/instance";

/// Label identifying the role a resource plays within the cluster
pub const LABEL_ROLE: &str = "pgcluster.example.com/role";

/// Label carrying the PostgreSQL user name on a user secret
pub const LABEL_PGUSER: &str = "pgcluster.example.com/pguser";

/// Role value for PostgreSQL user secrets
pub const ROLE_PGUSER: &str = "pguser";

/// Role value for PostgreSQL data volumes
pub const ROLE_PGDATA: &str = "pgdata";

/// Role value for PostgreSQL WAL volumes
pub const ROLE_PGWAL: &str = "pgwal";

/// Pod label set by Patroni with the member's replication role.
/// `master` marks the writable member; `replica` marks read-only members.
pub const LABEL_PATRONI_ROLE: &str = "spilo-role";

/// Generate an owner reference for a PostgresCluster.
///
/// This ensures that all child resources are properly owned by the cluster
/// and will be garbage collected when the cluster is deleted.
pub fn owner_reference(cluster: &PostgresCluster) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: cluster.name_any(),
        uid: cluster.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Generate standard labels for all resources belonging to a PostgresCluster
pub fn standard_labels(cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/name".to_string(),
            cluster_name.to_string(),
        ),
        (
            "app.kubernetes.io/component".to_string(),
            "postgresql".to_string(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
        (LABEL_CLUSTER.to_string(), cluster_name.to_string()),
    ])
}

/// Generate labels for a PostgresCluster including user-defined labels.
///
/// User labels can override standard labels except for the cluster
/// identifier.
pub fn cluster_labels(cluster: &PostgresCluster) -> BTreeMap<String, String> {
    let name = cluster.name_any();
    let mut labels = standard_labels(&name);

    for (key, value) in &cluster.spec.labels {
        if key != LABEL_CLUSTER {
            labels.insert(key.clone(), value.clone());
        }
    }

    labels
}
