//! PersistentVolumeClaims for PostgreSQL instances
//!
//! Each instance gets a data volume claim and, when the instance set asks
//! for one, a WAL volume claim. Claims are labelled with the cluster,
//! instance set, instance, and role so they can be found independently of
//! the workloads mounting them.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::core::ObjectMeta;
use kube::ResourceExt;

use crate::crd::{InstanceSetSpec, PostgresCluster, VolumeClaimSpec};
use crate::resources::common::{
    cluster_labels, owner_reference, LABEL_INSTANCE, LABEL_INSTANCE_SET, LABEL_ROLE, ROLE_PGDATA,
    ROLE_PGWAL,
};
use crate::resources::naming;

/// Build the PersistentVolumeClaim for an instance's data volume
pub fn data_volume_claim(
    cluster: &PostgresCluster,
    set: &InstanceSetSpec,
    instance_name: &str,
) -> PersistentVolumeClaim {
    volume_claim(
        cluster,
        set,
        instance_name,
        ROLE_PGDATA,
        naming::instance_data_volume(instance_name),
        &set.data_volume_claim_spec,
    )
}

/// Build the PersistentVolumeClaim for an instance's WAL volume
pub fn wal_volume_claim(
    cluster: &PostgresCluster,
    set: &InstanceSetSpec,
    instance_name: &str,
    template: &VolumeClaimSpec,
) -> PersistentVolumeClaim {
    volume_claim(
        cluster,
        set,
        instance_name,
        ROLE_PGWAL,
        naming::instance_wal_volume(instance_name),
        template,
    )
}

fn volume_claim(
    cluster: &PostgresCluster,
    set: &InstanceSetSpec,
    instance_name: &str,
    role: &str,
    name: String,
    template: &VolumeClaimSpec,
) -> PersistentVolumeClaim {
    let mut labels = cluster_labels(cluster);
    labels.insert(LABEL_INSTANCE_SET.to_string(), set.name.clone());
    labels.insert(LABEL_INSTANCE.to_string(), instance_name.to_string());
    labels.insert(LABEL_ROLE.to_string(), role.to_string());

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: cluster.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(template.access_modes.clone()),
            storage_class_name: template.storage_class.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(template.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
