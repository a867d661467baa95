//! Reconciliation of PostgreSQL storage volumes
//!
//! Data volumes follow the spec unconditionally and are never deleted
//! here. WAL volumes additionally have a removal protocol: when the spec
//! stops asking for one, the claim is deleted only after a live instance
//! confirms that WAL files have moved back onto the data volume. An
//! orphaned claim is cheap; deleting one that still holds WAL segments is
//! data loss.

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::Api;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::instance::{Instance, CONTAINER_DATABASE};
use crate::crd::{InstanceSetSpec, PostgresCluster};
use crate::postgres;
use crate::postgres::executor::{ExecResult, Executor, PodExecutor};
use crate::resources::naming;
use crate::resources::volume;

/// Write the PersistentVolumeClaim for an instance's data volume
pub async fn reconcile_data_volume(
    ctx: &Context,
    cluster: &PostgresCluster,
    set: &InstanceSetSpec,
    instance_name: &str,
) -> Result<PersistentVolumeClaim> {
    let namespace = cluster
        .namespace()
        .ok_or(Error::MissingObjectKey("namespace"))?;

    let pvc = volume::data_volume_claim(cluster, set, instance_name);
    ctx.apply(&namespace, &pvc).await?;

    Ok(pvc)
}

/// Write the PersistentVolumeClaim for an instance's WAL volume.
///
/// When the instance set declares no WAL volume, any existing claim is
/// removed, but only after resolving the live WAL directory through the
/// instance's filesystem and confirming it matches the directory WAL files
/// are supposed to occupy without the volume. Without a live instance to
/// ask, the claim is left alone until a later pass.
pub async fn reconcile_wal_volume(
    ctx: &Context,
    cluster: &PostgresCluster,
    set: &InstanceSetSpec,
    instance_name: &str,
    observed: Option<&Instance>,
) -> Result<Option<PersistentVolumeClaim>> {
    let namespace = cluster
        .namespace()
        .ok_or(Error::MissingObjectKey("namespace"))?;

    let Some(template) = set.wal_volume_claim_spec.as_ref() else {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.clone(), &namespace);
        let name = naming::instance_wal_volume(instance_name);

        let Some(existing) = api.get_opt(&name).await? else {
            return Ok(None);
        };

        // The "StorageObjectInUseProtection" admission controller puts a
        // finalizer on every claim; once a deletion timestamp is set the
        // pvc-protection controller finishes the removal.
        if existing.metadata.deletion_timestamp.is_some() {
            return Ok(None);
        }

        // Resolve where WAL files actually live through the filesystem of
        // a healthy instance. This tolerates the pg_wal symlink pointing
        // anywhere; static configuration cannot.
        let mut wal_directory = None;
        if let Some(observed) = observed
            && let [pod] = observed.pods.as_slice()
            && observed.running(CONTAINER_DATABASE).is_true()
        {
            let pod_namespace = pod.metadata.namespace.as_deref().unwrap_or(&namespace);
            let pod_name = pod.metadata.name.as_deref().unwrap_or_default();
            let executor = PodExecutor::new(
                ctx.client.clone(),
                pod_namespace,
                pod_name,
                CONTAINER_DATABASE,
            );
            wal_directory = Some(resolve_wal_directory(&executor).await?);
        }

        if wal_directory.as_deref() == Some(postgres::wal_directory(cluster, set).as_str()) {
            info!(name = %name, "WAL files are on the data volume, deleting WAL claim");
            ctx.delete_controlled(cluster, &existing).await?;
            return Ok(None);
        }

        // The claim may still hold WAL files (or no instance could be
        // inspected). There is no spec to reconcile toward, so leave it.
        debug!(name = %name, "keeping WAL claim until WAL files are confirmed elsewhere");
        return Ok(Some(existing));
    };

    let pvc = volume::wal_volume_claim(cluster, set, instance_name, template);
    ctx.apply(&namespace, &pvc).await?;

    Ok(Some(pvc))
}

/// Resolve the real WAL directory of a live instance.
///
/// `$PGDATA/pg_wal` is a symlink wherever WAL lives off the data
/// directory, so ask the filesystem for its target rather than trusting
/// configuration.
pub async fn resolve_wal_directory<E: Executor + ?Sized>(exec: &E) -> ExecResult<String> {
    let command: Vec<String> = ["bash", "-ceu", "--", r#"exec realpath "${PGDATA}/pg_wal""#]
        .into_iter()
        .map(String::from)
        .collect();

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    exec.exec(None, &mut stdout, &mut stderr, &command).await?;

    Ok(String::from_utf8_lossy(&stdout)
        .trim_end_matches('\n')
        .to_string())
}
