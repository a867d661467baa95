//! Reconciliation logic for PostgresCluster resources
//!
//! One reconcile pass observes the cluster's live instances, converges
//! users and databases inside PostgreSQL, then converges storage volumes.
//! Every step is idempotent; a pass interrupted by an error leaves
//! already-committed state intact and is simply retried.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{error, info, instrument, warn};

use crate::controller::context::Context;
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::instance::ObservedInstances;
use crate::controller::status::{apply_status, RevisionOutcome};
use crate::controller::{postgres, volumes};
use crate::crd::{ClusterPhase, PostgresCluster};
use crate::resources::common::{FIELD_MANAGER, LABEL_CLUSTER};
use crate::resources::naming;

/// Finalizer name for cleanup
pub const FINALIZER: &str = "pgcluster.example.com/finalizer";

/// Main reconciliation function
#[instrument(skip(cluster, ctx), fields(name = %cluster.name_any(), namespace = cluster.namespace().unwrap_or_default()))]
pub async fn reconcile(cluster: Arc<PostgresCluster>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = cluster
        .namespace()
        .ok_or(Error::MissingObjectKey("namespace"))?;
    let name = cluster.name_any();

    info!("Reconciling PostgresCluster");

    // Handle deletion
    if cluster.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&cluster, &ctx, &namespace).await;
    }

    // Ensure finalizer is present
    if !has_finalizer(&cluster) {
        add_finalizer(&cluster, &ctx, &namespace).await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    // Observe the live members of this cluster
    let pods_api: Api<Pod> = Api::namespaced(ctx.client.clone(), &namespace);
    let pods = pods_api
        .list(&ListParams::default().labels(&format!("{LABEL_CLUSTER}={name}")))
        .await?;
    let instances = ObservedInstances::new(pods.items);

    // Converge users and databases, then storage. Revisions committed by
    // an earlier concern are persisted even when a later one fails.
    let mut outcome = RevisionOutcome::default();
    let result = run_pass(&cluster, &ctx, &instances, &mut outcome).await;

    let phase = if instances.executable().is_some() {
        ClusterPhase::Running
    } else {
        ClusterPhase::Pending
    };
    let status_result = apply_status(&ctx, &cluster, &namespace, &outcome, phase).await;

    match result.and(status_result) {
        Ok(()) => {
            info!("Reconciliation completed successfully");
            Ok(Action::requeue(Duration::from_secs(30)))
        }
        Err(e) => {
            error!("Reconciliation failed: {}", e);
            Err(e)
        }
    }
}

/// The concerns of one pass, in order: user secrets happen-before user
/// SQL, SQL happens-before revision persistence, and volume safety checks
/// happen-before volume deletion.
async fn run_pass(
    cluster: &PostgresCluster,
    ctx: &Context,
    instances: &ObservedInstances,
    outcome: &mut RevisionOutcome,
) -> Result<()> {
    outcome.users_revision = postgres::reconcile_postgres_users(ctx, cluster, instances).await?;
    outcome.database_revision =
        postgres::reconcile_postgres_databases(ctx, cluster, instances).await?;

    let name = cluster.name_any();
    for set in &cluster.spec.instances {
        for ordinal in 0..set.replicas {
            let instance_name = naming::instance_name(&name, &set.name, ordinal);
            volumes::reconcile_data_volume(ctx, cluster, set, &instance_name).await?;
            volumes::reconcile_wal_volume(
                ctx,
                cluster,
                set,
                &instance_name,
                instances.by_name(&instance_name),
            )
            .await?;
        }
    }

    Ok(())
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(cluster: Arc<PostgresCluster>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = cluster.name_any();
    let backoff = BackoffConfig::default();

    let delay = backoff.delay_for_error(error, 0);

    if error.is_retryable() {
        warn!(
            "Retryable error for {}: {:?}, requeuing in {:?}",
            name, error, delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {:?}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }

    Action::requeue(delay)
}

/// Check if the finalizer is present
fn has_finalizer(cluster: &PostgresCluster) -> bool {
    cluster
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.contains(&FINALIZER.to_string()))
}

/// Add the finalizer to the resource
async fn add_finalizer(cluster: &PostgresCluster, ctx: &Context, namespace: &str) -> Result<()> {
    let api: Api<PostgresCluster> = Api::namespaced(ctx.client.clone(), namespace);
    let name = cluster.name_any();

    let patch = serde_json::json!({
        "metadata": {
            "finalizers": [FINALIZER]
        }
    });

    api.patch(
        &name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;

    info!("Added finalizer to {}", name);
    Ok(())
}

/// Handle deletion of the PostgresCluster.
///
/// Owned resources (secrets, volume claims) are garbage collected through
/// their owner references; only the finalizer needs removing.
async fn handle_deletion(
    cluster: &PostgresCluster,
    ctx: &Context,
    namespace: &str,
) -> Result<Action> {
    let name = cluster.name_any();
    info!("Handling deletion of {}", name);

    if has_finalizer(cluster) {
        let api: Api<PostgresCluster> = Api::namespaced(ctx.client.clone(), namespace);

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": null
            }
        });

        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

        info!("Removed finalizer from {}", name);
    }

    Ok(Action::await_change())
}
