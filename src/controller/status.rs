//! Status persistence for PostgresCluster resources
//!
//! Reconcilers return what changed instead of mutating shared status from
//! deep inside the call chain; the outcomes are gathered here and applied
//! to the status subresource in one place.

use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;

use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::crd::{ClusterPhase, PostgresCluster};
use crate::resources::common::FIELD_MANAGER;

/// Revisions produced by one reconcile pass.
///
/// A field is `Some` only when that concern's SQL was actually applied
/// this pass; `None` leaves the persisted revision untouched.
#[derive(Debug, Default, PartialEq)]
pub struct RevisionOutcome {
    pub database_revision: Option<String>,
    pub users_revision: Option<String>,
}

/// Patch the cluster status with the pass outcome
pub async fn apply_status(
    ctx: &Context,
    cluster: &PostgresCluster,
    namespace: &str,
    outcome: &RevisionOutcome,
    phase: ClusterPhase,
) -> Result<()> {
    let mut status = cluster.status.clone().unwrap_or_default();

    if let Some(revision) = &outcome.database_revision {
        status.database_revision = revision.clone();
    }
    if let Some(revision) = &outcome.users_revision {
        status.users_revision = revision.clone();
    }
    status.phase = phase;
    status.observed_generation = cluster.metadata.generation;

    let api: Api<PostgresCluster> = Api::namespaced(ctx.client.clone(), namespace);
    api.patch_status(
        &cluster.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&serde_json::json!({ "status": status })),
    )
    .await?;

    Ok(())
}
