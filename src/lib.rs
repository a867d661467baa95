//! pgcluster-operator
//!
//! A Kubernetes operator that drives running PostgreSQL clusters toward
//! their declared state: users, databases, credentials, and storage
//! volumes. Reconciliation is idempotent: SQL is fingerprinted before it
//! is applied and skipped when the fingerprint matches what the cluster
//! status already records.
//!
//! The reconciler assumes it is the only writer for a cluster's resources.
//! The controller runtime guarantees at most one in-flight reconcile per
//! object; running multiple operator replicas against the same clusters
//! without leader election would break that assumption.

pub mod controller;
pub mod crd;
pub mod postgres;
pub mod resources;

pub use controller::{error_policy, reconcile, Context, Error, Result, FINALIZER};
pub use crd::PostgresCluster;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Run the operator controller (cluster-wide).
///
/// This is the main controller loop that watches PostgresCluster resources
/// and reconciles them. It can be called from main.rs or spawned as a
/// background task during integration tests.
pub async fn run_controller(client: Client) {
    run_controller_scoped(client, None).await
}

/// Run the operator controller with optional namespace scoping.
///
/// When `namespace` is `Some(ns)`, only watches resources in that
/// namespace; use the scoped version for integration tests to enable
/// parallel test execution.
pub async fn run_controller_scoped(client: Client, namespace: Option<&str>) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for PostgresCluster resources (scope: {})",
        scope_msg
    );

    let ctx = Arc::new(Context::new(client.clone()));

    let clusters: Api<PostgresCluster> = scoped_api(client.clone(), namespace);
    let secrets: Api<Secret> = scoped_api(client.clone(), namespace);
    let claims: Api<PersistentVolumeClaim> = scoped_api(client.clone(), namespace);

    let watcher_config = WatcherConfig::default().any_semantic();

    // Watch PostgresCluster and the owned resources that trigger reconciliation
    Controller::new(clusters, watcher_config.clone())
        .owns(secrets, watcher_config.clone())
        .owns(claims, watcher_config)
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    // NotFound errors are expected after deletion when
                    // related watch events trigger reconciliation for a
                    // deleted object
                    let is_not_found = format!("{e:?}").contains("NotFound");
                    if is_not_found {
                        tracing::debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        tracing::error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    // This should never complete in normal operation
    tracing::error!("Controller stream ended unexpectedly");
}
