//! Reconciliation of PostgreSQL users, credentials, and databases
//!
//! Users and databases declared on the cluster spec are converged in two
//! independently fingerprinted steps: connection secrets are written
//! first, then the SQL derived from those secrets is applied to a live
//! instance. Each step's statement stream is hashed by a recording
//! executor; when the hash matches what the status already records, the
//! remote work is skipped entirely.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams};
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::instance::{ObservedInstances, CONTAINER_DATABASE};
use crate::crd::{PostgresCluster, UserSpec};
use crate::postgres::executor::{Executor, PodExecutor, RecordingExecutor};
use crate::postgres::sql::{create_databases_in_postgresql, write_users_in_postgresql};
use crate::resources::common::{LABEL_CLUSTER, LABEL_PGUSER, LABEL_ROLE, ROLE_PGUSER};
use crate::resources::naming;
use crate::resources::secret::generate_user_secret;

/// The users the cluster should have.
///
/// Declared users pass through unchanged. With none declared, a single
/// user named after the cluster is synthesized, owning a database of the
/// same name, but only when the cluster name is usable as a PostgreSQL
/// role name. Violations are returned as messages for warning events and
/// no default user is created that cycle.
pub fn defaulted_user_specs(cluster: &PostgresCluster) -> (Vec<UserSpec>, Vec<String>) {
    if let Some(users) = &cluster.spec.users {
        return (users.clone(), Vec::new());
    }

    let name = cluster.name_any();
    let mut errors = Vec::new();

    // The cluster name is a DNS subdomain, so len() counts characters
    if name.len() > 63 {
        errors.push(format!(
            "spec.users[0].name: Invalid value: \"{name}\": should be at most 63 chars long"
        ));
    }
    if !is_valid_user_name(&name) {
        errors.push(format!(
            "spec.users[0].name: Invalid value: \"{name}\": should match '^[a-z0-9]([-a-z0-9]*[a-z0-9])?$'"
        ));
    }

    if errors.is_empty() {
        let user = UserSpec {
            name: name.clone(),
            databases: vec![name],
        };
        (vec![user], Vec::new())
    } else {
        (Vec::new(), errors)
    }
}

/// Lowercase alphanumerics with internal hyphens, like a DNS label
fn is_valid_user_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// The set of databases that should exist in PostgreSQL.
///
/// The union of every user's databases; with no users declared, the
/// cluster name when it fits in a database name. Returned as a sorted set
/// so the derived SQL (and its fingerprint) is order-independent.
pub fn desired_databases(cluster: &PostgresCluster) -> (BTreeSet<String>, Vec<String>) {
    let mut databases = BTreeSet::new();

    match &cluster.spec.users {
        None => {
            let name = cluster.name_any();
            if name.len() > 63 {
                return (
                    databases,
                    vec![format!(
                        "spec.users[0].databases[0]: Invalid value: \"{name}\": should be at most 63 chars long"
                    )],
                );
            }
            databases.insert(name);
        }
        Some(users) => {
            for user in users {
                for database in &user.databases {
                    databases.insert(database.clone());
                }
            }
        }
    }

    (databases, Vec::new())
}

/// Fingerprint of the SQL that would create `databases`
pub async fn database_revision(databases: &BTreeSet<String>) -> Result<String> {
    let recording = RecordingExecutor::new();
    create_databases_in_postgresql(&recording, databases).await?;
    Ok(recording.revision())
}

/// Fingerprint of the SQL that would write `users` with `verifiers`
pub async fn users_revision(
    users: &[UserSpec],
    verifiers: &BTreeMap<String, String>,
) -> Result<String> {
    let recording = RecordingExecutor::new();
    write_users_in_postgresql(&recording, users, verifiers).await?;
    Ok(recording.revision())
}

/// Apply the database DDL when it differs from what was last applied.
///
/// Returns the new revision to persist after a successful apply, `None`
/// when there is nothing to do: either the SQL is already applied or no
/// executable instance exists yet (deferred, retried next pass).
pub async fn reconcile_database_sql<E: Executor>(
    executor: Option<&E>,
    databases: &BTreeSet<String>,
    current_revision: &str,
) -> Result<Option<String>> {
    let Some(executor) = executor else {
        return Ok(None);
    };

    let revision = database_revision(databases).await?;
    if revision == current_revision {
        // The necessary SQL has already been applied; there's nothing more to do.
        debug!(revision = %revision, "database SQL already applied");
        return Ok(None);
    }

    create_databases_in_postgresql(executor, databases).await?;
    info!(revision = %revision, "created PostgreSQL databases");
    Ok(Some(revision))
}

/// Apply the user DDL when it differs from what was last applied.
///
/// Same contract as [`reconcile_database_sql`]. The verifiers must come
/// from the secrets that were just written, so the fingerprint covers the
/// credentials actually stored.
pub async fn reconcile_users_sql<E: Executor>(
    executor: Option<&E>,
    users: &[UserSpec],
    verifiers: &BTreeMap<String, String>,
    current_revision: &str,
) -> Result<Option<String>> {
    let Some(executor) = executor else {
        return Ok(None);
    };

    let revision = users_revision(users, verifiers).await?;
    if revision == current_revision {
        debug!(revision = %revision, "user SQL already applied");
        return Ok(None);
    }

    write_users_in_postgresql(executor, users, verifiers).await?;
    info!(revision = %revision, "wrote PostgreSQL users");
    Ok(Some(revision))
}

/// Write the Secrets for the users the cluster should have and delete the
/// Secrets of users it no longer declares.
///
/// Returns the user specifications acted on (because of defaulting) and
/// the Secrets written for them.
pub async fn reconcile_postgres_user_secrets(
    ctx: &Context,
    cluster: &PostgresCluster,
) -> Result<(Vec<UserSpec>, BTreeMap<String, Secret>)> {
    let (users, errors) = defaulted_user_specs(cluster);
    for message in &errors {
        ctx.warn(cluster, "InvalidUser", message).await;
    }

    let namespace = cluster
        .namespace()
        .ok_or(Error::MissingObjectKey("namespace"))?;
    let secrets_api: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);

    let selector = format!(
        "{}={},{}={}",
        LABEL_CLUSTER,
        cluster.name_any(),
        LABEL_ROLE,
        ROLE_PGUSER
    );
    let existing = secrets_api
        .list(&ListParams::default().labels(&selector))
        .await?;

    let desired: BTreeSet<&str> = users.iter().map(|user| user.name.as_str()).collect();

    // Index secrets by user name and delete any for users no longer in the
    // spec. The secret under the deprecated name is kept aside so its
    // credentials can migrate when the current secret doesn't exist yet.
    let deprecated_name = naming::deprecated_postgres_user_secret(cluster);
    let mut deprecated_secret: Option<Secret> = None;
    let mut deprecated_user: Option<String> = None;
    let mut current_secrets: BTreeMap<String, Secret> = BTreeMap::new();

    for secret in existing.items {
        let secret_user = secret
            .labels()
            .get(LABEL_PGUSER)
            .cloned()
            .unwrap_or_default();

        if desired.contains(secret_user.as_str()) {
            if secret.name_any() == deprecated_name {
                deprecated_user = Some(secret_user);
                deprecated_secret = Some(secret);
            } else {
                current_secrets.insert(secret_user, secret);
            }
        } else {
            ctx.delete_controlled(cluster, &secret).await?;
        }
    }

    // Reconcile each user's secret, carrying credentials forward from the
    // current secret or, failing that, the deprecated one.
    let mut written = BTreeMap::new();
    for user in &users {
        let mut source = current_secrets.get(&user.name);
        if source.is_none() && deprecated_user.as_deref() == Some(user.name.as_str()) {
            source = deprecated_secret.as_ref();
        }

        let secret = generate_user_secret(cluster, user, source)?;
        ctx.apply(&namespace, &secret).await?;
        written.insert(user.name.clone(), secret);
    }

    Ok((users, written))
}

/// Reconcile the objects managing users and their passwords: secrets
/// first, then the roles inside PostgreSQL derived from them.
pub async fn reconcile_postgres_users(
    ctx: &Context,
    cluster: &PostgresCluster,
    instances: &ObservedInstances,
) -> Result<Option<String>> {
    let (users, secrets) = reconcile_postgres_user_secrets(ctx, cluster).await?;

    let verifiers: BTreeMap<String, String> = secrets
        .iter()
        .map(|(name, secret)| {
            let verifier = secret
                .data
                .as_ref()
                .and_then(|data| data.get("verifier"))
                .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
                .unwrap_or_default();
            (name.clone(), verifier)
        })
        .collect();

    let executor = pod_executor(ctx, instances);
    let current = cluster
        .status
        .as_ref()
        .map(|status| status.users_revision.as_str())
        .unwrap_or_default();

    reconcile_users_sql(executor.as_ref(), &users, &verifiers, current).await
}

/// Reconcile the databases inside PostgreSQL
pub async fn reconcile_postgres_databases(
    ctx: &Context,
    cluster: &PostgresCluster,
    instances: &ObservedInstances,
) -> Result<Option<String>> {
    let (databases, errors) = desired_databases(cluster);
    for message in &errors {
        ctx.warn(cluster, "InvalidDatabase", message).await;
    }

    let executor = pod_executor(ctx, instances);
    let current = cluster
        .status
        .as_ref()
        .map(|status| status.database_revision.as_str())
        .unwrap_or_default();

    reconcile_database_sql(executor.as_ref(), &databases, current).await
}

/// Build an executor for the instance that can run catalog-writing SQL,
/// when one exists
fn pod_executor(ctx: &Context, instances: &ObservedInstances) -> Option<PodExecutor> {
    let instance = instances.executable()?;
    let pod = instance.pods.first()?;
    let namespace = pod.metadata.namespace.as_deref()?;
    let name = pod.metadata.name.as_deref()?;

    debug!(pod = %name, "selected SQL execution target");
    Some(PodExecutor::new(
        ctx.client.clone(),
        namespace,
        name,
        CONTAINER_DATABASE,
    ))
}
