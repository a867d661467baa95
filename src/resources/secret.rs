//! Connection secrets for PostgreSQL users
//!
//! Each managed user gets one Secret holding its credentials and the libpq
//! keywords needed to reach the cluster through the primary Service (and
//! through PgBouncer when a proxy is configured).

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::core::ObjectMeta;
use kube::ResourceExt;
use url::Url;

use crate::controller::error::{Error, Result};
use crate::crd::{PostgresCluster, UserSpec};
use crate::postgres::password::{generate_password, scram_verifier};
use crate::resources::common::{cluster_labels, owner_reference, LABEL_PGUSER, LABEL_ROLE, ROLE_PGUSER};
use crate::resources::naming;

/// Build the Secret for one PostgreSQL user.
///
/// When `existing` carries both a password and a verifier they are kept
/// as-is; otherwise a new password and SCRAM verifier are generated. All
/// connection details (host, port, database, URIs) are recomputed from the
/// current spec every time; they hold no secret material and must follow
/// topology changes immediately.
pub fn generate_user_secret(
    cluster: &PostgresCluster,
    user: &UserSpec,
    existing: Option<&Secret>,
) -> Result<Secret> {
    let username = &user.name;
    let mut data: BTreeMap<String, ByteString> = BTreeMap::new();

    let hostname = naming::primary_service_host(cluster);
    data.insert("host".to_string(), bytes(&hostname));
    data.insert("port".to_string(), bytes(&cluster.spec.port.to_string()));
    data.insert("user".to_string(), bytes(username));

    // Use the existing password and verifier. Generate both when either is missing.
    if let Some(existing_data) = existing.and_then(|secret| secret.data.as_ref()) {
        if let Some(password) = existing_data.get("password") {
            data.insert("password".to_string(), password.clone());
        }
        if let Some(verifier) = existing_data.get("verifier") {
            data.insert("verifier".to_string(), verifier.clone());
        }
    }
    let password_missing = data.get("password").is_none_or(|v| v.0.is_empty());
    let verifier_missing = data.get("verifier").is_none_or(|v| v.0.is_empty());
    if password_missing || verifier_missing {
        let password = generate_password();

        // The verifier cannot be recomputed from itself later, so derive it
        // once here and store it next to the plaintext password.
        let verifier = scram_verifier(&password)?;

        data.insert("password".to_string(), bytes(&password));
        data.insert("verifier".to_string(), bytes(&verifier));
    }

    let password = String::from_utf8_lossy(&data["password"].0).into_owned();

    // When the user has a database, include it and a connection URI.
    if let Some(database) = user.databases.first() {
        data.insert("dbname".to_string(), bytes(database));
        data.insert(
            "uri".to_string(),
            bytes(&connection_uri(
                username,
                &password,
                &hostname,
                cluster.spec.port,
                database,
            )?),
        );
    }

    // When PgBouncer is enabled, include values for connecting through it.
    if let Some(pg_bouncer) = cluster
        .spec
        .proxy
        .as_ref()
        .and_then(|proxy| proxy.pg_bouncer.as_ref())
    {
        let pgbouncer_host = naming::pgbouncer_host(cluster);
        data.insert("pgbouncer-host".to_string(), bytes(&pgbouncer_host));
        data.insert(
            "pgbouncer-port".to_string(),
            bytes(&pg_bouncer.port.to_string()),
        );

        if let Some(database) = user.databases.first() {
            data.insert(
                "pgbouncer-uri".to_string(),
                bytes(&connection_uri(
                    username,
                    &password,
                    &pgbouncer_host,
                    pg_bouncer.port,
                    database,
                )?),
            );
        }
    }

    let mut labels = cluster_labels(cluster);
    labels.insert(LABEL_ROLE.to_string(), ROLE_PGUSER.to_string());
    labels.insert(LABEL_PGUSER.to_string(), username.clone());

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(naming::postgres_user_secret(cluster, username)),
            namespace: cluster.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    })
}

fn bytes(value: &str) -> ByteString {
    ByteString(value.as_bytes().to_vec())
}

/// Build a `postgresql://` connection URI, percent-encoding the credentials
fn connection_uri(
    user: &str,
    password: &str,
    host: &str,
    port: i32,
    database: &str,
) -> Result<String> {
    let invalid = || Error::InvalidConfig(format!("cannot build connection URI for {host}:{port}"));

    let mut url = Url::parse(&format!("postgresql://{host}:{port}"))?;
    url.set_username(user).map_err(|()| invalid())?;
    url.set_password(Some(password)).map_err(|()| invalid())?;
    url.set_path(database);
    Ok(url.to_string())
}
