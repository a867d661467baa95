//! Unit tests for user/database derivation and the idempotent SQL protocol

use std::collections::{BTreeMap, BTreeSet};

use pgcluster_operator::controller::postgres::{
    database_revision, defaulted_user_specs, desired_databases, reconcile_database_sql,
    reconcile_users_sql, users_revision,
};
use pgcluster_operator::crd::UserSpec;

use crate::fixtures::{MockExecutor, PostgresClusterBuilder};

fn databases(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn verifiers(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(user, verifier)| (user.to_string(), verifier.to_string()))
        .collect()
}

// =============================================================================
// Desired-state derivation
// =============================================================================

#[test]
fn default_user_owns_database_named_after_cluster() {
    let cluster = PostgresClusterBuilder::new("myapp", "default").build();

    let (users, errors) = defaulted_user_specs(&cluster);
    assert!(errors.is_empty());
    assert_eq!(
        users,
        vec![UserSpec {
            name: "myapp".to_string(),
            databases: vec!["myapp".to_string()],
        }]
    );

    let (dbs, errors) = desired_databases(&cluster);
    assert!(errors.is_empty());
    assert_eq!(dbs, databases(&["myapp"]));
}

#[test]
fn overlong_cluster_name_yields_no_defaults_and_a_warning() {
    let name = "a".repeat(64);
    let cluster = PostgresClusterBuilder::new(&name, "default").build();

    let (users, errors) = defaulted_user_specs(&cluster);
    assert!(users.is_empty());
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("63 chars"));

    let (dbs, errors) = desired_databases(&cluster);
    assert!(dbs.is_empty());
    assert_eq!(errors.len(), 1);
}

#[test]
fn invalid_cluster_name_pattern_yields_no_default_user() {
    // Uppercase violates the role-name pattern but not the length limit
    let cluster = PostgresClusterBuilder::new("MyApp", "default").build();

    let (users, errors) = defaulted_user_specs(&cluster);
    assert!(users.is_empty());
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("should match"));
}

#[test]
fn declared_users_pass_through_unchanged() {
    let cluster = PostgresClusterBuilder::new("hippo", "default")
        .with_user("app", &["orders", "billing"])
        .with_user("reporting", &["orders"])
        .build();

    let (users, errors) = defaulted_user_specs(&cluster);
    assert!(errors.is_empty());
    assert_eq!(users.len(), 2);

    let (dbs, errors) = desired_databases(&cluster);
    assert!(errors.is_empty());
    assert_eq!(dbs, databases(&["billing", "orders"]));
}

#[test]
fn empty_user_list_is_not_defaulted() {
    let cluster = PostgresClusterBuilder::new("hippo", "default")
        .with_no_users()
        .build();

    let (users, errors) = defaulted_user_specs(&cluster);
    assert!(users.is_empty());
    assert!(errors.is_empty());

    let (dbs, _) = desired_databases(&cluster);
    assert!(dbs.is_empty());
}

// =============================================================================
// Fingerprints
// =============================================================================

#[tokio::test]
async fn database_revision_is_order_independent() {
    // The desired set is sorted before hashing, so insertion order does
    // not matter.
    let ab: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
    let ba: BTreeSet<String> = ["b", "a"].iter().map(|s| s.to_string()).collect();

    let rev_ab = database_revision(&ab).await.unwrap();
    let rev_ba = database_revision(&ba).await.unwrap();
    assert_eq!(rev_ab, rev_ba);
}

#[tokio::test]
async fn database_revision_detects_set_changes() {
    let one = database_revision(&databases(&["a"])).await.unwrap();
    let two = database_revision(&databases(&["a", "b"])).await.unwrap();
    assert_ne!(one, two);
}

#[tokio::test]
async fn users_revision_covers_verifiers() {
    let users = vec![UserSpec {
        name: "app".to_string(),
        databases: vec!["app".to_string()],
    }];

    let before = users_revision(&users, &verifiers(&[("app", "v1")]))
        .await
        .unwrap();
    let after = users_revision(&users, &verifiers(&[("app", "v2")]))
        .await
        .unwrap();
    assert_ne!(before, after);
}

#[tokio::test]
async fn changing_a_users_databases_moves_only_the_users_revision() {
    let before = vec![
        UserSpec {
            name: "app".to_string(),
            databases: vec!["orders".to_string()],
        },
        UserSpec {
            name: "reporting".to_string(),
            databases: vec!["billing".to_string()],
        },
    ];
    // "app" now also reads billing; the database *set* is unchanged
    let after = vec![
        UserSpec {
            name: "app".to_string(),
            databases: vec!["orders".to_string(), "billing".to_string()],
        },
        UserSpec {
            name: "reporting".to_string(),
            databases: vec!["billing".to_string()],
        },
    ];
    let creds = verifiers(&[("app", "v"), ("reporting", "v")]);

    let users_before = users_revision(&before, &creds).await.unwrap();
    let users_after = users_revision(&after, &creds).await.unwrap();
    assert_ne!(users_before, users_after);

    let set = databases(&["billing", "orders"]);
    let db_before = database_revision(&set).await.unwrap();
    let db_after = database_revision(&set).await.unwrap();
    assert_eq!(db_before, db_after);
}

// =============================================================================
// Idempotent-execution protocol
// =============================================================================

#[tokio::test]
async fn database_sql_executes_once_then_skips() {
    let exec = MockExecutor::new();
    let set = databases(&["app"]);

    let revision = reconcile_database_sql(Some(&exec), &set, "")
        .await
        .unwrap()
        .expect("first pass applies SQL");
    assert_eq!(exec.executions(), 1);

    // Unchanged desired state: zero executions, no new revision
    let second = reconcile_database_sql(Some(&exec), &set, &revision)
        .await
        .unwrap();
    assert!(second.is_none());
    assert_eq!(exec.executions(), 1);
}

#[tokio::test]
async fn users_sql_executes_once_then_skips() {
    let exec = MockExecutor::new();
    let users = vec![UserSpec {
        name: "app".to_string(),
        databases: vec!["app".to_string()],
    }];
    let creds = verifiers(&[("app", "SCRAM-SHA-256$4096:x")]);

    let revision = reconcile_users_sql(Some(&exec), &users, &creds, "")
        .await
        .unwrap()
        .expect("first pass applies SQL");
    assert_eq!(exec.executions(), 1);

    let second = reconcile_users_sql(Some(&exec), &users, &creds, &revision)
        .await
        .unwrap();
    assert!(second.is_none());
    assert_eq!(exec.executions(), 1);
}

#[tokio::test]
async fn changed_state_applies_and_reports_new_revision() {
    let exec = MockExecutor::new();

    let first = reconcile_database_sql(Some(&exec), &databases(&["a"]), "")
        .await
        .unwrap()
        .unwrap();
    let second = reconcile_database_sql(Some(&exec), &databases(&["a", "b"]), &first)
        .await
        .unwrap()
        .expect("changed set applies again");

    assert_ne!(first, second);
    assert_eq!(exec.executions(), 2);
}

#[tokio::test]
async fn no_qualifying_target_defers_without_mutation() {
    let set = databases(&["app"]);

    let result = reconcile_database_sql(None::<&MockExecutor>, &set, "")
        .await
        .unwrap();
    assert!(result.is_none());

    let users = vec![UserSpec {
        name: "app".to_string(),
        databases: vec![],
    }];
    let result = reconcile_users_sql(None::<&MockExecutor>, &users, &BTreeMap::new(), "")
        .await
        .unwrap();
    assert!(result.is_none());
}
