//! SQL generation for database and user reconciliation
//!
//! Both entry points issue a single `psql` invocation with the DDL piped on
//! stdin. They are written against the [`Executor`] capability so the exact
//! same statements can be fingerprinted by a recording executor before
//! being applied by a live one.

use std::collections::{BTreeMap, BTreeSet};

use crate::crd::UserSpec;
use crate::postgres::executor::{ExecError, ExecResult, Executor};

/// Create every database in `databases` that does not already exist.
///
/// Databases are iterated in sorted order, so the resulting statement
/// stream (and therefore its fingerprint) does not depend on how the set
/// was assembled.
pub async fn create_databases_in_postgresql<E: Executor + ?Sized>(
    exec: &E,
    databases: &BTreeSet<String>,
) -> ExecResult<()> {
    let mut sql = String::from("SET client_min_messages = WARNING;\n");

    for database in databases {
        let literal = quote_literal(database);
        sql.push_str(&format!(
            "SELECT pg_catalog.format('CREATE DATABASE %I', {literal}) \
             WHERE NOT EXISTS (SELECT 1 FROM pg_catalog.pg_database WHERE datname = {literal})\\gexec\n"
        ));
    }

    run_sql(exec, &sql).await
}

/// Create or update every user in `users` inside PostgreSQL.
///
/// Missing roles are created, then each role's login and password verifier
/// are set and it is granted access to its databases. The verifier comes
/// from the user's secret, so the statement stream reflects exactly the
/// credential that is stored there.
pub async fn write_users_in_postgresql<E: Executor + ?Sized>(
    exec: &E,
    users: &[UserSpec],
    verifiers: &BTreeMap<String, String>,
) -> ExecResult<()> {
    let mut sorted: Vec<&UserSpec> = users.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut sql = String::from("SET client_min_messages = WARNING;\n");

    for user in sorted {
        let name_literal = quote_literal(&user.name);
        let role = quote_identifier(&user.name);

        sql.push_str(&format!(
            "SELECT pg_catalog.format('CREATE ROLE %I', {name_literal}) \
             WHERE NOT EXISTS (SELECT 1 FROM pg_catalog.pg_roles WHERE rolname = {name_literal})\\gexec\n"
        ));

        let verifier = verifiers
            .get(&user.name)
            .map(String::as_str)
            .unwrap_or_default();
        sql.push_str(&format!(
            "ALTER ROLE {role} WITH LOGIN PASSWORD {};\n",
            quote_literal(verifier)
        ));

        let mut databases = user.databases.clone();
        databases.sort();
        databases.dedup();
        for database in &databases {
            sql.push_str(&format!(
                "GRANT ALL PRIVILEGES ON DATABASE {} TO {role};\n",
                quote_identifier(database)
            ));
        }
    }

    run_sql(exec, &sql).await
}

/// Run a SQL script through `psql` with the script on stdin
async fn run_sql<E: Executor + ?Sized>(exec: &E, sql: &str) -> ExecResult<()> {
    let command = psql_command();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    exec.exec(Some(sql.as_bytes()), &mut stdout, &mut stderr, &command)
        .await?;

    let stderr = String::from_utf8_lossy(&stderr);
    if stderr.contains("ERROR") {
        return Err(ExecError::Sql(stderr.into_owned()));
    }

    Ok(())
}

fn psql_command() -> Vec<String> {
    [
        "psql",
        "-Xw",
        "-U",
        "postgres",
        "-d",
        "postgres",
        "-A",
        "-t",
        "--set=ON_ERROR_STOP=1",
        "-f",
        "-",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Quote a SQL identifier (database name, role name, etc.)
/// Uses PostgreSQL's standard double-quote escaping
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL string literal
/// Uses PostgreSQL's standard single-quote escaping
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
