pub mod config;
pub mod executor;
pub mod password;
pub mod sql;

pub use config::{data_directory, wal_directory};
pub use executor::{ExecError, Executor, PodExecutor, RecordingExecutor};
pub use sql::{create_databases_in_postgresql, write_users_in_postgresql};
