//! Remote command execution against PostgreSQL pods
//!
//! SQL is applied to a cluster by running `psql` inside the database
//! container via the Kubernetes exec API. The same code paths are used to
//! fingerprint the work without executing it: a recording executor feeds
//! every command and its piped input into a stream hash instead of a pod.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams};
use kube::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Errors that can occur while executing commands in a pod
#[derive(Error, Debug)]
pub enum ExecError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// IO error during exec
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The exec session did not provide an expected stream
    #[error("missing {0} stream from exec")]
    MissingStream(&'static str),

    /// The command terminated unsuccessfully
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// The command succeeded but PostgreSQL reported an error
    #[error("SQL error: {0}")]
    Sql(String),
}

/// Result type for remote execution
pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Capability to run a command against a live cluster member.
///
/// Two implementations exist: [`PodExecutor`] runs the command for real via
/// the Kubernetes exec API, and [`RecordingExecutor`] hashes what would be
/// sent without touching the cluster. Callers select one explicitly.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `command`, piping `stdin` when given and collecting output into
    /// `stdout` and `stderr`.
    async fn exec(
        &self,
        stdin: Option<&[u8]>,
        stdout: &mut Vec<u8>,
        stderr: &mut Vec<u8>,
        command: &[String],
    ) -> ExecResult<()>;
}

/// Executor that runs commands inside a container of a live pod
pub struct PodExecutor {
    pods: Api<Pod>,
    pod_name: String,
    container: String,
}

impl PodExecutor {
    pub fn new(client: Client, namespace: &str, pod_name: &str, container: &str) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            pod_name: pod_name.to_string(),
            container: container.to_string(),
        }
    }

}

#[async_trait]
impl Executor for PodExecutor {
    async fn exec(
        &self,
        stdin: Option<&[u8]>,
        stdout: &mut Vec<u8>,
        stderr: &mut Vec<u8>,
        command: &[String],
    ) -> ExecResult<()> {
        debug!(pod = %self.pod_name, container = %self.container, "executing command in pod");

        let attach_params = AttachParams {
            container: Some(self.container.clone()),
            stdin: true,
            stdout: true,
            stderr: true,
            tty: false,
            ..Default::default()
        };

        let mut attached = self
            .pods
            .exec(&self.pod_name, command.to_vec(), &attach_params)
            .await?;

        // Write any piped input, then close stdin to signal end of input
        if let Some(mut writer) = attached.stdin() {
            if let Some(bytes) = stdin {
                writer.write_all(bytes).await?;
            }
            writer.shutdown().await?;
        }

        let mut out = attached
            .stdout()
            .ok_or(ExecError::MissingStream("stdout"))?;
        let mut err = attached
            .stderr()
            .ok_or(ExecError::MissingStream("stderr"))?;

        out.read_to_end(stdout).await?;
        err.read_to_end(stderr).await?;

        let status = attached
            .take_status()
            .ok_or(ExecError::MissingStream("status"))?;

        if let Some(status) = status.await
            && status.status.as_deref() != Some("Success")
        {
            let message = if stderr.is_empty() {
                format!("command terminated with status: {:?}", status.status)
            } else {
                String::from_utf8_lossy(stderr).into_owned()
            };
            return Err(ExecError::CommandFailed(message));
        }

        Ok(())
    }
}

/// Executor that hashes the exact work a real executor would perform.
///
/// Every command argument vector and all piped input are written into a
/// SHA-256 stream; nothing is executed and output buffers stay empty. The
/// digest is truncated to 32 bits; the fingerprint is a change detector,
/// not a security primitive.
#[derive(Default)]
pub struct RecordingExecutor {
    digest: Mutex<Sha256>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hex-encoded 32-bit fingerprint of everything recorded so far
    pub fn revision(&self) -> String {
        let digest = self
            .digest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let sum = digest.finalize();
        let word = u32::from_be_bytes([sum[0], sum[1], sum[2], sum[3]]);
        format!("{word:08x}")
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn exec(
        &self,
        stdin: Option<&[u8]>,
        _stdout: &mut Vec<u8>,
        _stderr: &mut Vec<u8>,
        command: &[String],
    ) -> ExecResult<()> {
        let mut digest = self.digest.lock().unwrap_or_else(PoisonError::into_inner);
        for arg in command {
            digest.update(arg.as_bytes());
            digest.update([0u8]);
        }
        if let Some(bytes) = stdin {
            digest.update(bytes);
        }
        Ok(())
    }
}
