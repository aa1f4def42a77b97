//! The container-runtime collaborator contract.
//!
//! The pipeline hands a [`WorkRequest`] to whatever driver is wired in
//! and gets back collected output and an exit code. [`ProcessWorker`]
//! runs the argv as a local child process — the development stand-in
//! for a real container driver, which would honor `image`.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gort_domain::{Error, Result};

/// Everything a driver needs to launch one workload.
#[derive(Clone, Debug)]
pub struct WorkRequest {
    /// Container image declared by the bundle; may be empty for
    /// controller-served bundles.
    pub image: String,
    /// Executable prefix plus rendered arguments.
    pub argv: Vec<String>,
    /// Per-invocation environment, dynamic configuration layers merged.
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

/// Collected workload output.
#[derive(Clone, Debug, Default)]
pub struct WorkResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: i64,
}

/// A driver failure (timeout, launch error) is an `Error::Execution` —
/// the pipeline turns it into an error envelope, never a fault.
#[async_trait]
pub trait CommandWorker: Send + Sync {
    async fn execute(&self, work: &WorkRequest) -> Result<WorkResult>;
}

/// Runs workloads as local child processes.
pub struct ProcessWorker;

#[async_trait]
impl CommandWorker for ProcessWorker {
    async fn execute(&self, work: &WorkRequest) -> Result<WorkResult> {
        let Some((program, args)) = work.argv.split_first() else {
            return Err(Error::Execution("command has no executable".into()));
        };
        let started = Instant::now();

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .envs(&work.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(work.timeout, command.output())
            .await
            .map_err(|_| {
                Error::Execution(format!(
                    "timed out after {}s",
                    work.timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Execution(format!("launch failed: {e}")))?;

        Ok(WorkResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
            duration_ms: started.elapsed().as_millis() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work(argv: &[&str]) -> WorkRequest {
        WorkRequest {
            image: String::new(),
            argv: argv.iter().map(|s| (*s).to_owned()).collect(),
            env: HashMap::new(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let result = ProcessWorker.execute(&work(&["/bin/echo", "hello"])).await.unwrap();
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_a_driver_error() {
        let result = ProcessWorker.execute(&work(&["/bin/false"])).await.unwrap();
        assert_ne!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn launch_failure_is_an_execution_error() {
        let err = ProcessWorker
            .execute(&work(&["/no/such/binary"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        assert!(ProcessWorker.execute(&work(&[])).await.is_err());
    }
}
