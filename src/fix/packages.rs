use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info};

use super::{FixContext, FixError, FixStrategy};
use crate::analysis::dependency::LOCKFILES;
use crate::types::Issue;

const NPM_LOCK_ARGS: &[&str] = &["install", "--package-lock-only", "--ignore-scripts"];

/// Runs external tools for strategies that cannot be expressed as text edits.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<(), FixError>;
}

/// Spawns real processes. The child is killed if the timeout elapses.
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<(), FixError> {
        let command = format!("{} {}", program, args.join(" "));
        debug!(command = %command, cwd = %cwd.display(), "spawning");

        let child = tokio::process::Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Err(_) => return Err(FixError::CommandTimeout { command, timeout }),
            Ok(Err(e)) => {
                return Err(FixError::Command {
                    command,
                    reason: e.to_string(),
                })
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
                .unwrap_or_else(|| output.status.to_string());
            return Err(FixError::Command { command, reason });
        }
        Ok(())
    }
}

/// Generates `package-lock.json` without installing or running scripts.
pub struct LockfileFix;

#[async_trait]
impl FixStrategy for LockfileFix {
    fn rule(&self) -> &'static str {
        "dependency/missing-lockfile"
    }

    fn side_files(&self, _ctx: &FixContext) -> Vec<String> {
        vec![LOCKFILES[0].to_string()]
    }

    async fn apply(&self, _issue: &Issue, ctx: &FixContext) -> Result<Vec<String>, FixError> {
        for lockfile in LOCKFILES {
            if ctx.exists(lockfile).await {
                debug!(lockfile, "lockfile already present");
                return Ok(Vec::new());
            }
        }

        ctx.runner
            .run("npm", NPM_LOCK_ARGS, &ctx.root, ctx.config.command_timeout())
            .await?;

        if !ctx.exists(LOCKFILES[0]).await {
            return Err(FixError::Command {
                command: format!("npm {}", NPM_LOCK_ARGS.join(" ")),
                reason: format!("{} was not created", LOCKFILES[0]),
            });
        }
        info!(lockfile = LOCKFILES[0], "lockfile generated");
        Ok(vec![LOCKFILES[0].to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixConfig;
    use crate::fix::tests::{test_engine_with_runner, test_issue, FakeRunner, FixErrorKind, ROOT};
    use crate::fix::AutoFixEngine;
    use crate::fs::MemoryFileSystem;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn runner(
        fs: Option<Arc<MemoryFileSystem>>,
        creates: Option<&'static str>,
        fail: Option<FixErrorKind>,
    ) -> Arc<FakeRunner> {
        Arc::new(FakeRunner {
            calls: AtomicUsize::new(0),
            fs,
            creates,
            fail,
        })
    }

    #[tokio::test]
    async fn test_lockfile_generated_through_runner() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.insert(Path::new(ROOT).join("package.json"), "{}");
        let fake = runner(Some(fs.clone()), Some("package-lock.json"), None);
        let ctx = FixContext::new(ROOT, fs, FixConfig::default(), fake.clone());
        let engine = AutoFixEngine::builtin(ctx);
        let issue = test_issue("dependency/missing-lockfile", Some("package-lock.json"), None);

        let outcome = engine.apply_fix(&issue).await;
        assert!(outcome.applied, "{:?}", outcome.error);
        assert_eq!(outcome.written, vec!["package-lock.json".to_string()]);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);

        let again = engine.apply_fix(&issue).await;
        assert!(again.applied);
        assert!(again.written.is_empty());
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_existing_yarn_lock_is_noop() {
        let fake = runner(None, None, None);
        let (_, engine) =
            test_engine_with_runner(&[("package.json", "{}"), ("yarn.lock", "")], fake.clone());
        let outcome = engine
            .apply_fix(&test_issue("dependency/missing-lockfile", Some("package-lock.json"), None))
            .await;
        assert!(outcome.applied);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_runner_timeout_is_failed_outcome() {
        let fake = runner(None, None, Some(FixErrorKind::Timeout));
        let (_, engine) = test_engine_with_runner(&[("package.json", "{}")], fake);
        let outcome = engine
            .apply_fix(&test_issue("dependency/missing-lockfile", Some("package-lock.json"), None))
            .await;
        assert!(!outcome.applied);
        assert!(outcome.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_runner_without_lockfile_output_fails() {
        let fake = runner(None, None, None);
        let (_, engine) = test_engine_with_runner(&[("package.json", "{}")], fake);
        let outcome = engine
            .apply_fix(&test_issue("dependency/missing-lockfile", Some("package-lock.json"), None))
            .await;
        assert!(!outcome.applied);
        assert!(outcome.error.unwrap().contains("was not created"));
    }

    #[tokio::test]
    async fn test_runner_exit_failure() {
        let fake = runner(None, None, Some(FixErrorKind::Exit));
        let (_, engine) = test_engine_with_runner(&[("package.json", "{}")], fake);
        let outcome = engine
            .apply_fix(&test_issue("dependency/missing-lockfile", Some("package-lock.json"), None))
            .await;
        assert!(outcome.error.unwrap().contains("exit status 1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let ok = TokioCommandRunner
            .run("true", &[], dir.path(), Duration::from_secs(5))
            .await;
        assert!(ok.is_ok());
        let failed = TokioCommandRunner
            .run("false", &[], dir.path(), Duration::from_secs(5))
            .await;
        assert!(matches!(failed, Err(FixError::Command { .. })));
        let slow = TokioCommandRunner
            .run("sleep", &["5"], dir.path(), Duration::from_millis(50))
            .await;
        assert!(matches!(slow, Err(FixError::CommandTimeout { .. })));
    }
}
