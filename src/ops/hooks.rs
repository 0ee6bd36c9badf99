use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{Error, IoContext, Result};
use crate::repo::Repo;

/// the hook points around commit and checkout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hook {
    PreCommit,
    PostCommit,
    PreCheckout,
    PostCheckout,
}

impl Hook {
    pub fn file_name(&self) -> &'static str {
        match self {
            Hook::PreCommit => "pre-commit",
            Hook::PostCommit => "post-commit",
            Hook::PreCheckout => "pre-checkout",
            Hook::PostCheckout => "post-checkout",
        }
    }
}

/// run a pre-hook: a missing hook succeeds, a non-zero exit aborts the
/// operation, and exceeding the timeout kills the hook and aborts
pub fn run_pre_hook(repo: &Repo, hook: Hook, env: &[(&str, String)]) -> Result<()> {
    match execute(repo, hook, env)? {
        Outcome::Missing | Outcome::Success => Ok(()),
        Outcome::Failed(detail) => Err(Error::HookRejected {
            hook: hook.file_name().to_string(),
            detail,
        }),
        Outcome::TimedOut => Err(Error::Timeout(format!("{} hook", hook.file_name()))),
    }
}

/// run a post-hook: failures and timeouts are logged, never fatal
pub fn run_post_hook(repo: &Repo, hook: Hook, env: &[(&str, String)]) {
    match execute(repo, hook, env) {
        Ok(Outcome::Missing | Outcome::Success) => {}
        Ok(Outcome::Failed(detail)) => {
            warn!("{} hook failed: {}", hook.file_name(), detail);
        }
        Ok(Outcome::TimedOut) => {
            warn!("{} hook timed out and was killed", hook.file_name());
        }
        Err(e) => warn!("{} hook could not run: {}", hook.file_name(), e),
    }
}

enum Outcome {
    Missing,
    Success,
    Failed(String),
    TimedOut,
}

fn execute(repo: &Repo, hook: Hook, env: &[(&str, String)]) -> Result<Outcome> {
    let path = repo.hooks_path().join(hook.file_name());
    if !path.is_file() {
        return Ok(Outcome::Missing);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        let mode = std::fs::metadata(&path).with_path(&path)?.permissions().mode();
        if mode & 0o111 == 0 {
            warn!("{} hook is not executable, skipping", hook.file_name());
            return Ok(Outcome::Missing);
        }
    }

    let mut command = Command::new(&path);
    command
        .current_dir(repo.root())
        .env("DFM_REPO_PATH", repo.root())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    for (key, value) in env {
        command.env(key, value);
    }

    let mut child = command.spawn().with_path(&path)?;

    let timeout = Duration::from_secs(repo.config().hook_timeout_secs);
    let started = Instant::now();
    let status = loop {
        match child.try_wait().with_path(&path)? {
            Some(status) => break status,
            None if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(Outcome::TimedOut);
            }
            None => std::thread::sleep(Duration::from_millis(25)),
        }
    };

    if status.success() {
        return Ok(Outcome::Success);
    }

    let mut detail = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        use std::io::Read as _;
        let _ = stderr.read_to_string(&mut detail);
    }
    let detail = detail.trim();
    let detail = if detail.is_empty() {
        format!("exit status {}", status.code().unwrap_or(-1))
    } else {
        detail.to_string()
    };
    Ok(Outcome::Failed(detail))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt as _;
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(dir.path(), false).unwrap();
        (dir, repo)
    }

    fn install_hook(repo: &Repo, hook: Hook, script: &str) {
        let path = repo.hooks_path().join(hook.file_name());
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_missing_hook_succeeds() {
        let (_dir, repo) = test_repo();
        run_pre_hook(&repo, Hook::PreCommit, &[]).unwrap();
    }

    #[test]
    fn test_passing_hook() {
        let (_dir, repo) = test_repo();
        install_hook(&repo, Hook::PreCommit, "exit 0");
        run_pre_hook(&repo, Hook::PreCommit, &[]).unwrap();
    }

    #[test]
    fn test_rejecting_hook() {
        let (_dir, repo) = test_repo();
        install_hook(&repo, Hook::PreCommit, "echo nope >&2; exit 1");

        let result = run_pre_hook(&repo, Hook::PreCommit, &[]);
        match result {
            Err(Error::HookRejected { hook, detail }) => {
                assert_eq!(hook, "pre-commit");
                assert_eq!(detail, "nope");
            }
            other => panic!("expected HookRejected, got {other:?}"),
        }
    }

    #[test]
    fn test_hook_sees_environment() {
        let (dir, repo) = test_repo();
        install_hook(
            &repo,
            Hook::PreCommit,
            "test \"$DFM_BRANCH\" = main && test -n \"$DFM_REPO_PATH\"",
        );

        run_pre_hook(
            &repo,
            Hook::PreCommit,
            &[("DFM_BRANCH", "main".to_string())],
        )
        .unwrap();
        drop(dir);
    }

    #[test]
    fn test_non_executable_hook_is_skipped() {
        let (_dir, repo) = test_repo();
        let path = repo.hooks_path().join("pre-commit");
        std::fs::write(&path, "#!/bin/sh\nexit 1\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        run_pre_hook(&repo, Hook::PreCommit, &[]).unwrap();
    }

    #[test]
    fn test_post_hook_failure_is_not_fatal() {
        let (_dir, repo) = test_repo();
        install_hook(&repo, Hook::PostCommit, "exit 3");
        run_post_hook(&repo, Hook::PostCommit, &[]);
    }

    #[test]
    fn test_hook_timeout() {
        let (dir, mut repo) = test_repo();
        repo.config_mut().hook_timeout_secs = 1;
        install_hook(&repo, Hook::PreCommit, "sleep 10");

        let started = std::time::Instant::now();
        let result = run_pre_hook(&repo, Hook::PreCommit, &[]);
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(dir);
    }
}
