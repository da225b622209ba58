use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const GIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Version-control state of a repository. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Full commit hash of `HEAD`.
    pub commit: Option<String>,
    /// Current branch name.
    pub branch: Option<String>,
    /// URL of the `origin` remote.
    pub remote: Option<String>,
}

/// Source of version-control metadata for the meta block.
///
/// Implementations must not fail: anything that goes wrong yields empty fields.
pub trait CommitInfoProvider {
    /// Returns the commit information for the repository containing `repo`.
    fn commit_info(&self, repo: &Path) -> CommitInfo;
}

/// Provider that never reports any commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCommitInfo;

impl CommitInfoProvider for NoCommitInfo {
    fn commit_info(&self, _repo: &Path) -> CommitInfo {
        CommitInfo::default()
    }
}

/// Provider that runs the `git` executable with a per-invocation time bound.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: OsString,
    timeout: Duration,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: OsString::from("git"),
            timeout: GIT_TIMEOUT,
        }
    }
}

impl GitCli {
    /// Uses a specific git executable.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// Overrides the time bound applied to each git invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run(&self, repo: &Path, args: &[&str]) -> Option<String> {
        let mut child = match Command::new(&self.program)
            .args(args)
            .current_dir(repo)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                debug!(repo = %repo.display(), error = %err, "git could not be started");
                return None;
            }
        };
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => break,
                Ok(Some(_)) => return None,
                Ok(None) if Instant::now() >= deadline => {
                    warn!(repo = %repo.display(), ?args, "git timed out; recording no commit");
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    debug!(error = %err, "failed to wait for git");
                    return None;
                }
            }
        }
        let mut output = String::new();
        child.stdout.take()?.read_to_string(&mut output).ok()?;
        let trimmed = output.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

impl CommitInfoProvider for GitCli {
    fn commit_info(&self, repo: &Path) -> CommitInfo {
        let Some(commit) = self.run(repo, &["rev-parse", "HEAD"]) else {
            return CommitInfo::default();
        };
        CommitInfo {
            commit: Some(commit),
            branch: self.run(repo, &["rev-parse", "--abbrev-ref", "HEAD"]),
            remote: self.run(repo, &["config", "--get", "remote.origin.url"]),
        }
    }
}

/// Process-level facts captured once when the registrar is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    /// Login name.
    pub user: String,
    /// Machine host name.
    pub host: String,
    /// Working directory of the process.
    pub cwd: PathBuf,
}

impl HostContext {
    /// Reads user, host and working directory from the running process.
    pub fn capture() -> Self {
        let user = env::var("USER")
            .or_else(|_| env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            user,
            host: detect_hostname().unwrap_or_else(|| "unknown".to_string()),
            cwd,
        }
    }
}

fn detect_hostname() -> Option<String> {
    let from_env = env::var("HOSTNAME")
        .or_else(|_| env::var("COMPUTERNAME"))
        .ok()
        .filter(|name| !name.trim().is_empty());
    if from_env.is_some() {
        return from_env;
    }
    if let Ok(contents) = fs::read_to_string("/etc/hostname") {
        let name = contents.trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }
    let output = Command::new("hostname")
        .output()
        .ok()
        .filter(|output| output.status.success())?;
    let hostname = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if hostname.is_empty() {
        None
    } else {
        Some(hostname)
    }
}

/// The `meta` block of an id card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    /// Login name.
    pub user: String,
    /// Host name.
    pub host: String,
    /// Working directory at registration time.
    pub cwd: String,
    /// Operating system family.
    pub os: String,
    /// CPU architecture.
    pub arch: String,
    /// Version of the tool that wrote the card.
    pub tool_version: String,
    /// Commit of the model repository.
    pub git_commit: Option<String>,
    /// Branch of the model repository.
    pub git_branch: Option<String>,
    /// `origin` remote of the model repository.
    pub git_remote: Option<String>,
}

impl EnvironmentSnapshot {
    /// Combines host facts with commit information for `repo`.
    pub fn collect(host: &HostContext, repo: &Path, commits: &dyn CommitInfoProvider) -> Self {
        let info = commits.commit_info(repo);
        if info.commit.is_none() {
            debug!(repo = %repo.display(), "no commit information available");
        }
        Self {
            user: host.user.clone(),
            host: host.host.clone(),
            cwd: host.cwd.display().to_string(),
            os: env::consts::OS.to_string(),
            arch: env::consts::ARCH.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            git_commit: info.commit,
            git_branch: info.branch,
            git_remote: info.remote,
        }
    }
}
