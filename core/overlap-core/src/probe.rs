//! Environment probing: hostname, device name, remote indicator, git metadata.
//!
//! Everything here is best-effort. External commands run with a short timeout
//! and any failure degrades to a fallback value or `None`.

use std::env;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Upper bound for each external command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    pub repo_name: Option<String>,
    pub remote_url: Option<String>,
    pub branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentInfo {
    pub hostname: String,
    pub device_name: String,
    pub is_remote: bool,
    pub git: GitInfo,
}

/// Source of environment facts for registration.
pub trait Probe {
    fn gather(&self, cwd: &str) -> EnvironmentInfo;
}

/// Probes the real machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl Probe for SystemProbe {
    fn gather(&self, cwd: &str) -> EnvironmentInfo {
        let info = EnvironmentInfo {
            hostname: hostname(),
            device_name: device_name(),
            is_remote: is_remote_session(),
            git: git_info(cwd),
        };
        tracing::info!(
            hostname = %info.hostname,
            device_name = %info.device_name,
            is_remote = info.is_remote,
            git_repo = ?info.git.repo_name,
            git_branch = ?info.git.branch,
            "Collected environment info"
        );
        info
    }
}

pub fn hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Friendly machine name (macOS "Computer Name"), falling back to the hostname.
pub fn device_name() -> String {
    if cfg!(target_os = "macos") {
        if let Some(name) = run_with_timeout("scutil", &["--get", "ComputerName"], None, COMMAND_TIMEOUT)
            .filter(|name| !name.is_empty())
        {
            return name;
        }
    }
    hostname()
}

pub fn is_remote_session() -> bool {
    is_remote_session_with(|key| env::var(key).ok())
}

pub fn is_remote_session_with<F>(lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let present = |key: &str| lookup(key).is_some_and(|v| !v.is_empty());
    present("SSH_CLIENT")
        || present("SSH_TTY")
        || lookup("CLAUDE_CODE_REMOTE").as_deref() == Some("true")
}

pub fn git_info(cwd: &str) -> GitInfo {
    let dir = Path::new(cwd);
    if !dir.is_dir() {
        tracing::debug!(cwd, "Working directory missing, skipping git lookup");
        return GitInfo::default();
    }

    let remote_url = run_with_timeout("git", &["remote", "get-url", "origin"], Some(dir), COMMAND_TIMEOUT)
        .filter(|url| !url.is_empty());
    if remote_url.is_none() {
        tracing::debug!(cwd, "Git remote not found");
    }

    let branch = run_with_timeout("git", &["branch", "--show-current"], Some(dir), COMMAND_TIMEOUT)
        .filter(|branch| !branch.is_empty());
    if branch.is_none() {
        tracing::debug!(cwd, "Git branch not found");
    }

    GitInfo {
        repo_name: remote_url.as_deref().map(repo_name_from_remote),
        remote_url,
        branch,
    }
}

/// `git@host:org/repo.git` → `repo`.
pub fn repo_name_from_remote(remote: &str) -> String {
    let trimmed = remote.strip_suffix(".git").unwrap_or(remote);
    trimmed
        .rsplit('/')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

/// Runs a command and returns its trimmed stdout when it exits successfully
/// within `timeout`. The child is killed on expiry.
fn run_with_timeout(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Option<String> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::debug!(program, error = %err, "Command unavailable");
            return None;
        }
    };

    // stdout is drained while polling; the child must never block on a full pipe.
    let reader = child.stdout.take().map(|mut stdout| {
        std::thread::spawn(move || {
            let mut output = String::new();
            stdout.read_to_string(&mut output).map(|_| output)
        })
    });

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if start.elapsed() > timeout => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(program, ?args, "Command timed out");
                return None;
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(_) => return None,
        }
    };

    let output = reader?.join().ok()?.ok()?;
    if !status.success() {
        return None;
    }
    Some(output.trim().to_string())
}
