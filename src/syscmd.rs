//! External process plumbing: locating the remote-shell client and the
//! editor, spawning them with the TUI suspended, and the exit-on-connect
//! process replacement.

use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;

use crate::terminal::Terminal;

pub const EDITOR_FALLBACKS: [&str; 4] = ["vim", "vi", "nano", "ed"];

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("env EDITOR not set, nor any of {EDITOR_FALLBACKS:?} found in PATH")]
    EditorNotFound,
    #[error("can't find `{0}` in your PATH")]
    ClientNotFound(String),
}

/// The remote-shell client a connection uses, toggled at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Client {
    Ssh,
    Mosh,
}

impl Client {
    pub fn name(self) -> &'static str {
        match self {
            Client::Ssh => "ssh",
            Client::Mosh => "mosh",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            Client::Ssh => Client::Mosh,
            Client::Mosh => Client::Ssh,
        }
    }

    /// Argument list for an interactive connection to `host`, pointing
    /// the client at `config` so it sees the same host definitions.
    pub fn connect_args(self, config: &Path, host: &str) -> Vec<String> {
        let config = config.to_string_lossy();
        match self {
            Client::Ssh => vec!["-F".into(), config.into_owned(), host.to_string()],
            // mosh has no -F; route the option through its inner ssh
            Client::Mosh => vec![
                "--ssh".into(),
                format!("ssh -F {config}"),
                host.to_string(),
            ],
        }
    }
}

/// Argument list for a one-shot, non-interactive remote command. Always
/// plain ssh: mosh only does interactive sessions.
pub fn remote_command_args(config: &Path, host: &str, command: &str) -> Vec<String> {
    vec![
        "-T".into(),
        "-F".into(),
        config.to_string_lossy().into_owned(),
        host.to_string(),
        command.to_string(),
    ]
}

/// Searches PATH for `program`. Names containing a separator are checked
/// as given.
pub fn lookup(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Resolves an editor: `$EDITOR` first, then common fallbacks on PATH.
pub fn find_editor() -> Result<PathBuf, LaunchError> {
    let from_env = env::var("EDITOR").unwrap_or_default();
    let found = std::iter::once(from_env.as_str())
        .chain(EDITOR_FALLBACKS)
        .filter(|name| !name.is_empty())
        .find_map(lookup);
    found.ok_or(LaunchError::EditorNotFound)
}

/// Runs `program` attached to the real terminal, suspending the TUI for
/// the duration. stderr is captured for error surfacing; stdin/stdout
/// stay on the terminal. Returns the exit status and captured stderr.
pub fn run_attached(
    terminal: &mut Terminal<std::io::Stdout>,
    program: &Path,
    args: &[String],
    cwd: Option<&Path>,
) -> anyhow::Result<(ExitStatus, String)> {
    terminal.suspend()?;
    let result = (|| {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn()?;
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            // the child blocks on the pipe if we wait first
            let _ = pipe.read_to_string(&mut stderr);
        }
        let status = child.wait()?;
        Ok((status, stderr))
    })();
    terminal.resume()?;
    result
}

/// Terminate self and become `program`: true image replacement where the
/// OS supports it, spawn-wait-and-exit elsewhere. Only returns on error.
pub fn replace_process(program: &Path, args: &[String]) -> anyhow::Result<()> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        Err(cmd.exec().into())
    }
    #[cfg(not(unix))]
    {
        let status = cmd.status()?;
        std::process::exit(status.code().unwrap_or(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_connect_args_pass_the_config_path() {
        let args = Client::Ssh.connect_args(Path::new("/home/ops/.ssh/config"), "web1");
        assert_eq!(args, ["-F", "/home/ops/.ssh/config", "web1"]);
    }

    #[test]
    fn mosh_connect_args_route_config_through_inner_ssh() {
        let args = Client::Mosh.connect_args(Path::new("/etc/ssh/ssh_config"), "db");
        assert_eq!(args, ["--ssh", "ssh -F /etc/ssh/ssh_config", "db"]);
    }

    #[test]
    fn remote_command_is_non_interactive() {
        let args = remote_command_args(Path::new("/tmp/config"), "web1", "uptime -p");
        assert_eq!(args, ["-T", "-F", "/tmp/config", "web1", "uptime -p"]);
    }

    #[test]
    fn client_toggles_between_ssh_and_mosh() {
        assert_eq!(Client::Ssh.toggle(), Client::Mosh);
        assert_eq!(Client::Mosh.toggle(), Client::Ssh);
        assert_eq!(Client::Ssh.name(), "ssh");
    }

    #[test]
    fn lookup_misses_cleanly() {
        assert!(lookup("definitely-not-a-real-binary-name").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn editor_comes_from_the_environment_first() {
        env::set_var("EDITOR", "/bin/sh");
        assert_eq!(find_editor().unwrap(), PathBuf::from("/bin/sh"));
    }
}
