use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Debug)]
pub enum LaunchError {
    EmptyPath,
    MissingPath(PathBuf),
    Open(std::io::Error),
}

impl Display for LaunchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyPath => write!(f, "empty path"),
            Self::MissingPath(path) => write!(f, "path does not exist: {}", path.display()),
            Self::Open(error) => write!(f, "failed to open path: {error}"),
        }
    }
}

impl std::error::Error for LaunchError {}

pub fn validate_path(path: &Path) -> Result<&Path, LaunchError> {
    if path.as_os_str().is_empty() {
        return Err(LaunchError::EmptyPath);
    }

    if !path.exists() {
        return Err(LaunchError::MissingPath(path.to_path_buf()));
    }

    Ok(path)
}

pub fn open_path(path: &Path) -> Result<(), LaunchError> {
    let path = validate_path(path)?;
    let mut child = opener_command(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(LaunchError::Open)?;
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

#[cfg(target_os = "windows")]
fn opener_command(path: &Path) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg("start").arg("").arg(path);
    command
}

#[cfg(target_os = "macos")]
fn opener_command(path: &Path) -> Command {
    let mut command = Command::new("open");
    command.arg(path);
    command
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn opener_command(path: &Path) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(path);
    command
}
