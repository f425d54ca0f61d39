use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Single-instance guard for the daemon. The lock file carries the holder's
/// PID for operator diagnostics and is removed on drop.
#[derive(Debug)]
pub struct DaemonLock {
    path: PathBuf,
    _file: File,
}

#[derive(Debug)]
pub enum LockError {
    Held {
        path: PathBuf,
        holder_pid: Option<u32>,
    },
    Io(std::io::Error),
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::Held { path, holder_pid } => match holder_pid {
                Some(pid) => write!(
                    f,
                    "lock file '{}' is held by pid {}; is another daemon running?",
                    path.display(),
                    pid
                ),
                None => write!(f, "lock file '{}' is already held", path.display()),
            },
            LockError::Io(err) => write!(f, "lock I/O error: {}", err),
        }
    }
}

impl std::error::Error for LockError {}

impl From<std::io::Error> for LockError {
    fn from(value: std::io::Error) -> Self {
        LockError::Io(value)
    }
}

impl DaemonLock {
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                file.sync_all()?;
                Ok(DaemonLock {
                    path: path.to_path_buf(),
                    _file: file,
                })
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(LockError::Held {
                path: path.to_path_buf(),
                holder_pid: read_holder_pid(path),
            }),
            Err(err) => Err(LockError::Io(err)),
        }
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn read_holder_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
}
