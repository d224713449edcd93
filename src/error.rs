use std::fmt;
use std::path::PathBuf;

/// A manifest row did not parse: wrong column count or a non-numeric field.
#[derive(Debug)]
pub struct MalformedManifest {
    pub path: PathBuf,
    pub detail: String,
}

impl fmt::Display for MalformedManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed manifest {}: {}",
            self.path.display(),
            self.detail
        )
    }
}

impl std::error::Error for MalformedManifest {}

/// The dump/restore driver did not produce the expected file.
#[derive(Debug)]
pub struct DumpFailed {
    pub path: PathBuf,
}

impl fmt::Display for DumpFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dump task failed, expected output at {}", self.path.display())
    }
}

impl std::error::Error for DumpFailed {}

/// A fetch was attempted against a bucket with no manifest yet.
#[derive(Debug)]
pub struct RemoteEmpty;

impl fmt::Display for RemoteEmpty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote has not been initialized; push an initial commit first")
    }
}

impl std::error::Error for RemoteEmpty {}

/// The resolver returned "no" at a conflict prompt.
#[derive(Debug)]
pub struct UserCancelled;

impl fmt::Display for UserCancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation cancelled by user")
    }
}

impl std::error::Error for UserCancelled {}

/// Inferred from a post-condition check (e.g. file absent locally after a download).
#[derive(Debug)]
pub struct TransferFailed {
    pub path: String,
    pub detail: String,
}

impl fmt::Display for TransferFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transfer failed for {}: {}", self.path, self.detail)
    }
}

impl std::error::Error for TransferFailed {}
