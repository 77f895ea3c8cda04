#![forbid(unsafe_code)]

//! Shared security helpers used by the tubecast binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Fails fast when a binary is started as root. The server is expected to run
/// under a dedicated, unprivileged service account. Guarding the binary itself
/// ensures that manual invocations do not silently revert to insecure
/// defaults.
pub fn ensure_not_root(process: &str) -> Result<()> {
    if Uid::current().is_root() {
        bail!("{process} must not be run as root; please use the tubecast service account");
    }
    Ok(())
}
