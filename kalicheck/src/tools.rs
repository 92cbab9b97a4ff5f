use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

/// Resolves the generator binary: an explicit path must exist, a bare name
/// is looked up on `PATH`.
pub(crate) fn resolve_tcpkali(configured: &Path) -> Result<PathBuf> {
    let is_bare_name = configured.components().count() == 1 && !configured.is_absolute();
    if is_bare_name && !configured.exists() {
        if let Some(found) = configured.to_str().and_then(which) {
            return Ok(found);
        }
        bail!("missing command: {configured:?} not found on PATH (set TCPKALI or pass --tcpkali)");
    }

    if !configured.is_file() {
        bail!("missing binary: {configured:?} (set TCPKALI or pass --tcpkali)");
    }
    Ok(configured.to_path_buf())
}

/// First `PATH` entry holding a file called `name`.
fn which(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
