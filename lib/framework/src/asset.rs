use std::env;
use std::env::current_exe;
use std::path::Path;
use std::path::PathBuf;

use crate::exception;
use crate::exception::CoreRsResult;

/// Resolves a file shipped next to the binary, e.g. `assets/conf.json`.
///
/// In debug builds started by `cargo run`/`cargo test`, falls back to the package source folder.
pub fn asset_path(path: &str) -> CoreRsResult<PathBuf> {
    let exe_path = current_exe()?;
    let candidates = candidates(&exe_path, path);
    if let Some(asset_path) = candidates.iter().find(|candidate| candidate.exists()) {
        return Ok(asset_path.clone());
    }
    Err(exception!(
        message = format!(
            "asset not found, asset={path}, candidates={candidates:?}, exe={}",
            exe_path.to_string_lossy()
        )
    ))
}

fn candidates(exe_path: &Path, path: &str) -> Vec<PathBuf> {
    let mut candidates = vec![exe_path.with_file_name(path)];
    if cfg!(debug_assertions)
        && let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR")
    {
        candidates.push(PathBuf::from(manifest_dir).join(path));
    }
    candidates
}
