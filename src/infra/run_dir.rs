use anyhow::{bail, Context, Result};
use std::{fs, path::{Path, PathBuf}};

/// Highest run number tried before giving up
const MAX_RUNS: usize = 99;

/// Create and return the first unused `<base>/<name>-NN` directory.
pub fn get_save_dir(base: impl AsRef<Path>, name: &str) -> Result<PathBuf> {
    let base = base.as_ref();
    for uid in 1..=MAX_RUNS {
        let dir = base.join(format!("{name}-{uid:02}"));
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Cannot create run directory '{}'", dir.display()))?;
            return Ok(dir);
        }
    }
    bail!(
        "Too many save directories named '{name}' in '{}'. Delete old runs or pick another --run-name",
        base.display()
    )
}
