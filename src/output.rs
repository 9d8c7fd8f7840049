//! CSV persistence of the final tables.
//!
//! Each run rewrites its output file from scratch; nothing is appended to or
//! merged with earlier output.
//!
//! ```text
//! data_dir/
//! ├── resale.csv     # `records` command
//! └── edgeprop.csv   # `listings` command
//! ```

use serde::Serialize;
use std::fs as stdfs;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

use crate::error::Result;

pub const RESALE_FILE: &str = "resale.csv";
pub const LISTINGS_FILE: &str = "edgeprop.csv";

/// Serialize `rows` with a header line and replace `path` with the result.
#[instrument(level = "info", skip_all, fields(path = %path.display(), rows = rows.len()))]
pub async fn write_table<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;

    fs::write(path, bytes).await?;
    info!("Wrote CSV table");
    Ok(())
}

/// Create `dir` if needed and prove it is writable with a probe file.
#[instrument(level = "info", skip_all, fields(path = %dir.display()))]
pub async fn ensure_writable_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await?;
    let probe: PathBuf = dir.join("..__probe_write__");
    stdfs::File::create(&probe)?;
    let _ = stdfs::remove_file(&probe);
    info!("Output directory is writable");
    Ok(())
}
