use chrono::NaiveDate;
use clima_core::ensure_parent_dir;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Last date whose collection was fully attempted, persisted as one
/// `YYYY-MM-DD` line.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when nothing was persisted yet or the content is not a date.
    pub fn load(&self) -> Option<NaiveDate> {
        let content = fs::read_to_string(&self.path).ok()?;
        NaiveDate::parse_from_str(content.trim(), "%Y-%m-%d").ok()
    }

    /// Overwrites the stored date. Writes a sibling file first and renames
    /// it over the old one so a crash never leaves a truncated watermark.
    pub fn save(&self, date: NaiveDate) -> std::io::Result<()> {
        ensure_parent_dir(&self.path)?;
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        fs::write(&staging, format!("{}\n", date.format("%Y-%m-%d")))?;
        fs::rename(&staging, &self.path)
    }
}
