use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tracing::warn;

use crate::core::NormPoint;
use crate::error::CoinjarResult;

/// Versioned identifier of the snapshot format; doubles as the default file
/// stem for on-disk stores.
pub const STORAGE_KEY: &str = "coinjar-entries-v1";

/// One persisted jar entry. `pos` is absent until the placer assigns it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StoredEntry {
    pub id: String,
    pub category: String,
    pub text: String,
    /// Creation time, integer milliseconds since the Unix epoch.
    pub created_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<NormPoint>,
}

/// Whole-snapshot JSON store. Every mutation replaces the previous snapshot
/// wholesale; loading tolerates absent or corrupt data by substituting an
/// empty list.
#[derive(Clone, Debug)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Vec<StoredEntry> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "corrupt snapshot, starting empty");
                Vec::new()
            }
        }
    }

    pub fn save(&self, entries: &[StoredEntry]) -> CoinjarResult<()> {
        let json = serde_json::to_vec_pretty(entries)
            .with_context(|| format!("serialize {} entries", entries.len()))?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create store directory '{}'", parent.display()))?;
        }
        fs::write(&self.path, json)
            .with_context(|| format!("write snapshot '{}'", self.path.display()))?;
        Ok(())
    }
}

/// Render `created_ms` as an ISO-8601 UTC timestamp (`YYYY-MM-DDTHH:MM:SSZ`)
/// for CSV export.
pub fn iso8601_utc(ms: i64) -> String {
    let secs = ms.div_euclid(1000);
    let days = secs.div_euclid(86_400);
    let tod = secs.rem_euclid(86_400);
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}Z",
        tod / 3600,
        (tod % 3600) / 60,
        tod % 60
    )
}

// Howard Hinnant's days-to-civil algorithm.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}
