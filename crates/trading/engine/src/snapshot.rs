//! Daily-init snapshot: carry-over position and spread baseline
//!
//! Whitespace-separated text, one header line naming the columns and one
//! or more data lines keyed by strategy ID in the first column.

use crate::error::SnapshotError;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

const HEADER: &str = "StrategyID 2day avgPx m_origbaseName1 m_origbaseName2 ytd1 ytd2 ";

/// Written in place of an empty base name so columns stay aligned
const EMPTY_NAME: &str = "-";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DailyInit {
    pub strategy_id: i32,
    pub netpos_2day: i64,
    /// Running average-spread baseline
    pub avg_spread: f64,
    pub orig_base_name1: String,
    pub orig_base_name2: String,
    /// Carry-over passive position of the first leg
    pub netpos_ytd1: i64,
    pub netpos_ytd2: i64,
}

/// `<dir>/daily_init.<strategy_id>`
#[must_use]
pub fn snapshot_path(dir: &Path, strategy_id: i32) -> PathBuf {
    dir.join(format!("daily_init.{strategy_id}"))
}

impl DailyInit {
    /// Load the row for `strategy_id`; a missing file is a zero record
    pub fn load(path: &Path, strategy_id: i32) -> Result<Self, SnapshotError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no snapshot, starting flat");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SnapshotError::Io { path: path.to_path_buf(), source });
            }
        };

        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let (Some(header), Some(first)) = (lines.next(), lines.next()) else {
            return Err(SnapshotError::Truncated(path.to_path_buf()));
        };
        let columns: Vec<&str> = header.split_whitespace().collect();

        for line in std::iter::once(first).chain(lines) {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.first().and_then(|t| t.parse::<i32>().ok()) != Some(strategy_id) {
                continue;
            }
            let row: HashMap<&str, &str> = columns.iter().copied().zip(tokens.iter().copied()).collect();
            let name = |column: &str| {
                row.get(column)
                    .filter(|v| **v != EMPTY_NAME)
                    .map(|v| (*v).to_string())
                    .unwrap_or_default()
            };

            let snapshot = Self {
                strategy_id,
                netpos_2day: parse_column(path, &row, "2day")?,
                avg_spread: parse_column(path, &row, "avgPx")?,
                orig_base_name1: name("m_origbaseName1"),
                orig_base_name2: name("m_origbaseName2"),
                netpos_ytd1: parse_column(path, &row, "ytd1")?,
                netpos_ytd2: parse_column(path, &row, "ytd2")?,
            };
            info!(
                path = %path.display(),
                strategy_id,
                ytd1 = snapshot.netpos_ytd1,
                avg_spread = snapshot.avg_spread,
                "snapshot loaded"
            );
            return Ok(snapshot);
        }
        Err(SnapshotError::StrategyNotFound { path: path.to_path_buf(), strategy_id })
    }

    /// Rewrite the file with this record; `2day` is always written as 0
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let or_dash = |s: &str| if s.is_empty() { EMPTY_NAME.to_string() } else { s.to_string() };
        let mut out = String::with_capacity(128);
        let _ = writeln!(out, "{HEADER}");
        let _ = writeln!(
            out,
            "{} 0 {:.6} {} {} {} {}",
            self.strategy_id,
            self.avg_spread,
            or_dash(&self.orig_base_name1),
            or_dash(&self.orig_base_name2),
            self.netpos_ytd1,
            self.netpos_ytd2,
        );
        fs::write(path, out).map_err(|source| SnapshotError::Io { path: path.to_path_buf(), source })?;
        info!(path = %path.display(), strategy_id = self.strategy_id, ytd1 = self.netpos_ytd1, "snapshot saved");
        Ok(())
    }
}

/// Absent columns read as zero
fn parse_column<T: FromStr + Default>(
    path: &Path,
    row: &HashMap<&str, &str>,
    column: &'static str,
) -> Result<T, SnapshotError> {
    match row.get(column) {
        None => Ok(T::default()),
        Some(raw) => raw.parse().map_err(|_| SnapshotError::BadValue {
            path: path.to_path_buf(),
            column,
            value: (*raw).to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_missing_file_is_zero() -> TestResult {
        let dir = tempfile::tempdir()?;
        let snap = DailyInit::load(&snapshot_path(dir.path(), 92201), 92201)?;
        assert_eq!(snap, DailyInit::default());
        Ok(())
    }

    #[test]
    fn test_save_then_load() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = snapshot_path(dir.path(), 92201);
        let snap = DailyInit {
            strategy_id: 92201,
            netpos_2day: 0,
            avg_spread: 10.123457,
            orig_base_name1: "ag2506".into(),
            orig_base_name2: "ag2508".into(),
            netpos_ytd1: 5,
            netpos_ytd2: -3,
        };
        snap.save(&path)?;

        let text = fs::read_to_string(&path)?;
        assert_eq!(
            text,
            "StrategyID 2day avgPx m_origbaseName1 m_origbaseName2 ytd1 ytd2 \n\
             92201 0 10.123457 ag2506 ag2508 5 -3\n"
        );
        assert_eq!(DailyInit::load(&path, 92201)?, snap);
        Ok(())
    }

    #[test]
    fn test_picks_matching_row_by_header() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("daily_init.multi");
        fs::write(
            &path,
            "StrategyID ytd1 avgPx\n\n11 4 1.5\n22 -7 2.25\n",
        )?;
        let snap = DailyInit::load(&path, 22)?;
        assert_eq!(snap.netpos_ytd1, -7);
        assert_eq!(snap.avg_spread, 2.25);
        assert_eq!(snap.netpos_ytd2, 0);
        Ok(())
    }

    #[test]
    fn test_errors() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("daily_init.1");

        fs::write(&path, "StrategyID 2day avgPx\n")?;
        assert!(matches!(DailyInit::load(&path, 1), Err(SnapshotError::Truncated(_))));

        fs::write(&path, "StrategyID ytd1\n2 3\n")?;
        assert!(matches!(
            DailyInit::load(&path, 1),
            Err(SnapshotError::StrategyNotFound { strategy_id: 1, .. })
        ));

        fs::write(&path, "StrategyID ytd1\n1 lots\n")?;
        assert!(matches!(
            DailyInit::load(&path, 1),
            Err(SnapshotError::BadValue { column: "ytd1", .. })
        ));
        Ok(())
    }

    #[test]
    fn test_empty_names_round_trip() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = snapshot_path(dir.path(), 7);
        let snap = DailyInit { strategy_id: 7, netpos_ytd1: 2, ..DailyInit::default() };
        snap.save(&path)?;
        assert_eq!(DailyInit::load(&path, 7)?, snap);
        Ok(())
    }
}
