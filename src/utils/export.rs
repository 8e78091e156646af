//! CSV export of control-loop logs.
//!
//! Writes one file per session into the configured export directory:
//! `<dir>/loop_log_<label>.csv` with a header row and one row per logged tick.

use std::{
    fs::{File, create_dir_all},
    io::BufWriter,
    path::{Path, PathBuf},
};

use log::info;

use crate::scheduler::data_logger::{LogRow, write_rows_csv};

/// Export `rows` to `<dir>/loop_log_<label>.csv`. Returns the written path.
pub fn export_log_csv(dir: &Path, label: &str, rows: &[LogRow]) -> Result<PathBuf, csv::Error> {
    create_dir_all(dir)?;

    let path = dir.join(format!("loop_log_{}.csv", sanitize(label)));
    let writer = BufWriter::new(File::create(&path)?);
    write_rows_csv(rows, writer)?;

    info!("[Export] {} rows written to {}", rows.len(), path.display());
    Ok(path)
}

// Peer addresses contain ':' and '.', which some filesystems reject.
fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let rows = [
            LogRow { timestamp: 0.01, ..LogRow::default() },
            LogRow { timestamp: 0.02, ..LogRow::default() },
        ];
        let path = export_log_csv(dir.path(), "127.0.0.1:9999", &rows).unwrap();
        assert_eq!(path.file_name().unwrap(), "loop_log_127_0_0_1_9999.csv");

        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("timestamp,"));
    }
}
