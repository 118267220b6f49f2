//! Export the simulated dataset to CSV.
//!
//! One row per student, columns in dataset order. Easy to load into a
//! spreadsheet or a dataframe library for a second opinion on the fits.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::Dataset;
use crate::error::AppError;

/// Write the dataset to a CSV file.
pub fn write_dataset_csv(path: &Path, data: &Dataset) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create data CSV '{}': {e}", path.display())))?;
    let mut out = BufWriter::new(file);

    writeln!(out, "{}", Dataset::COLUMNS.join(","))
        .map_err(|e| AppError::new(2, format!("Failed to write data CSV header: {e}")))?;

    for obs in data.rows() {
        writeln!(
            out,
            "{},{},{},{}",
            obs.test_scores, obs.hours_studying, obs.school, obs.air_quality
        )
        .map_err(|e| AppError::new(2, format!("Failed to write data CSV row: {e}")))?;
    }

    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush data CSV: {e}")))?;

    tracing::info!(path = %path.display(), rows = data.len(), "wrote data CSV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;

    #[test]
    fn writes_header_and_rows() {
        let mut data = Dataset::default();
        data.push(Observation {
            test_scores: 12.5,
            hours_studying: 3.0,
            school: 1,
            air_quality: 7.0,
        });
        data.push(Observation {
            test_scores: -1.0,
            hours_studying: 0.0,
            school: 0,
            air_quality: 10.0,
        });

        let path = std::env::temp_dir().join(format!("schoolfx-data-{}.csv", std::process::id()));
        write_dataset_csv(&path, &data).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], Dataset::COLUMNS.join(","));
        assert_eq!(lines[1], "12.5,3,1,7");
        assert_eq!(lines[2], "-1,0,0,10");
    }

    #[test]
    fn unwritable_path_is_an_input_error() {
        let path = std::env::temp_dir().join("schoolfx-missing-dir").join("nested").join("data.csv");
        let err = write_dataset_csv(&path, &Dataset::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
