// src/recorder.rs
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::drivers::{SaveError, Sample};

pub const HEADER: &str = "Time(s), Raw Voltage(V), Filtered Voltage(V)";
const SEPARATOR: &str = ", ";

/// `datos` -> `datos.txt`. The extension is always appended.
pub fn output_path(base: &str) -> PathBuf {
    PathBuf::from(format!("{}.txt", base.trim()))
}

/// Writes the capture as comma-space separated text. Returns the number of rows written.
pub fn save_samples(samples: &[Sample], path: &Path) -> Result<usize, SaveError> {
    if samples.is_empty() {
        log::warn!("Save requested with no samples; {} not written", path.display());
        return Err(SaveError::EmptyStore);
    }
    let io_err = |source| SaveError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut w = BufWriter::new(file);
    writeln!(w, "{HEADER}").map_err(io_err)?;
    for s in samples {
        // Display for f64 is the shortest string that parses back exactly
        writeln!(w, "{}{SEPARATOR}{}{SEPARATOR}{}", s.timestamp, s.raw, s.filtered)
            .map_err(io_err)?;
    }
    w.flush().map_err(io_err)?;
    log::info!("Saved {} samples to {}", samples.len(), path.display());
    Ok(samples.len())
}

/// Reads a file written by [`save_samples`]. Rows that don't hold three numbers are skipped.
#[cfg(test)]
pub fn load_samples(path: &Path) -> std::io::Result<Vec<Sample>> {
    use std::io::{BufRead, BufReader};

    let reader = BufReader::new(File::open(path)?);
    let mut samples = Vec::new();
    for line in reader.lines().skip(1) {
        let line = line?;
        let cols: Vec<f64> = line
            .split(SEPARATOR)
            .filter_map(|c| c.trim().parse().ok())
            .collect();
        if let &[t, raw, filtered] = cols.as_slice() {
            samples.push(Sample::new(t, raw, filtered));
        }
    }
    Ok(samples)
}
