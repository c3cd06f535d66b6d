//! The pixel-to-energy-point map collaborator (§6): a read-only lookup
//! from `(chip, flat_pixel)` to the list of `(energy_point, weight)`
//! contributions a hit at that pixel makes, loaded from either a JSON
//! document or a CSV-like text form. The core never writes this map.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
struct PixelMapEntryJson {
    i: u32,
    p: Vec<u32>,
    f: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PixelMapJson {
    chips: Vec<Vec<PixelMapEntryJson>>,
}

/// Read-only pixel -> (energy-point, weight) lookup table.
#[derive(Debug, Clone, Default)]
pub struct PixelMap {
    n_energy_points: usize,
    entries: HashMap<(u8, u32), Vec<(u32, f64)>>,
}

impl PixelMap {
    /// Builds an empty map reporting `n_energy_points` energy points.
    #[must_use]
    pub fn empty(n_energy_points: usize) -> Self {
        Self {
            n_energy_points,
            entries: HashMap::new(),
        }
    }

    /// Energy-point count spanned by the map.
    #[must_use]
    pub fn n_energy_points(&self) -> usize {
        self.n_energy_points
    }

    /// The contributions a hit at `(chip, flat_pixel)` makes, or an
    /// empty slice if the pixel has none.
    #[must_use]
    pub fn lookup(&self, chip: u8, flat_pixel: u32) -> &[(u32, f64)] {
        self.entries
            .get(&(chip, flat_pixel))
            .map_or(&[], Vec::as_slice)
    }

    /// Parses the JSON form:
    /// `{"chips":[[{"i":flat_idx,"p":[eps...],"f":[weights...]}, ...], ...]}`.
    ///
    /// # Errors
    /// Returns an error if `text` does not parse as the expected shape.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let parsed: PixelMapJson = serde_json::from_str(text)?;
        let mut entries = HashMap::new();
        let mut n_energy_points = 0u32;
        for (chip_idx, chip_entries) in parsed.chips.iter().enumerate() {
            let chip = chip_idx as u8;
            for entry in chip_entries {
                let contributions: Vec<(u32, f64)> = entry
                    .p
                    .iter()
                    .zip(entry.f.iter())
                    .map(|(&ep, &w)| {
                        n_energy_points = n_energy_points.max(ep + 1);
                        (ep, w)
                    })
                    .collect();
                entries.insert((chip, entry.i), contributions);
            }
        }
        Ok(Self {
            n_energy_points: n_energy_points as usize,
            entries,
        })
    }

    /// Loads and parses a JSON pixel map from `path`.
    ///
    /// # Errors
    /// Returns an error on I/O failure or malformed JSON.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parses the CSV-like text form: one row per pixel,
    /// `chip, flat_pixel, ep0, ..., epK, w0, ..., wK`. The row width may
    /// vary (`K` need not be constant across rows); blank lines and
    /// lines starting with `#` are skipped.
    ///
    /// # Errors
    /// Returns [`Error::PixelMapCsv`] if a row has an odd number of
    /// energy-point/weight fields or fails to parse as numbers.
    pub fn from_csv_str(text: &str) -> Result<Self> {
        let mut entries = HashMap::new();
        let mut n_energy_points = 0u32;
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 2 {
                return Err(Error::PixelMapCsv(format!(
                    "line {}: expected at least chip, flat_pixel",
                    line_no + 1
                )));
            }
            let chip: u8 = fields[0]
                .parse()
                .map_err(|_| Error::PixelMapCsv(format!("line {}: bad chip field", line_no + 1)))?;
            let flat_pixel: u32 = fields[1].parse().map_err(|_| {
                Error::PixelMapCsv(format!("line {}: bad flat_pixel field", line_no + 1))
            })?;
            let rest = &fields[2..];
            if rest.len() % 2 != 0 {
                return Err(Error::PixelMapCsv(format!(
                    "line {}: energy-point/weight fields must pair up",
                    line_no + 1
                )));
            }
            let k = rest.len() / 2;
            let mut contributions = Vec::with_capacity(k);
            for i in 0..k {
                let ep: u32 = rest[i].parse().map_err(|_| {
                    Error::PixelMapCsv(format!("line {}: bad energy-point field", line_no + 1))
                })?;
                let w: f64 = rest[k + i].parse().map_err(|_| {
                    Error::PixelMapCsv(format!("line {}: bad weight field", line_no + 1))
                })?;
                n_energy_points = n_energy_points.max(ep + 1);
                contributions.push((ep, w));
            }
            entries.insert((chip, flat_pixel), contributions);
        }
        Ok(Self {
            n_energy_points: n_energy_points as usize,
            entries,
        })
    }

    /// Loads and parses a CSV pixel map from `path`.
    ///
    /// # Errors
    /// Returns an error on I/O failure or a malformed row.
    pub fn from_csv_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_csv_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_form() {
        let json = r#"{"chips":[[{"i":10,"p":[0,1],"f":[0.75,0.25]}]]}"#;
        let map = PixelMap::from_json_str(json).unwrap();
        assert_eq!(map.lookup(0, 10), &[(0, 0.75), (1, 0.25)]);
        assert_eq!(map.n_energy_points(), 2);
    }

    #[test]
    fn missing_pixel_returns_empty() {
        let map = PixelMap::from_json_str(r#"{"chips":[[]]}"#).unwrap();
        assert!(map.lookup(0, 5).is_empty());
    }

    #[test]
    fn parses_csv_form_with_variable_width_rows() {
        let csv = "# comment\n0, 10, 0, 1, 0.75, 0.25\n1, 20, 2, 0.5\n";
        let map = PixelMap::from_csv_str(csv).unwrap();
        assert_eq!(map.lookup(0, 10), &[(0, 0.75), (1, 0.25)]);
        assert_eq!(map.lookup(1, 20), &[(2, 0.5)]);
        assert_eq!(map.n_energy_points(), 3);
    }

    #[test]
    fn csv_rejects_unpaired_fields() {
        let csv = "0, 10, 0, 1, 0.75\n";
        assert!(PixelMap::from_csv_str(csv).is_err());
    }
}
