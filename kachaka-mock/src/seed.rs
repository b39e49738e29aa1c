//! Initial values for the map-related resources.
//!
//! Seed files are JSON in the robot's camelCase export format, so dumps
//! taken from a real robot can be dropped into the seed directory as-is.
//! Binary map data is base64 in JSON.

use kachaka_types::{Location, PngMap, Pose, Shelf};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Seed file for the robot pose.
pub const POSE_FILE: &str = "pose.json";
/// Seed file for registered locations.
pub const LOCATIONS_FILE: &str = "locations.json";
/// Seed file for registered shelves.
pub const SHELVES_FILE: &str = "shelves.json";
/// Seed file for the occupancy map.
pub const PNG_MAP_FILE: &str = "png_map.json";

/// Initial pose, map, locations and shelves.
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    /// Robot pose.
    pub pose: Pose,
    /// Registered locations.
    pub locations: Vec<Location>,
    /// Registered shelves.
    pub shelves: Vec<Shelf>,
    /// Occupancy map.
    pub png_map: PngMap,
}

impl Default for Seed {
    fn default() -> Self {
        Self {
            pose: Pose::default(),
            locations: vec![
                Location {
                    id: "L01".to_string(),
                    name: "Kitchen".to_string(),
                    pose: Pose {
                        x: 2.0,
                        y: 1.5,
                        theta: 0.0,
                    },
                },
                Location {
                    id: "L02".to_string(),
                    name: "Living room".to_string(),
                    pose: Pose {
                        x: -1.0,
                        y: 3.0,
                        theta: std::f64::consts::FRAC_PI_2,
                    },
                },
            ],
            shelves: vec![Shelf {
                id: "S01".to_string(),
                name: "Snack shelf".to_string(),
                home_location_id: "L01".to_string(),
            }],
            png_map: PngMap {
                name: "default".to_string(),
                resolution: 0.05,
                ..PngMap::default()
            },
        }
    }
}

impl Seed {
    /// Load seed files from `dir`.
    ///
    /// A missing file keeps the built-in value; a file that exists but does
    /// not parse is an error.
    pub fn load(dir: &Path) -> Result<Self, SeedError> {
        let defaults = Seed::default();
        Ok(Self {
            pose: load_or(dir, POSE_FILE, defaults.pose)?,
            locations: load_or(dir, LOCATIONS_FILE, defaults.locations)?,
            shelves: load_or(dir, SHELVES_FILE, defaults.shelves)?,
            png_map: load_or(dir, PNG_MAP_FILE, defaults.png_map)?,
        })
    }
}

fn load_or<T: DeserializeOwned>(dir: &Path, name: &str, fallback: T) -> Result<T, SeedError> {
    let path = dir.join(name);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "seed file absent, using built-in value");
            return Ok(fallback);
        }
        Err(e) => return Err(SeedError::ReadError { path, source: e }),
    };

    let value = serde_json::from_str(&content).map_err(|e| SeedError::ParseError {
        path: path.clone(),
        source: e,
    })?;
    tracing::info!(path = %path.display(), "loaded seed file");
    Ok(value)
}

/// Seed loading errors.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// Failed to read a seed file.
    #[error("failed to read seed file {path}: {source}")]
    ReadError {
        /// Path to the seed file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse a seed file.
    #[error("failed to parse seed file {path}: {source}")]
    ParseError {
        /// Path to the seed file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directory_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Seed::load(dir.path()).unwrap(), Seed::default());
    }

    #[test]
    fn files_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(POSE_FILE),
            r#"{"x": 1.25, "y": -0.5, "theta": 3.0}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(SHELVES_FILE),
            r#"[{"id": "S9", "name": "Books", "homeLocationId": "L7"}]"#,
        )
        .unwrap();

        let seed = Seed::load(dir.path()).unwrap();
        assert_eq!(
            seed.pose,
            Pose {
                x: 1.25,
                y: -0.5,
                theta: 3.0
            }
        );
        assert_eq!(seed.shelves.len(), 1);
        assert_eq!(seed.shelves[0].home_location_id, "L7");
        // Untouched files keep the built-in values
        assert_eq!(seed.locations, Seed::default().locations);
    }

    #[test]
    fn png_map_data_is_base64() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PNG_MAP_FILE),
            r#"{"data": "iVBORw==", "name": "floor1", "resolution": 0.05, "width": 2, "height": 3}"#,
        )
        .unwrap();

        let seed = Seed::load(dir.path()).unwrap();
        assert_eq!(seed.png_map.data, vec![0x89, b'P', b'N', b'G']);
        assert_eq!(seed.png_map.name, "floor1");
        assert_eq!(seed.png_map.height, 3);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCATIONS_FILE), "[{").unwrap();

        let err = Seed::load(dir.path()).unwrap_err();
        assert!(matches!(err, SeedError::ParseError { .. }));
        assert!(err.to_string().contains(LOCATIONS_FILE));
    }
}
