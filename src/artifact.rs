//! On-disk artifacts with stable names.
//!
//! Every intermediate the pipeline persists (seed disparity, spread,
//! homography grid, final disparity) lives under one output prefix so reruns
//! can reuse it. Loads come in two flavors: `load` surfaces failures as
//! unrecoverable I/O errors, `try_load` treats a missing or corrupt file as
//! absent, which is the contract for cache reuse.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use nalgebra::Matrix3;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::util::{SeedResult, StereoSeedError};

/// Output prefix and the artifact names derived from it.
#[derive(Clone, Debug)]
pub struct Workspace {
    prefix: PathBuf,
}

impl Workspace {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn suffixed(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .prefix
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.prefix.with_file_name(name)
    }

    /// Low-resolution seed disparity field.
    pub fn seed_disparity(&self) -> PathBuf {
        self.suffixed("-D_sub.json")
    }

    /// Per-cell uncertainty radius accompanying the seed.
    pub fn seed_spread(&self) -> PathBuf {
        self.suffixed("-D_sub_spread.json")
    }

    /// Per-tile homography grid.
    pub fn local_homographies(&self) -> PathBuf {
        self.suffixed("-local_hom.json")
    }

    /// Final full-resolution disparity field.
    pub fn full_disparity(&self) -> PathBuf {
        self.suffixed("-D.json")
    }

    /// Matched feature points from the interest-point collaborator.
    pub fn match_points(&self) -> PathBuf {
        self.suffixed("-matches.json")
    }

    pub fn align_left(&self) -> PathBuf {
        self.suffixed("-align-L.json")
    }

    pub fn align_right(&self) -> PathBuf {
        self.suffixed("-align-R.json")
    }
}

/// Serializes `value` as JSON at `path`, creating parent directories.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> SeedResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| StereoSeedError::ArtifactIo {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
    }
    let file = File::create(path).map_err(|e| StereoSeedError::ArtifactIo {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::to_writer(BufWriter::new(file), value).map_err(|e| {
        StereoSeedError::ArtifactIo {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })
}

/// Strict load; any failure is surfaced as an artifact I/O error.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> SeedResult<T> {
    let file = File::open(path).map_err(|e| StereoSeedError::ArtifactIo {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| StereoSeedError::ArtifactIo {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Recoverable load: a missing or corrupt artifact reads as `None` so the
/// caller recomputes instead of failing.
pub fn try_load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let file = File::open(path).ok()?;
    serde_json::from_reader(BufReader::new(file)).ok()
}

/// Matched feature-point pairs `(left, right)` in full-resolution pixel
/// coordinates, as written by the interest-point collaborator.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MatchPoints {
    pub left: Vec<[f64; 2]>,
    pub right: Vec<[f64; 2]>,
}

/// Loads an optional 3x3 alignment transform; identity when absent.
pub fn load_alignment(path: &Path) -> Matrix3<f64> {
    try_load_json::<Matrix3<f64>>(path).unwrap_or_else(Matrix3::identity)
}
