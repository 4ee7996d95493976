use rollcall_core::Roster;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("roster file unreadable: {}: {source}", .path.display())]
    RosterRead { path: PathBuf, source: std::io::Error },
    #[error("roster file invalid: {}: {source}", .path.display())]
    RosterParse { path: PathBuf, source: toml::de::Error },
}

/// Daemon configuration, loaded from `ROLLCALL_*` environment variables.
pub struct Config {
    /// Directory of reference images; the file stem names the identity.
    pub image_dir: PathBuf,
    /// TOML table mapping identity names to roll numbers.
    pub roster_path: PathBuf,
    /// Descriptor cache artifact.
    pub cache_path: PathBuf,
    /// Directory receiving the per-session attendance CSV files.
    pub log_dir: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// V4L2 device index.
    pub camera_index: u32,
    /// Downscale factor applied before detection.
    pub frame_scale: f32,
    /// Maximum descriptor distance for an accepted match.
    pub tolerance: f32,
    /// Analyze every Nth frame.
    pub detect_every: u64,
    /// Wall-clock interval between periodic log flushes.
    pub flush_interval: Duration,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let data_dir = data_dir().join("rollcall");

        Self {
            image_dir: env_path("ROLLCALL_IMAGE_DIR", "student_images"),
            roster_path: env_path("ROLLCALL_ROSTER", "roster.toml"),
            cache_path: std::env::var("ROLLCALL_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("descriptors.bin")),
            log_dir: env_path("ROLLCALL_LOG_DIR", "."),
            model_dir: std::env::var("ROLLCALL_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("models")),
            camera_index: env_u32("ROLLCALL_CAMERA_INDEX", 0),
            frame_scale: env_f32("ROLLCALL_FRAME_SCALE", 0.25),
            tolerance: env_f32("ROLLCALL_TOLERANCE", 0.5),
            detect_every: env_u64("ROLLCALL_DETECT_EVERY", 2),
            flush_interval: Duration::from_secs(env_u64("ROLLCALL_FLUSH_INTERVAL_SECS", 30)),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the descriptor encoding model.
    pub fn encoder_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

/// Parse the identity → roll number table. A missing or malformed file is
/// a fatal configuration error; names absent from the table are still
/// recognized, with no roll number.
pub fn load_roster(path: &Path) -> Result<Roster, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::RosterRead {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::RosterParse {
        path: path.to_path_buf(),
        source,
    })
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_roster() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Jafir = 3").unwrap();
        writeln!(file, "Hasib = 10").unwrap();
        writeln!(file, "\"Md.Sanzis Hasnat\" = 26").unwrap();

        let roster = load_roster(&path).unwrap();
        assert_eq!(roster.len(), 3);
        assert_eq!(roster.get("Jafir"), Some(&3));
        assert_eq!(roster.get("Md.Sanzis Hasnat"), Some(&26));
        assert_eq!(roster.get("Absent"), None);
    }

    #[test]
    fn test_load_roster_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_roster(&dir.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::RosterRead { .. })));
    }

    #[test]
    fn test_load_roster_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.toml");
        std::fs::write(&path, "Jafir = \"not a number\"").unwrap();
        let result = load_roster(&path);
        assert!(matches!(result, Err(ConfigError::RosterParse { .. })));
    }
}
