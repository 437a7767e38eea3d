//! Pipeline configuration.
//!
//! Built once at process start and shared by `Arc` with every component.
//! Nothing in the pipeline reads the environment after construction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::identifiers::{MaskKey, DEFAULT_PID_MASK};
use crate::redact::PathRedactor;
use crate::results::table::ScoreColumn;
use crate::results::thumbnail::ThumbnailMode;

/// Default time a finished job stays queryable.
pub const DEFAULT_JOB_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Error raised when an environment variable holds an unusable value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Immutable configuration for the job pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Installation root. Program, build files, and sample data live here.
    pub install_root: PathBuf,
    /// Root under which one workspace per job is created.
    pub upload_root: PathBuf,
    /// Path to the external analysis program.
    pub program: PathBuf,
    /// Optional interpreter placed before `program` in the argument vector.
    pub interpreter: Option<PathBuf>,
    /// Directory containing genome build files.
    pub builds_dir: PathBuf,
    /// Directory containing bundled sample inputs.
    pub sample_dir: PathBuf,
    /// Value of the fixed `--cores=` flag.
    pub cores: u32,
    /// Maximum number of external processes running at once.
    pub pool_size: usize,
    /// Jobs admitted beyond `pool_size` that wait for a free slot.
    pub queue_depth: usize,
    /// How missing thumbnails are generated.
    pub thumbnail_mode: ThumbnailMode,
    /// Column used to rank rows when picking per-group and headline maxima.
    pub score_column: ScoreColumn,
    /// Key used to mask process ids before they leave the service.
    pub pid_mask: MaskKey,
    /// Exit code the external program uses to report unusable input.
    pub bad_input_exit_code: i32,
    /// How long a finished job's record is kept in memory.
    pub job_retention: Duration,
}

impl PipelineConfig {
    /// Default configuration rooted at `install_root`.
    ///
    /// Every derived path sits under the installation root; tests use this
    /// with a temporary directory.
    pub fn rooted_at(install_root: impl Into<PathBuf>) -> Self {
        let install_root = install_root.into();
        Self {
            upload_root: install_root.join("upload"),
            program: install_root.join("triPOD.pl"),
            interpreter: Some(PathBuf::from("perl")),
            builds_dir: install_root.join("builds"),
            sample_dir: install_root.join("sample"),
            cores: 2,
            pool_size: 2,
            queue_depth: 0,
            thumbnail_mode: ThumbnailMode::default(),
            score_column: ScoreColumn::default(),
            pid_mask: DEFAULT_PID_MASK,
            bad_input_exit_code: 3,
            job_retention: DEFAULT_JOB_RETENTION,
            install_root,
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                 |
    /// |------------------------------|-------------------------|
    /// | `TRIPOD_INSTALL_ROOT`        | `/opt/tripod`           |
    /// | `TRIPOD_UPLOAD_ROOT`         | `<install>/upload`      |
    /// | `TRIPOD_PROGRAM`             | `<install>/triPOD.pl`   |
    /// | `TRIPOD_INTERPRETER`         | `perl` (empty = none)   |
    /// | `TRIPOD_BUILDS_DIR`          | `<install>/builds`      |
    /// | `TRIPOD_SAMPLE_DIR`          | `<install>/sample`      |
    /// | `TRIPOD_CORES`               | `2`                     |
    /// | `TRIPOD_POOL_SIZE`           | `2`                     |
    /// | `TRIPOD_QUEUE_DEPTH`         | `0`                     |
    /// | `TRIPOD_THUMBNAIL_MODE`      | `fit:640x480`           |
    /// | `TRIPOD_SCORE_COLUMN`        | `Score`, else column 8  |
    /// | `TRIPOD_MASK_K1`             | `7919`                  |
    /// | `TRIPOD_MASK_K2`             | `104729`                |
    /// | `TRIPOD_BAD_INPUT_EXIT_CODE` | `3`                     |
    /// | `TRIPOD_JOB_RETENTION_SECS`  | `86400`                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let install_root = PathBuf::from(
            lookup("TRIPOD_INSTALL_ROOT").unwrap_or_else(|| "/opt/tripod".into()),
        );
        let mut config = Self::rooted_at(&install_root);

        if let Some(v) = lookup("TRIPOD_UPLOAD_ROOT") {
            config.upload_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("TRIPOD_PROGRAM") {
            config.program = PathBuf::from(v);
        }
        if let Some(v) = lookup("TRIPOD_INTERPRETER") {
            config.interpreter = (!v.trim().is_empty()).then(|| PathBuf::from(v));
        }
        if let Some(v) = lookup("TRIPOD_BUILDS_DIR") {
            config.builds_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TRIPOD_SAMPLE_DIR") {
            config.sample_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TRIPOD_CORES") {
            config.cores = parse_var("TRIPOD_CORES", &v)?;
        }
        if let Some(v) = lookup("TRIPOD_POOL_SIZE") {
            config.pool_size = parse_var("TRIPOD_POOL_SIZE", &v)?;
            if config.pool_size == 0 {
                return Err(invalid("TRIPOD_POOL_SIZE", &v, "must be at least 1"));
            }
        }
        if let Some(v) = lookup("TRIPOD_QUEUE_DEPTH") {
            config.queue_depth = parse_var("TRIPOD_QUEUE_DEPTH", &v)?;
        }
        if let Some(v) = lookup("TRIPOD_THUMBNAIL_MODE") {
            config.thumbnail_mode = v
                .parse()
                .map_err(|reason| invalid("TRIPOD_THUMBNAIL_MODE", &v, reason))?;
        }
        if let Some(v) = lookup("TRIPOD_SCORE_COLUMN") {
            config.score_column = ScoreColumn::from_config(&v);
        }
        let k1 = match lookup("TRIPOD_MASK_K1") {
            Some(v) => parse_var("TRIPOD_MASK_K1", &v)?,
            None => DEFAULT_PID_MASK.k1(),
        };
        let k2 = match lookup("TRIPOD_MASK_K2") {
            Some(v) => parse_var("TRIPOD_MASK_K2", &v)?,
            None => DEFAULT_PID_MASK.k2(),
        };
        config.pid_mask =
            MaskKey::new(k1, k2).map_err(|e| invalid("TRIPOD_MASK_K1", &k1.to_string(), e))?;
        if let Some(v) = lookup("TRIPOD_BAD_INPUT_EXIT_CODE") {
            config.bad_input_exit_code = parse_var("TRIPOD_BAD_INPUT_EXIT_CODE", &v)?;
        }
        if let Some(v) = lookup("TRIPOD_JOB_RETENTION_SECS") {
            config.job_retention = Duration::from_secs(parse_var("TRIPOD_JOB_RETENTION_SECS", &v)?);
        }

        Ok(config)
    }

    /// Roots that every path embedded in an argument vector must stay inside.
    pub fn allowed_roots(&self) -> [&Path; 2] {
        [self.install_root.as_path(), self.upload_root.as_path()]
    }

    /// Redactor for the installation and upload roots.
    pub fn path_redactor(&self) -> PathRedactor {
        PathRedactor::new([&self.install_root, &self.upload_root])
    }

    /// Workspace directory for a job token. Recomputed, never stored.
    pub fn workspace_dir(&self, token: &crate::identifiers::JobToken) -> PathBuf {
        self.upload_root.join(token.as_str())
    }
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| invalid(var, value, e))
}

fn invalid(var: &'static str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
