//! Argument vector construction for the external analysis program.
//!
//! Parameters arrive as loosely typed form values, are validated into
//! [`AnalysisParams`], and are then rendered into an [`ArgumentVector`].
//! The vector is executed directly (never through a shell), and every path
//! it embeds must stay inside the configured installation or upload root.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::ValidationError;

/// Suffix shared by all genome build files.
pub const BUILD_FILE_SUFFIX: &str = "_centromeres.txt";

/// Build used when the caller does not pick one.
pub const DEFAULT_BUILD: &str = "hg18_centromeres.txt";

/// Significance level used when the caller does not pick one.
pub const DEFAULT_ALPHA: f64 = 0.1;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Sample gender passed to the analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[default]
    #[serde(rename = "NA")]
    Unknown,
}

impl Gender {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.trim() {
            "M" | "m" => Ok(Self::Male),
            "F" | "f" => Ok(Self::Female),
            "NA" | "na" | "" => Ok(Self::Unknown),
            other => Err(ValidationError::InvalidParameter {
                name: "gender",
                value: other.to_string(),
            }),
        }
    }

    pub fn as_flag_value(self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
            Self::Unknown => "NA",
        }
    }
}

/// The four detection methods. At least one must be enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionMethods {
    pub pod: bool,
    pub hd: bool,
    pub mi1: bool,
    pub podcr: bool,
}

impl Default for DetectionMethods {
    fn default() -> Self {
        Self {
            pod: true,
            hd: false,
            mi1: false,
            podcr: false,
        }
    }
}

impl DetectionMethods {
    pub fn any_enabled(&self) -> bool {
        self.pod || self.hd || self.mi1 || self.podcr
    }

    /// One `--x` / `--nox` token per method, in a fixed order.
    fn flags(&self) -> [&'static str; 4] {
        [
            if self.pod { "--pod" } else { "--nopod" },
            if self.hd { "--hd" } else { "--nohd" },
            if self.mi1 { "--mi1" } else { "--nomi1" },
            if self.podcr { "--podcr" } else { "--nopodcr" },
        ]
    }
}

/// Validated analysis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub gender: Gender,
    pub alpha: f64,
    /// Build file name, always ending in [`BUILD_FILE_SUFFIX`].
    pub build: String,
    pub methods: DetectionMethods,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            gender: Gender::default(),
            alpha: DEFAULT_ALPHA,
            build: DEFAULT_BUILD.to_string(),
            methods: DetectionMethods::default(),
        }
    }
}

impl AnalysisParams {
    /// Parse an alpha value; must be a finite decimal in `(0, 1]`.
    pub fn parse_alpha(value: &str) -> Result<f64, ValidationError> {
        let invalid = || ValidationError::InvalidParameter {
            name: "alpha",
            value: value.to_string(),
        };
        let alpha: f64 = value.trim().parse().map_err(|_| invalid())?;
        if alpha.is_finite() && alpha > 0.0 && alpha <= 1.0 {
            Ok(alpha)
        } else {
            Err(invalid())
        }
    }

    /// Normalise a build selection to its file name.
    ///
    /// Accepts either `hg19` or `hg19_centromeres.txt`. Only ASCII
    /// alphanumerics are allowed in the build name.
    pub fn parse_build(value: &str) -> Result<String, ValidationError> {
        let value = value.trim();
        let name = value.strip_suffix(BUILD_FILE_SUFFIX).unwrap_or(value);
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidParameter {
                name: "build",
                value: value.to_string(),
            });
        }
        Ok(format!("{name}{BUILD_FILE_SUFFIX}"))
    }

    /// Short build label, e.g. `hg18` for `hg18_centromeres.txt`.
    pub fn build_label(&self) -> &str {
        build_label(&self.build)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.methods.any_enabled() {
            return Err(ValidationError::NoDetectionMethodSelected);
        }
        Self::parse_alpha(&self.alpha.to_string())?;
        Self::parse_build(&self.build)?;
        Ok(())
    }
}

/// Build label for a build file name: everything before the first `_`.
pub fn build_label(build_file: &str) -> &str {
    let name = Path::new(build_file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(build_file);
    name.split('_').next().unwrap_or(name)
}

// ---------------------------------------------------------------------------
// Argument vector
// ---------------------------------------------------------------------------

/// An immutable program invocation: program followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgumentVector(Vec<String>);

impl ArgumentVector {
    pub fn new(tokens: Vec<String>) -> Self {
        Self(tokens)
    }

    pub fn program(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn to_os_args(&self) -> Vec<OsString> {
        self.args().iter().map(OsString::from).collect()
    }
}

/// Assemble the external program invocation for one job.
///
/// Layout: `[interpreter] program --cores=N --gender=G --graph=png
/// --alpha=A --build=PATH <4 method flags> --out=WORKSPACE INPUT`.
pub fn build_argv(
    config: &PipelineConfig,
    input_file: &Path,
    params: &AnalysisParams,
    workspace: &Path,
) -> Result<ArgumentVector, ValidationError> {
    params.validate()?;

    let roots = config.allowed_roots();
    let program = confine_path(&config.program, &roots)?;
    let build_path = confine_path(&config.builds_dir.join(&params.build), &roots)?;
    let out_dir = confine_path(workspace, &roots)?;
    let input = confine_path(input_file, &roots)?;

    let mut tokens = Vec::with_capacity(14);
    if let Some(interpreter) = &config.interpreter {
        tokens.push(interpreter.display().to_string());
    }
    tokens.push(program.display().to_string());
    tokens.push(format!("--cores={}", config.cores));
    tokens.push(format!("--gender={}", params.gender.as_flag_value()));
    tokens.push("--graph=png".to_string());
    tokens.push(format!("--alpha={}", params.alpha));
    tokens.push(format!("--build={}", build_path.display()));
    tokens.extend(params.methods.flags().iter().map(|f| f.to_string()));
    tokens.push(format!("--out={}", out_dir.display()));
    tokens.push(input.display().to_string());

    Ok(ArgumentVector(tokens))
}

// ---------------------------------------------------------------------------
// Path confinement
// ---------------------------------------------------------------------------

/// Resolve `path` and require it to sit inside one of `roots`.
///
/// Existing paths are canonicalised (following symlinks); paths that do not
/// exist yet are normalised lexically. Returns the resolved path.
pub fn confine_path(path: &Path, roots: &[&Path]) -> Result<PathBuf, ValidationError> {
    let resolved = resolve(path);
    let inside = roots
        .iter()
        .map(|root| resolve(root))
        .any(|root| resolved.starts_with(&root));
    if inside {
        Ok(resolved)
    } else {
        Err(ValidationError::PathTraversal(path.to_path_buf()))
    }
}

fn resolve(path: &Path) -> PathBuf {
    path.canonicalize()
        .unwrap_or_else(|_| normalize_lexically(path))
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn setup() -> (tempfile::TempDir, PipelineConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::rooted_at(dir.path().canonicalize().unwrap());
        std::fs::create_dir_all(&config.builds_dir).unwrap();
        std::fs::create_dir_all(&config.upload_root).unwrap();
        std::fs::write(&config.program, "#!/usr/bin/perl\n").unwrap();
        std::fs::write(config.builds_dir.join(DEFAULT_BUILD), "").unwrap();
        (dir, config)
    }

    #[test]
    fn builds_expected_argument_vector() {
        let (_dir, config) = setup();
        let ws = config.upload_root.join("abc");
        std::fs::create_dir(&ws).unwrap();
        let input = ws.join("sample.txt");
        std::fs::write(&input, "data").unwrap();

        let argv = build_argv(&config, &input, &AnalysisParams::default(), &ws).unwrap();
        let expected = vec![
            "perl".to_string(),
            config.program.display().to_string(),
            "--cores=2".to_string(),
            "--gender=NA".to_string(),
            "--graph=png".to_string(),
            "--alpha=0.1".to_string(),
            format!("--build={}", config.builds_dir.join(DEFAULT_BUILD).display()),
            "--pod".to_string(),
            "--nohd".to_string(),
            "--nomi1".to_string(),
            "--nopodcr".to_string(),
            format!("--out={}", ws.display()),
            input.display().to_string(),
        ];
        assert_eq!(argv.tokens(), expected.as_slice());
        assert_eq!(argv.program(), "perl");
    }

    #[test]
    fn no_interpreter_puts_program_first() {
        let (_dir, mut config) = setup();
        config.interpreter = None;
        let input = config.upload_root.join("in.txt");
        std::fs::write(&input, "").unwrap();
        let argv =
            build_argv(&config, &input, &AnalysisParams::default(), &config.upload_root).unwrap();
        assert_eq!(argv.program(), config.program.display().to_string());
    }

    #[test]
    fn enabled_methods_use_positive_flags() {
        let (_dir, config) = setup();
        let input = config.upload_root.join("in.txt");
        std::fs::write(&input, "").unwrap();
        let params = AnalysisParams {
            methods: DetectionMethods {
                pod: false,
                hd: true,
                mi1: true,
                podcr: true,
            },
            ..AnalysisParams::default()
        };
        let argv = build_argv(&config, &input, &params, &config.upload_root).unwrap();
        let flags: Vec<&str> = argv.args()[6..10].iter().map(String::as_str).collect();
        assert_eq!(flags, ["--nopod", "--hd", "--mi1", "--podcr"]);
    }

    #[test]
    fn no_detection_method_is_rejected() {
        let (_dir, config) = setup();
        let params = AnalysisParams {
            methods: DetectionMethods {
                pod: false,
                hd: false,
                mi1: false,
                podcr: false,
            },
            ..AnalysisParams::default()
        };
        let result = build_argv(
            &config,
            &config.upload_root.join("in.txt"),
            &params,
            &config.upload_root,
        );
        assert_matches!(result, Err(ValidationError::NoDetectionMethodSelected));
    }

    #[test]
    fn input_outside_roots_is_path_traversal() {
        let (_dir, config) = setup();
        let outside = tempfile::NamedTempFile::new().unwrap();
        let result = build_argv(
            &config,
            outside.path(),
            &AnalysisParams::default(),
            &config.upload_root,
        );
        assert_matches!(result, Err(ValidationError::PathTraversal(_)));
    }

    #[test]
    fn dot_dot_escape_is_path_traversal() {
        let (_dir, config) = setup();
        let sneaky = config.upload_root.join("..").join("..").join("etc").join("passwd");
        let roots = config.allowed_roots();
        assert_matches!(
            confine_path(&sneaky, &roots),
            Err(ValidationError::PathTraversal(_))
        );
    }

    #[test]
    fn nonexistent_path_inside_root_is_allowed() {
        let (_dir, config) = setup();
        let future = config.upload_root.join("later").join("out.txt");
        let roots = config.allowed_roots();
        assert_eq!(confine_path(&future, &roots).unwrap(), future);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_is_path_traversal() {
        let (_dir, config) = setup();
        let outside = tempfile::tempdir().unwrap();
        let link = config.upload_root.join("link");
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();
        let roots = config.allowed_roots();
        assert_matches!(
            confine_path(&link, &roots),
            Err(ValidationError::PathTraversal(_))
        );
    }

    #[test]
    fn gender_parsing() {
        assert_eq!(Gender::parse("M").unwrap(), Gender::Male);
        assert_eq!(Gender::parse("F").unwrap(), Gender::Female);
        assert_eq!(Gender::parse("NA").unwrap(), Gender::Unknown);
        assert_matches!(
            Gender::parse("X"),
            Err(ValidationError::InvalidParameter { name: "gender", .. })
        );
    }

    #[test]
    fn alpha_parsing_bounds() {
        assert_eq!(AnalysisParams::parse_alpha("0.05").unwrap(), 0.05);
        assert_eq!(AnalysisParams::parse_alpha("1").unwrap(), 1.0);
        for bad in ["0", "-0.1", "1.5", "NaN", "abc", "inf"] {
            assert_matches!(
                AnalysisParams::parse_alpha(bad),
                Err(ValidationError::InvalidParameter { name: "alpha", .. }),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn build_parsing_and_label() {
        assert_eq!(AnalysisParams::parse_build("hg19").unwrap(), "hg19_centromeres.txt");
        assert_eq!(
            AnalysisParams::parse_build("hg17_centromeres.txt").unwrap(),
            "hg17_centromeres.txt"
        );
        assert_matches!(
            AnalysisParams::parse_build("../hg19"),
            Err(ValidationError::InvalidParameter { name: "build", .. })
        );
        assert_eq!(build_label("hg18_centromeres.txt"), "hg18");
        assert_eq!(build_label("/opt/tripod/builds/hg19_centromeres.txt"), "hg19");
    }
}
