//! Layered pipeline configuration: defaults, an optional TOML file, then
//! CLI-flag overrides, mirroring the teacher's `util::config` precedence
//! (project config overrides global, here: flags override file overrides
//! defaults).

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Compatibility profile controlling how unknown commands, keywords, and
/// disallowed combinations are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatProfile {
    Strict,
    Cmake3x,
    Lenient,
}

impl Default for CompatProfile {
    fn default() -> Self {
        CompatProfile::Cmake3x
    }
}

impl std::str::FromStr for CompatProfile {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STRICT" => Ok(CompatProfile::Strict),
            "CMAKE_3_X" | "CMAKE3X" => Ok(CompatProfile::Cmake3x),
            "LENIENT" => Ok(CompatProfile::Lenient),
            other => Err(format!("unknown compat profile `{other}`")),
        }
    }
}

/// Parser nesting limits (§4.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserLimits {
    pub max_block_depth: usize,
    pub max_paren_depth: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        ParserLimits { max_block_depth: 64, max_paren_depth: 64 }
    }
}

/// Evaluator behavior knobs (§4.5.6, §4.5.7, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub compat_profile: CompatProfile,
    pub continue_on_fatal_error: bool,
    /// Test hook: fail the N-th dynamic-array append to exercise resource
    /// error paths. `None` disables the hook.
    pub fail_append_after: Option<usize>,
    /// Runaway-loop backstop for `while()`.
    pub max_while_iterations: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        EvaluatorConfig {
            compat_profile: CompatProfile::default(),
            continue_on_fatal_error: true,
            fail_append_after: None,
            max_while_iterations: 100_000,
        }
    }
}

/// Top-level pipeline configuration: every row of §6's configuration table,
/// loadable from an optional TOML file and then overridden field-by-field
/// by CLI flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub strict_mode: bool,
    pub write_output_on_error: bool,
    pub parser_limits: ParserLimits,
    pub evaluator: EvaluatorConfig,
    /// Where to append the unsupported-command telemetry report; `None`
    /// disables the report file.
    pub unsupported_commands_log: Option<std::path::PathBuf>,
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration, falling back to defaults (with a warning logged)
    /// if the file does not parse, and to plain defaults if it is absent.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Apply CLI-flag overrides on top of a loaded (or default) config.
    /// Only `Some`/true fields override; the rest keep the file's values.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if overrides.strict_mode {
            self.strict_mode = true;
        }
        if let Some(profile) = overrides.compat_profile {
            self.evaluator.compat_profile = profile;
        }
        if let Some(depth) = overrides.max_block_depth {
            self.parser_limits.max_block_depth = depth;
        }
        if let Some(depth) = overrides.max_paren_depth {
            self.parser_limits.max_paren_depth = depth;
        }
        if let Some(path) = overrides.unsupported_commands_log {
            self.unsupported_commands_log = Some(path);
        }
    }
}

/// CLI-flag overrides layered on top of [`PipelineConfig`]. Fields are
/// `Option`/bool-default-false so "not passed on the CLI" is distinguishable
/// from "explicitly set to the default value".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub strict_mode: bool,
    pub compat_profile: Option<CompatProfile>,
    pub max_block_depth: Option<usize>,
    pub max_paren_depth: Option<usize>,
    pub unsupported_commands_log: Option<std::path::PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_lenient_enough_to_run() {
        let cfg = PipelineConfig::default();
        assert!(!cfg.strict_mode);
        assert_eq!(cfg.parser_limits.max_block_depth, 64);
        assert_eq!(cfg.evaluator.compat_profile, CompatProfile::Cmake3x);
    }

    #[test]
    fn load_parses_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cmk2bp.toml");
        std::fs::write(
            &path,
            r#"
strict_mode = true

[parser_limits]
max_block_depth = 16

[evaluator]
compat_profile = "STRICT"
"#,
        )
        .unwrap();
        let cfg = PipelineConfig::load(&path).unwrap();
        assert!(cfg.strict_mode);
        assert_eq!(cfg.parser_limits.max_block_depth, 16);
        assert_eq!(cfg.evaluator.compat_profile, CompatProfile::Strict);
    }

    #[test]
    fn overrides_take_precedence_over_file() {
        let mut cfg = PipelineConfig::default();
        cfg.apply_overrides(ConfigOverrides {
            strict_mode: true,
            compat_profile: Some(CompatProfile::Lenient),
            max_block_depth: Some(8),
            ..Default::default()
        });
        assert!(cfg.strict_mode);
        assert_eq!(cfg.evaluator.compat_profile, CompatProfile::Lenient);
        assert_eq!(cfg.parser_limits.max_block_depth, 8);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let cfg = PipelineConfig::load_or_default(Path::new("/nonexistent/cmk2bp.toml"));
        assert!(!cfg.strict_mode);
    }

    #[test]
    fn compat_profile_parses_case_insensitively() {
        assert_eq!("strict".parse::<CompatProfile>().unwrap(), CompatProfile::Strict);
        assert_eq!("CMAKE_3_X".parse::<CompatProfile>().unwrap(), CompatProfile::Cmake3x);
        assert!("bogus".parse::<CompatProfile>().is_err());
    }
}
