//! Loading and validation of the TOML session file.
//!
//! Hard errors (unreadable file, bad syntax, unknown version, impossible
//! values) fail the load. Values that are merely out of range are fixed up
//! and reported as warnings.

use shared::{AnalysisState, AppConfig, AppSection, WordRange};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unsupported config version '{found}' (expected {})", AppSection::CURRENT_VERSION)]
    UnsupportedVersion { found: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&content)?;
    log::info!("loaded config from {}", path.display());
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let mut config: AppConfig = toml::from_str(content)?;
    for warning in validate_and_fix(&mut config)? {
        log::warn!("config: {}", warning);
    }
    Ok(config)
}

/// Rejects impossible settings and clamps recoverable ones, returning a
/// warning per fix.
pub fn validate_and_fix(config: &mut AppConfig) -> Result<Vec<String>, ConfigError> {
    if !config.app.is_supported_version() {
        return Err(ConfigError::UnsupportedVersion {
            found: config.app.version.clone(),
        });
    }

    let session = &mut config.session;
    if !session.threshold.is_finite() || session.threshold < 0.0 {
        return Err(ConfigError::Invalid(format!(
            "session.threshold must be a finite number >= 0, got {}",
            session.threshold
        )));
    }
    check_brush("session.word_brush", session.word_brush)?;
    check_brush("session.zero_brush", session.zero_brush)?;

    let mut warnings = Vec::new();
    let timing = &mut config.timing;
    if timing.min_cell_width == 0 {
        timing.min_cell_width = 1;
        warnings.push("timing.min_cell_width raised to 1".to_string());
    }
    if timing.position_step <= 0 {
        return Err(ConfigError::Invalid(format!(
            "timing.position_step must be positive, got {}",
            timing.position_step
        )));
    }
    if timing.cell_width_step == 0 {
        timing.cell_width_step = 1;
        warnings.push("timing.cell_width_step raised to 1".to_string());
    }
    if session.cell_width < timing.min_cell_width {
        warnings.push(format!(
            "session.cell_width {} raised to minimum {}",
            session.cell_width, timing.min_cell_width
        ));
        session.cell_width = timing.min_cell_width;
    }
    Ok(warnings)
}

fn check_brush(field: &str, brush: Option<WordRange>) -> Result<(), ConfigError> {
    match brush {
        Some(range) if range.is_inverted() => Err(ConfigError::Invalid(format!(
            "{} {} ends before it starts",
            field, range
        ))),
        _ => Ok(()),
    }
}

/// State before the first context window arrives: scalar settings from the
/// session, no activations, no brushes.
pub fn initial_state(config: &AppConfig) -> AnalysisState {
    AnalysisState {
        position: config.session.position,
        cell_width: config.session.cell_width,
        threshold: config.session.threshold,
        viewport_width: config.timing.initial_viewport_width,
        ..AnalysisState::default()
    }
}
