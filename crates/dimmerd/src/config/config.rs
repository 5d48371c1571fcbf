use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::ops::Range;
use std::path::PathBuf;

use motion_dimmer::defaults;
use motion_dimmer::ColorMode;
use motion_dimmer::DimmerOptions;
use serde::Deserialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

use super::diagnostics::format_diagnostics;
use super::diagnostics::ConfigError;
use super::diagnostics::Diagnostic;
use super::diagnostics::Error;
use super::diagnostics::SourceInfo;
use super::diagnostics::ValidationError;
use super::diagnostics::Warning;
use super::partial::PartialConfig;
use super::partial::PartialDimmer;
use super::partial::PartialSegment;
use crate::engine::slugify;

#[derive(Debug, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub persistence: PersistenceConfig,
    pub dimmers: BTreeMap<String, DimmerConfig>,
}

// LogLevel needs Deserialize because it's used in PartialLoggingConfig with toml::Spanned
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    /// Per-target levels, e.g. `"motion_dimmer" = "debug"`
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build a per-target filter for the tracing subscriber
    pub fn targets(&self) -> Targets {
        self.overrides.iter().fold(
            Targets::new().with_default(LevelFilter::from(self.level)),
            |targets, (target, level)| targets.with_target(target.clone(), LevelFilter::from(*level)),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub listen: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1".to_string(),
            port: 8565,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PersistenceConfig {
    /// State file. Control entities are kept in memory only when unset.
    pub path: Option<PathBuf>,
}

/// One managed light and the entities around it
#[derive(Debug, Clone)]
pub struct DimmerConfig {
    pub dimmer: String,
    pub select: String,
    pub triggers: Vec<String>,
    pub predictors: Vec<String>,
    pub script: Option<String>,
    pub options: DimmerOptions,
    pub defaults: DimmerDefaults,
    pub segments: Vec<SegmentConfig>,
}

impl DimmerConfig {
    pub fn segment(&self, slug: &str) -> Option<&SegmentConfig> {
        self.segments.iter().find(|s| s.slug == slug)
    }
}

/// Initial values of a dimmer's settings
#[derive(Debug, Clone, PartialEq)]
pub struct DimmerDefaults {
    /// Percent
    pub brightness_min: f64,
    pub trigger_interval: u64,
    pub extension_max: u64,
    pub manual_override: u64,
    pub prediction_secs: u64,
    /// Percent
    pub prediction_brightness: f64,
}

impl Default for DimmerDefaults {
    fn default() -> Self {
        Self {
            brightness_min: defaults::DEFAULT_MIN_BRIGHTNESS_PCT,
            trigger_interval: defaults::DEFAULT_TRIGGER_INTERVAL,
            extension_max: defaults::DEFAULT_EXTENSION_MAX,
            manual_override: defaults::DEFAULT_MANUAL_OVERRIDE,
            prediction_secs: defaults::DEFAULT_PREDICTION_SECS,
            prediction_brightness: defaults::DEFAULT_PREDICTION_BRIGHTNESS_PCT,
        }
    }
}

/// Initial settings of one select option
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentConfig {
    pub name: String,
    pub slug: String,
    pub seconds: u64,
    /// Percent
    pub brightness: f64,
    pub color_mode: Option<ColorMode>,
    pub color_temp: Option<u16>,
    pub rgb_color: Option<[u8; 3]>,
    pub enabled: bool,
}

impl Config {
    /// Load configuration from one or more TOML files with import resolution
    ///
    /// Returns the config together with any warnings. Fails if a file cannot
    /// be loaded or if any diagnostic is an error.
    pub fn from_files(paths: &[PathBuf]) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let configs = PartialConfig::load_with_imports(paths)?;

        // Merge with first-wins semantics, collecting diagnostics
        let (partial, diagnostics) = PartialConfig::merge(configs);

        Self::from_partial(partial, diagnostics)
    }

    /// Convert a merged PartialConfig to a Config, validating all fields
    pub fn from_partial(
        partial: PartialConfig,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let logging = match partial.logging {
            Some(partial_logging) => LoggingConfig {
                level: partial_logging
                    .level
                    .map(|s| *s.get_ref())
                    .unwrap_or_default(),
                overrides: partial_logging
                    .overrides
                    .map(|hm| hm.into_iter().map(|(k, v)| (k, *v.get_ref())).collect())
                    .unwrap_or_default(),
            },
            None => LoggingConfig::default(),
        };

        let api = match partial.api {
            Some(partial_api) => {
                let partial_api = partial_api.into_inner();
                let default = ApiConfig::default();
                ApiConfig {
                    listen: partial_api.listen.unwrap_or(default.listen),
                    port: partial_api.port.unwrap_or(default.port),
                }
            }
            None => ApiConfig::default(),
        };

        let persistence = PersistenceConfig {
            path: partial.persistence.and_then(|p| p.into_inner().path),
        };

        let mut dimmers = BTreeMap::new();
        for (key, partial_dimmer) in partial.dimmers.into_iter().flatten() {
            let span = partial_dimmer.span();
            let source = partial.dimmer_sources.get(&key).cloned();
            let mut validator = Validator {
                name: &key,
                span,
                source,
                errors: Vec::new(),
            };

            let dimmer = validator.dimmer(partial_dimmer.into_inner(), &mut diagnostics);
            let errors = validator.errors;
            if errors.is_empty() {
                dimmers.insert(key, dimmer);
            } else {
                diagnostics.extend(
                    errors
                        .into_iter()
                        .map(|e| Diagnostic::Error(Error::Validation(e))),
                );
            }
        }

        let config = Config {
            logging,
            api,
            persistence,
            dimmers,
        };

        if let Err(errors) = config.validate() {
            diagnostics.extend(
                errors
                    .into_iter()
                    .map(|e| Diagnostic::Error(Error::Validation(e))),
            );
        }

        if diagnostics.iter().any(|d| d.is_error()) {
            Err(ConfigError::Invalid(format_diagnostics(&diagnostics)))
        } else {
            Ok((config, diagnostics))
        }
    }

    /// Cross-dimmer constraints
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut owners: HashMap<&str, &str> = HashMap::new();

        for (name, dimmer) in &self.dimmers {
            if let Some(other) = owners.insert(&dimmer.dimmer, name) {
                errors.push(ValidationError {
                    field_path: format!("dimmers.{}.dimmer", name),
                    message: format!(
                        "light '{}' is already managed by dimmers.{}",
                        dimmer.dimmer, other
                    ),
                    span: None,
                    source: None,
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Collects every problem with one dimmer table
struct Validator<'a> {
    name: &'a str,
    span: Range<usize>,
    source: Option<SourceInfo>,
    errors: Vec<ValidationError>,
}

impl Validator<'_> {
    fn error(&mut self, field: &str, message: String, span: Option<Range<usize>>) {
        let span = span.unwrap_or_else(|| self.span.clone());
        self.errors.push(ValidationError {
            field_path: format!("dimmers.{}.{}", self.name, field),
            message,
            span: self.source.as_ref().map(|_| span),
            source: self.source.clone(),
        });
    }

    fn required(&mut self, field: &str, value: Option<String>) -> String {
        match value {
            Some(value) if !value.is_empty() => value,
            _ => {
                self.error(field, format!("{} is required", field), None);
                String::new()
            }
        }
    }

    fn percent(&mut self, field: &str, value: Option<f64>, default: f64) -> f64 {
        match value {
            Some(pct) if !(0.0..=100.0).contains(&pct) => {
                self.error(
                    field,
                    format!("{} must be between 0 and 100, got {}", field, pct),
                    None,
                );
                default
            }
            Some(pct) => pct,
            None => default,
        }
    }

    fn dimmer(&mut self, partial: PartialDimmer, diagnostics: &mut Vec<Diagnostic>) -> DimmerConfig {
        let dimmer = self.required("dimmer", partial.dimmer);
        let select = self.required("select", partial.select);

        if partial.triggers.is_empty() {
            self.error("triggers", "at least one trigger is required".to_string(), None);
        }

        let partial_defaults = partial.defaults.unwrap_or_default();
        let fallback = DimmerDefaults::default();
        if partial.predictors.is_empty()
            && (partial_defaults.prediction_secs.is_some()
                || partial_defaults.prediction_brightness.is_some())
        {
            diagnostics.push(Diagnostic::Warning(Warning::UnusedPrediction {
                dimmer: self.name.to_string(),
            }));
        }

        let defaults = DimmerDefaults {
            brightness_min: self.percent(
                "defaults.brightness_min",
                partial_defaults.brightness_min,
                fallback.brightness_min,
            ),
            trigger_interval: partial_defaults
                .trigger_interval
                .unwrap_or(fallback.trigger_interval),
            extension_max: partial_defaults
                .extension_max
                .unwrap_or(fallback.extension_max),
            manual_override: partial_defaults
                .manual_override
                .unwrap_or(fallback.manual_override),
            prediction_secs: partial_defaults
                .prediction_secs
                .unwrap_or(fallback.prediction_secs),
            prediction_brightness: self.percent(
                "defaults.prediction_brightness",
                partial_defaults.prediction_brightness,
                fallback.prediction_brightness,
            ),
        };

        if partial.segments.is_empty() {
            self.error("segments", "at least one segment is required".to_string(), None);
        }

        let mut slugs = HashSet::new();
        let mut segments = Vec::new();
        for (idx, partial_segment) in partial.segments.into_iter().enumerate() {
            let segment = self.segment(idx, partial_segment);
            if !segment.slug.is_empty() && !slugs.insert(segment.slug.clone()) {
                self.error(
                    &format!("segments[{}].name", idx),
                    format!(
                        "segment '{}' collides with another segment as '{}'",
                        segment.name, segment.slug
                    ),
                    None,
                );
            }
            segments.push(segment);
        }

        DimmerConfig {
            dimmer,
            select,
            triggers: partial.triggers,
            predictors: partial.predictors,
            script: partial.script,
            options: DimmerOptions {
                segment_disabled: partial.segment_disabled.unwrap_or_default(),
            },
            defaults,
            segments,
        }
    }

    fn segment(&mut self, idx: usize, partial: PartialSegment) -> SegmentConfig {
        let field = |name: &str| format!("segments[{}].{}", idx, name);

        let name = self.required(&field("name"), partial.name);
        let slug = slugify(&name);
        if !name.is_empty() && slug.is_empty() {
            self.error(
                &field("name"),
                format!("segment name '{}' has no letters or digits", name),
                None,
            );
        }

        let brightness = self.percent(&field("brightness"), partial.brightness, 100.0);

        let color_mode = match partial.color_mode {
            Some(mode) => match mode.get_ref().parse::<ColorMode>() {
                Ok(color_mode) => Some(color_mode),
                Err(_) => {
                    let span = mode.span();
                    self.error(
                        &field("color_mode"),
                        format!("unknown color mode '{}'", mode.get_ref()),
                        Some(span),
                    );
                    None
                }
            },
            None => None,
        };

        SegmentConfig {
            name,
            slug,
            seconds: partial
                .seconds
                .unwrap_or(defaults::DEFAULT_SEGMENT_SECONDS),
            brightness,
            color_mode,
            color_temp: partial.color_temp,
            rgb_color: partial.rgb_color,
            enabled: partial.enabled.unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    const HALLWAY: &str = r#"
[dimmers.hallway]
dimmer = "light.hallway"
select = "input_select.hallway_mode"
triggers = ["binary_sensor.hallway_motion"]
predictors = ["binary_sensor.stairs_motion"]

[[dimmers.hallway.segments]]
name = "Day"
seconds = 120
brightness = 100.0

[[dimmers.hallway.segments]]
name = "Late Night"
brightness = 0.5
color_mode = "color_temp"
color_temp = 454
"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn load(paths: &[PathBuf]) -> Result<(Config, Vec<Diagnostic>), ConfigError> {
        Config::from_files(paths)
    }

    #[test]
    fn test_full_dimmer_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "dimmerd.toml", HALLWAY);

        let (config, diagnostics) = load(&[path]).unwrap();
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let hallway = &config.dimmers["hallway"];
        assert_eq!(hallway.dimmer, "light.hallway");
        assert_eq!(hallway.select, "input_select.hallway_mode");
        assert_eq!(hallway.triggers, ["binary_sensor.hallway_motion"]);
        assert_eq!(hallway.predictors, ["binary_sensor.stairs_motion"]);
        assert_eq!(hallway.script, None);
        assert_eq!(hallway.options, DimmerOptions::default());
        assert_eq!(hallway.defaults, DimmerDefaults::default());

        assert_eq!(hallway.segments.len(), 2);
        let day = hallway.segment("day").unwrap();
        assert_eq!(day.seconds, 120);
        assert!(day.enabled);

        let night = hallway.segment("late_night").unwrap();
        assert_eq!(night.name, "Late Night");
        assert_eq!(night.seconds, defaults::DEFAULT_SEGMENT_SECONDS);
        assert_eq!(night.brightness, 0.5);
        assert_eq!(night.color_mode, Some(ColorMode::ColorTemp));
        assert_eq!(night.color_temp, Some(454));
    }

    #[test]
    fn test_api_persistence_and_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "dimmerd.toml",
            &format!(
                r#"
[api]
port = 9000

[persistence]
path = "/var/lib/dimmerd/state.json"
{}
"#,
                HALLWAY.replace(
                    "predictors = [\"binary_sensor.stairs_motion\"]",
                    "segment_disabled = \"stop_at_next_check\"\n\n[dimmers.hallway.defaults]\nmanual_override = 120\nbrightness_min = 2.0"
                )
            ),
        );

        let (config, diagnostics) = load(&[path]).unwrap();
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(config.api.listen, "127.0.0.1");
        assert_eq!(config.api.port, 9000);
        assert_eq!(
            config.persistence.path,
            Some(PathBuf::from("/var/lib/dimmerd/state.json"))
        );

        let hallway = &config.dimmers["hallway"];
        assert_eq!(
            hallway.options.segment_disabled,
            motion_dimmer::SegmentDisabledPolicy::StopAtNextCheck
        );
        assert_eq!(hallway.defaults.manual_override, 120);
        assert_eq!(hallway.defaults.brightness_min, 2.0);
        assert_eq!(hallway.defaults.trigger_interval, 59);
    }

    #[test]
    fn test_logging_targets() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "dimmerd.toml",
            r#"
[logging]
level = "warn"

[logging.overrides]
"motion_dimmer" = "debug"
"#,
        );

        let (config, _) = load(&[path]).unwrap();
        assert_eq!(config.logging.level, LogLevel::Warn);

        let targets = config.logging.targets();
        assert!(targets.would_enable("motion_dimmer::engine", &tracing::Level::DEBUG));
        assert!(!targets.would_enable("dimmerd::api", &tracing::Level::INFO));
        assert!(targets.would_enable("dimmerd::api", &tracing::Level::WARN));
    }

    #[test]
    fn test_merge_non_overlapping_configs() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(dir.path(), "base.toml", "[logging]\nlevel = \"info\"\n");
        let dimmers = write(dir.path(), "dimmers.toml", HALLWAY);

        let (config, diagnostics) = load(&[base, dimmers]).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.dimmers.len(), 1);
    }

    #[test]
    fn test_conflict_detection() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(
            dir.path(),
            "base.toml",
            "[logging]\nlevel = \"info\"\n\n[logging.overrides]\n\"dimmerd\" = \"trace\"\n\n[api]\nport = 1\n",
        );
        let other = write(
            dir.path(),
            "other.toml",
            "[logging]\nlevel = \"debug\"\n\n[logging.overrides]\n\"dimmerd\" = \"error\"\n\n[api]\nport = 2\n",
        );

        let err_msg = load(&[base, other]).unwrap_err().to_string();
        assert!(err_msg.contains("Merge conflict"));
        assert!(err_msg.contains("logging.level"));
        assert!(err_msg.contains("logging.overrides.dimmerd"));
        assert!(err_msg.contains("'api'"));
    }

    #[test]
    fn test_dimmer_defined_twice() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.toml", HALLWAY);
        let b = write(dir.path(), "b.toml", HALLWAY);

        let err_msg = load(&[a, b]).unwrap_err().to_string();
        assert!(err_msg.contains("dimmers.hallway"));
    }

    #[test]
    fn test_relative_import_paths() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "conf.d/hallway.toml", HALLWAY);
        let main = write(
            dir.path(),
            "dimmerd.toml",
            "imports = [\"conf.d/hallway.toml\"]\n\n[logging]\nlevel = \"debug\"\n",
        );

        let (config, _) = load(&[main]).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.dimmers.contains_key("hallway"));
    }

    #[test]
    fn test_import_cycle_detection() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.toml", "imports = [\"b.toml\"]\n");
        write(dir.path(), "b.toml", "imports = [\"a.toml\"]\n");

        let err = load(&[a]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Load(crate::config::LoadError::ImportCycle { .. })
        ));
        assert!(err.to_string().contains("Import cycle"));
    }

    #[test]
    fn test_empty_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let empty = write(dir.path(), "empty.toml", "");

        let (config, diagnostics) = load(&[empty]).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_warning());
        assert!(config.dimmers.is_empty());
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_missing_file_error() {
        let missing = PathBuf::from("/nonexistent/dimmerd.toml");
        let err_msg = load(&[missing]).unwrap_err().to_string();
        assert!(err_msg.contains("Failed to read"));
        assert!(err_msg.contains("/nonexistent/dimmerd.toml"));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write(dir.path(), "bad.toml", "[dimmers.hallway]\nbogus = 1\n");
        let err_msg = load(&[bad]).unwrap_err().to_string();
        assert!(err_msg.contains("Failed to parse"));
    }

    #[test]
    fn test_validation_collects_every_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "dimmerd.toml",
            r#"
[dimmers.porch]
triggers = []

[dimmers.porch.defaults]
brightness_min = 140.0

[[dimmers.porch.segments]]
name = "Night"
color_mode = "plaid"

[[dimmers.porch.segments]]
name = "night"
brightness = -3.0
"#,
        );

        let err_msg = load(&[path]).unwrap_err().to_string();
        for field in [
            "dimmers.porch.dimmer",
            "dimmers.porch.select",
            "dimmers.porch.triggers",
            "dimmers.porch.defaults.brightness_min",
            "dimmers.porch.segments[0].color_mode",
            "dimmers.porch.segments[1].brightness",
            "dimmers.porch.segments[1].name",
        ] {
            assert!(err_msg.contains(field), "missing {} in:\n{}", field, err_msg);
        }
    }

    #[test]
    fn test_no_segments() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "dimmerd.toml",
            "[dimmers.porch]\ndimmer = \"light.porch\"\nselect = \"input_select.porch\"\ntriggers = [\"binary_sensor.porch\"]\n",
        );

        let err_msg = load(&[path]).unwrap_err().to_string();
        assert!(err_msg.contains("dimmers.porch.segments"));
        assert!(err_msg.contains("at least one segment is required"));
    }

    #[test]
    fn test_light_managed_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "dimmerd.toml",
            &format!("{}\n{}", HALLWAY, HALLWAY.replace("[dimmers.hallway", "[dimmers.landing")),
        );

        let err_msg = load(&[path]).unwrap_err().to_string();
        assert!(err_msg.contains("already managed by dimmers.hallway"));
    }

    #[test]
    fn test_prediction_without_predictors_warns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "dimmerd.toml",
            &format!(
                "{}\n[dimmers.hallway.defaults]\nprediction_secs = 30\n",
                HALLWAY.replace("predictors = [\"binary_sensor.stairs_motion\"]\n", "")
            ),
        );

        let (config, diagnostics) = load(&[path]).unwrap();
        assert_eq!(config.dimmers["hallway"].defaults.prediction_secs, 30);
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            &diagnostics[0],
            Diagnostic::Warning(Warning::UnusedPrediction { dimmer }) if dimmer == "hallway"
        ));
    }
}
