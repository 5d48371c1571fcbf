use std::collections::HashMap;
use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;
use std::path::PathBuf;

use motion_dimmer::SegmentDisabledPolicy;
use serde::Deserialize;
use toml::Spanned;

use super::diagnostics::Diagnostic;
use super::diagnostics::Error;
use super::diagnostics::LoadError;
use super::diagnostics::MergeConflictLocation;
use super::diagnostics::MergeError;
use super::diagnostics::SourceInfo;
use super::diagnostics::Warning;
use super::LogLevel;

#[derive(Debug, Default, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub imports: Vec<String>,

    pub logging: Option<PartialLoggingConfig>,
    pub api: Option<Spanned<PartialApiConfig>>,
    pub persistence: Option<Spanned<PartialPersistenceConfig>>,
    pub dimmers: Option<HashMap<String, Spanned<PartialDimmer>>>,

    /// Source information for error reporting (not serialized)
    #[serde(skip)]
    pub source: Option<SourceInfo>,

    /// Source of every merged dimmer, for validation errors
    #[serde(skip)]
    pub dimmer_sources: HashMap<String, SourceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialLoggingConfig {
    pub level: Option<Spanned<LogLevel>>,
    pub overrides: Option<HashMap<String, Spanned<LogLevel>>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialApiConfig {
    pub listen: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialPersistenceConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialDimmer {
    /// Managed light
    pub dimmer: Option<String>,

    /// Segment selector
    pub select: Option<String>,

    #[serde(default)]
    pub triggers: Vec<String>,

    #[serde(default)]
    pub predictors: Vec<String>,

    pub script: Option<String>,

    pub segment_disabled: Option<SegmentDisabledPolicy>,

    pub defaults: Option<PartialDimmerDefaults>,

    #[serde(default)]
    pub segments: Vec<PartialSegment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialDimmerDefaults {
    /// Percent
    pub brightness_min: Option<f64>,
    pub trigger_interval: Option<u64>,
    pub extension_max: Option<u64>,
    pub manual_override: Option<u64>,
    pub prediction_secs: Option<u64>,
    /// Percent
    pub prediction_brightness: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialSegment {
    /// Select option this segment applies to
    pub name: Option<String>,
    pub seconds: Option<u64>,
    /// Percent
    pub brightness: Option<f64>,
    pub color_mode: Option<Spanned<String>>,
    pub color_temp: Option<u16>,
    pub rgb_color: Option<[u8; 3]>,
    pub enabled: Option<bool>,
}

impl PartialConfig {
    /// Load a single config file without processing imports
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            error: e,
        })?;

        let mut config: PartialConfig = toml::from_str(&content).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            error: e,
        })?;

        config.source = Some(SourceInfo {
            file_path: path.to_path_buf(),
            content,
        });

        Ok(config)
    }

    /// Load config files with import resolution
    ///
    /// Each config file is loaded, then its imports are recursively processed.
    /// Returns all loaded configs in order (imports first, then parent).
    pub fn load_with_imports(paths: &[PathBuf]) -> Result<Vec<Self>, LoadError> {
        let mut visited = HashSet::new();
        let mut all_configs = Vec::new();

        for path in paths {
            Self::load_recursive(path, &mut visited, &mut all_configs)?;
        }

        Ok(all_configs)
    }

    fn load_recursive(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        configs: &mut Vec<Self>,
    ) -> Result<(), LoadError> {
        let canonical_path = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        if visited.contains(&canonical_path) {
            return Err(LoadError::ImportCycle {
                path: canonical_path.clone(),
                cycle: visited.iter().cloned().collect(),
            });
        }

        visited.insert(canonical_path.clone());

        let config = Self::from_file(path)?;

        // Imports resolve relative to the importing file
        for import_path in &config.imports {
            let import_path_buf = PathBuf::from(import_path);
            let resolved_path = if import_path_buf.is_absolute() {
                import_path_buf
            } else {
                let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
                parent_dir.join(import_path_buf)
            };

            Self::load_recursive(&resolved_path, visited, configs)?;
        }

        configs.push(config);

        // Sibling branches may import the same file
        visited.remove(&canonical_path);

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.logging.is_none()
            && self.api.is_none()
            && self.persistence.is_none()
            && self.dimmers.is_none()
            && self.imports.is_empty()
    }

    /// Merge multiple partial configs together
    ///
    /// Uses first-wins semantics: the first occurrence of a field is kept.
    /// Conflicts are collected as errors but merging continues so that every
    /// conflict is reported at once.
    pub fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>,
    {
        let mut result = PartialConfig::default();
        let mut diagnostics = Vec::new();
        let mut imports = Vec::new();
        let mut merger = Merger::default();

        for config in configs {
            imports.extend(config.imports.clone());

            let source_info = config.source.clone().unwrap_or_else(|| SourceInfo {
                file_path: PathBuf::from("<unknown>"),
                content: String::new(),
            });

            if config.is_empty() {
                diagnostics.push(Diagnostic::Warning(Warning::EmptyConfig {
                    file_path: source_info.file_path.clone(),
                }));
            }

            if let Some(logging) = config.logging {
                let result_logging = result.logging.get_or_insert_with(Default::default);

                if let Some(level) = logging.level {
                    let span = level.span();
                    if merger.claim("logging.level", &source_info, span, &mut diagnostics) {
                        result_logging.level = Some(level);
                    }
                }

                for (key, value) in logging.overrides.into_iter().flatten() {
                    let span = value.span();
                    let field_path = format!("logging.overrides.{}", key);
                    if merger.claim(&field_path, &source_info, span, &mut diagnostics) {
                        result_logging
                            .overrides
                            .get_or_insert_with(HashMap::new)
                            .insert(key, value);
                    }
                }
            }

            if let Some(api) = config.api {
                let span = api.span();
                if merger.claim("api", &source_info, span, &mut diagnostics) {
                    result.api = Some(api);
                }
            }

            if let Some(persistence) = config.persistence {
                let span = persistence.span();
                if merger.claim("persistence", &source_info, span, &mut diagnostics) {
                    result.persistence = Some(persistence);
                }
            }

            for (key, dimmer) in config.dimmers.into_iter().flatten() {
                let span = dimmer.span();
                let field_path = format!("dimmers.{}", key);
                if merger.claim(&field_path, &source_info, span, &mut diagnostics) {
                    result
                        .dimmer_sources
                        .insert(key.clone(), source_info.clone());
                    result
                        .dimmers
                        .get_or_insert_with(HashMap::new)
                        .insert(key, dimmer);
                }
            }
        }

        result.imports = imports;

        (result, diagnostics)
    }
}

/// Tracks which file first set each field.
#[derive(Default)]
struct Merger {
    locations: HashMap<String, MergeConflictLocation>,
}

impl Merger {
    /// Returns true if this is the first definition of `field_path`,
    /// otherwise records a conflict.
    fn claim(
        &mut self,
        field_path: &str,
        source: &SourceInfo,
        span: Range<usize>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> bool {
        let location = MergeConflictLocation {
            file_path: source.file_path.clone(),
            span,
            content: source.content.clone(),
        };

        match self.locations.get(field_path) {
            Some(previous) => {
                diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                    field_path: field_path.to_string(),
                    message: format!("'{}' defined in multiple config files", field_path),
                    conflicts: vec![previous.clone(), location],
                })));
                false
            }
            None => {
                self.locations.insert(field_path.to_string(), location);
                true
            }
        }
    }
}
