use std::collections::HashSet;
use std::ops::Range;
use std::path::PathBuf;

use ariadne::Color;
use ariadne::Label;
use ariadne::Report;
use ariadne::ReportKind;
use ariadne::Source;

/// Source information for where a diagnostic came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub file_path: PathBuf,
    pub content: String,
}

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(Error),
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone)]
pub enum Warning {
    EmptyConfig { file_path: PathBuf },

    /// Prediction settings were given for a dimmer that has no predictors.
    UnusedPrediction { dimmer: String },
}

/// Error messages that indicate problems with the config
#[derive(Debug, Clone)]
pub enum Error {
    Merge(MergeError),
    Validation(ValidationError),
}

/// Error type for merge conflicts
#[derive(Debug, Clone)]
pub struct MergeError {
    pub field_path: String,
    pub message: String,
    pub conflicts: Vec<MergeConflictLocation>,
}

#[derive(Debug, Clone)]
pub struct MergeConflictLocation {
    pub file_path: PathBuf,
    pub span: Range<usize>,
    pub content: String,
}

/// Error type for validation failures
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
    pub span: Option<Range<usize>>,
    pub source: Option<SourceInfo>,
}

/// Error type for config loading failures (parse errors, IO errors, etc.)
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read '{}': {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to parse '{}': {error}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },

    #[error("Import cycle detected at '{}': involves {} file(s)", path.display(), cycle.len())]
    ImportCycle { path: PathBuf, cycle: Vec<PathBuf> },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Rendered diagnostics, at least one of which is an error.
    #[error("{0}")]
    Invalid(String),
}

impl Diagnostic {
    /// Returns true if this diagnostic is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    /// Returns true if this diagnostic is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::EmptyConfig { file_path } => write!(
                f,
                "Config file '{}' is empty and has no effect",
                file_path.display()
            ),
            Warning::UnusedPrediction { dimmer } => write!(
                f,
                "dimmers.{} sets prediction options but has no predictors",
                dimmer
            ),
        }
    }
}

/// Format all diagnostics for display using Ariadne
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut output = Vec::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Warning(warning) => {
                output.extend_from_slice(format!("Warning: {}\n", warning).as_bytes());
            }
            Diagnostic::Error(Error::Merge(merge_error)) => {
                write_merge_error(merge_error, &mut output);
            }
            Diagnostic::Error(Error::Validation(validation_error)) => {
                write_validation_error(validation_error, &mut output);
            }
        }
    }

    String::from_utf8_lossy(&output).to_string()
}

fn file_id(path: &std::path::Path) -> String {
    path.to_string_lossy().to_string()
}

fn write_merge_error(error: &MergeError, output: &mut Vec<u8>) {
    let Some(first) = error.conflicts.first() else {
        let line = format!("Merge conflict in field '{}': {}\n", error.field_path, error.message);
        output.extend_from_slice(line.as_bytes());
        return;
    };

    let labels = error.conflicts.iter().enumerate().map(|(idx, conflict)| {
        let (message, color) = match idx {
            0 => ("first definition here", Color::Red),
            _ => ("conflicts with this definition", Color::Yellow),
        };
        Label::new((file_id(&conflict.file_path), conflict.span.clone()))
            .with_message(message)
            .with_color(color)
    });

    let report = Report::build(
        ReportKind::Error,
        (file_id(&first.file_path), first.span.clone()),
    )
    .with_message(format!("Merge conflict in field '{}'", error.field_path))
    .with_note(&error.message)
    .with_labels(labels)
    .finish();

    // Once per distinct file
    let mut seen = HashSet::new();
    for conflict in &error.conflicts {
        let id = file_id(&conflict.file_path);
        if seen.insert(id.clone()) {
            report
                .write((id, Source::from(&conflict.content)), &mut *output)
                .ok();
        }
    }
}

fn write_validation_error(error: &ValidationError, output: &mut Vec<u8>) {
    let (Some(span), Some(source)) = (&error.span, &error.source) else {
        let line = format!("Validation error in '{}': {}\n", error.field_path, error.message);
        output.extend_from_slice(line.as_bytes());
        return;
    };

    let id = file_id(&source.file_path);
    Report::build(ReportKind::Error, (id.clone(), span.clone()))
        .with_message(format!("Validation error in '{}'", error.field_path))
        .with_label(
            Label::new((id.clone(), span.clone()))
                .with_message(&error.message)
                .with_color(Color::Red),
        )
        .finish()
        .write((id, Source::from(&source.content)), &mut *output)
        .ok();
}
