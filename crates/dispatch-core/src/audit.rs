//! Audit ledger writer.
//!
//! Every completed delivery stage appends one SQL-style statement to a
//! per-file log at `<root>/<file>.<label>.audit`:
//!
//! ```text
//! update AUDIT_FILES set DISP_DATE='2025-11-03T10:15:00.123456', DISP_NUM=3, DISP_SLOT=2 where SCOPE='ims' and FILE_NAME='batch1.txt' and DISP_DATE is NULL;
//! ```
//!
//! When a statement sets the completion timestamp, its `where` clause only
//! matches rows whose timestamp is still unset, so a downstream consumer that
//! replays the log literally applies it at most once.
//!
//! Columns are emitted in a fixed order: `_DATE`, `_NUM`, `_SLOT`, `_KPART`,
//! `_KIDX`. `_KIDX` is the numeric suffix of a topic named `<name>-<digits>`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;

/// Default directory holding the audit logs.
pub const DEFAULT_AUDIT_ROOT: &str = "/var/opt/SIU/audit";

/// Default zone used to render completion timestamps.
pub const DEFAULT_AUDIT_TIMEZONE: Tz = chrono_tz::Europe::Paris;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Errors raised while building or appending an audit statement.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// No column would be set by the statement.
    #[error("no audit fields to store for file {file}")]
    NoFields {
        /// Audit file name.
        file: String,
    },

    /// The audit log could not be opened for append.
    #[error("cannot open audit log {path}: {source}")]
    Open {
        /// Log path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The statement could not be written.
    #[error("cannot write audit log {path}: {source}")]
    Write {
        /// Log path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A file-name substitution rule is not usable.
    #[error("invalid audit file name substitution {pattern:?}: {reason}")]
    InvalidSubstitution {
        /// Offending pattern, or the raw rule set when it is not valid JSON.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Values recorded by one audit statement.
///
/// Built with [`AuditFields::builder`]; every field is optional but at least
/// one must be set for the statement to be written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFields {
    completed_at: Option<DateTime<Utc>>,
    num_tickets: Option<i64>,
    output_slot: Option<String>,
    kafka_partition: Option<i32>,
    kafka_topic: Option<String>,
}

impl AuditFields {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> AuditFieldsBuilder {
        AuditFieldsBuilder::default()
    }

    /// True if the statement sets the completion timestamp.
    #[must_use]
    pub fn sets_completion(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Builder for [`AuditFields`].
#[derive(Debug, Clone, Default)]
pub struct AuditFieldsBuilder {
    fields: AuditFields,
}

impl AuditFieldsBuilder {
    /// Sets the completion timestamp to the current time.
    #[must_use]
    pub fn completed_now(self) -> Self {
        self.completed_at(Utc::now())
    }

    /// Sets the completion timestamp.
    #[must_use]
    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.fields.completed_at = Some(at);
        self
    }

    /// Sets the delivered ticket count. `-1` records an unknown count.
    #[must_use]
    pub fn num_tickets(mut self, n: i64) -> Self {
        self.fields.num_tickets = Some(n);
        self
    }

    /// Sets the output slot.
    #[must_use]
    pub fn output_slot(mut self, slot: impl Into<String>) -> Self {
        self.fields.output_slot = Some(slot.into());
        self
    }

    /// Sets the broker partition the file went to.
    #[must_use]
    pub fn kafka_partition(mut self, partition: i32) -> Self {
        self.fields.kafka_partition = Some(partition);
        self
    }

    /// Sets the broker topic; only its numeric suffix is recorded.
    #[must_use]
    pub fn kafka_topic(mut self, topic: impl Into<String>) -> Self {
        self.fields.kafka_topic = Some(topic.into());
        self
    }

    /// Returns the fields.
    #[must_use]
    pub fn build(self) -> AuditFields {
        self.fields
    }
}

/// Returns the numeral suffix of a topic named `<name>-<digits>`.
#[must_use]
pub fn topic_index(topic: &str) -> Option<&str> {
    let stem = topic.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &topic[stem.len()..];
    if digits.is_empty() || !stem.ends_with('-') {
        return None;
    }
    Some(digits)
}

/// Ordered regex rewrites applied to ticket base names before auditing.
#[derive(Debug, Clone, Default)]
pub struct FileNameRewriter {
    rules: Vec<(Regex, String)>,
}

impl FileNameRewriter {
    /// Builds a rewriter from `(pattern, replacement)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidSubstitution`] if a pattern does not
    /// compile.
    pub fn new<I, P, R>(rules: I) -> Result<Self, AuditError>
    where
        I: IntoIterator<Item = (P, R)>,
        P: AsRef<str>,
        R: Into<String>,
    {
        let rules = rules
            .into_iter()
            .map(|(pattern, replacement)| {
                let pattern = pattern.as_ref();
                Regex::new(pattern)
                    .map(|re| (re, replacement.into()))
                    .map_err(|e| AuditError::InvalidSubstitution {
                        pattern: pattern.to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    /// Parses a JSON object mapping pattern to replacement.
    ///
    /// Single quotes are accepted and read as double quotes. Rules keep the
    /// order in which they appear in the document.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidSubstitution`] if the text is not a JSON
    /// object of strings or a pattern does not compile.
    pub fn from_json(raw: &str) -> Result<Self, AuditError> {
        let normalised = raw.replace('\'', "\"");
        let invalid = |reason: String| AuditError::InvalidSubstitution {
            pattern: raw.to_string(),
            reason,
        };

        let value: serde_json::Value =
            serde_json::from_str(&normalised).map_err(|e| invalid(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| invalid("expected a JSON object".into()))?;

        let mut rules = Vec::with_capacity(object.len());
        for (pattern, replacement) in object {
            let replacement = replacement
                .as_str()
                .ok_or_else(|| invalid(format!("replacement for {pattern:?} is not a string")))?;
            rules.push((pattern.clone(), replacement.to_string()));
        }
        Self::new(rules)
    }

    /// True if no rule is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Applies every rule in order, replacing all matches.
    ///
    /// Replacements use `$1` / `${name}` group references.
    #[must_use]
    pub fn apply(&self, file_name: &str) -> String {
        self.rules
            .iter()
            .fold(file_name.to_string(), |name, (re, replacement)| {
                re.replace_all(&name, replacement.as_str()).into_owned()
            })
    }
}

/// Writer of audit statements for one scope and label.
#[derive(Debug, Clone)]
pub struct AuditLedger {
    root: PathBuf,
    scope: String,
    label: String,
    timezone: Tz,
}

impl AuditLedger {
    /// Creates a ledger writing under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, scope: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            scope: scope.into(),
            label: label.into(),
            timezone: DEFAULT_AUDIT_TIMEZONE,
        }
    }

    /// Renders completion timestamps in `timezone`.
    #[must_use]
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Audit label (column prefix).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Path of the log for `file_name`.
    #[must_use]
    pub fn log_path(&self, file_name: &str) -> PathBuf {
        self.root.join(format!("{file_name}.{}.audit", self.label))
    }

    /// Builds the statement text, without the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::NoFields`] if no column would be set.
    pub fn statement(&self, file_name: &str, fields: &AuditFields) -> Result<String, AuditError> {
        let label = &self.label;
        let mut assignments = Vec::new();
        let mut predicate = format!("SCOPE='{}' and FILE_NAME='{file_name}'", self.scope);

        if let Some(at) = fields.completed_at {
            let local = at.with_timezone(&self.timezone).format(TIMESTAMP_FORMAT);
            assignments.push(format!("{label}_DATE='{local}'"));
            predicate.push_str(&format!(" and {label}_DATE is NULL"));
        }
        if let Some(n) = fields.num_tickets {
            assignments.push(format!("{label}_NUM={n}"));
        }
        if let Some(slot) = &fields.output_slot {
            assignments.push(format!("{label}_SLOT={slot}"));
        }
        if let Some(partition) = fields.kafka_partition {
            assignments.push(format!("{label}_KPART={partition}"));
        }
        if let Some(index) = fields.kafka_topic.as_deref().and_then(topic_index) {
            assignments.push(format!("{label}_KIDX={index}"));
        }

        if assignments.is_empty() {
            return Err(AuditError::NoFields {
                file: file_name.to_string(),
            });
        }

        Ok(format!(
            "update AUDIT_FILES set {} where {predicate};",
            assignments.join(", ")
        ))
    }

    /// Appends one statement for `file_name` and returns the log path.
    ///
    /// Nothing is written when the statement cannot be built or the log
    /// cannot be opened.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] on an empty field set or an I/O failure.
    pub fn append_statement(
        &self,
        file_name: &str,
        fields: &AuditFields,
    ) -> Result<PathBuf, AuditError> {
        let record = self.statement(file_name, fields)?;
        let path = self.log_path(file_name);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::Open {
                path: path.clone(),
                source,
            })?;
        writeln!(file, "{record}")
            .and_then(|()| file.sync_data())
            .map_err(|source| AuditError::Write {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(audit_log = %path.display(), statement = %record, "audit statement stored");
        Ok(path)
    }

    /// Root directory of the logs.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}
