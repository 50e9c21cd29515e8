//! Where batch runs get their identities from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Identity;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read identities from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Malformed identity file: {0}")]
    Csv(#[from] csv::Error),
}

/// Supplies the ordered identity list for one run.
///
/// Object-safe so commands can hold a `Box<dyn IdentitySource>`.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn load(&self) -> Result<Vec<Identity>, SourceError>;
}

/// Comma-separated identity list.
///
/// One record per line, either `login_name` or `id,login_name`, with optional
/// double quotes as written by database and spreadsheet exports. Blank lines
/// and lines starting with `#` are skipped. Without an id the 1-based line
/// number is used.
pub struct FileSource {
    path: PathBuf,
    emails_only: bool,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            emails_only: false,
        }
    }

    /// Drop login names that do not look like e-mail addresses.
    pub fn emails_only(mut self, enabled: bool) -> Self {
        self.emails_only = enabled;
        self
    }
}

#[async_trait]
impl IdentitySource for FileSource {
    async fn load(&self) -> Result<Vec<Identity>, SourceError> {
        let contents =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| SourceError::Read {
                    path: self.path.clone(),
                    source,
                })?;
        let mut identities = parse_identities(&contents)?;
        if self.emails_only {
            let before = identities.len();
            retain_emails(&mut identities);
            let dropped = before - identities.len();
            if dropped > 0 {
                tracing::info!(dropped, "Skipped login names that are not e-mail addresses");
            }
        }
        tracing::debug!(
            count = identities.len(),
            path = %self.path.display(),
            "Loaded identities"
        );
        Ok(identities)
    }
}

/// Parse identity records. Fields may be quoted and are trimmed; a UTF-8 BOM
/// is ignored.
pub fn parse_identities(contents: &str) -> Result<Vec<Identity>, SourceError> {
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());

    let mut identities = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line() as usize);
        if record.iter().all(str::is_empty) {
            continue;
        }
        let identity = match record.len() {
            1 => Identity::new(line.to_string(), &record[0]),
            2 => {
                let (id, login_name) = (&record[0], &record[1]);
                if login_name.is_empty() {
                    return Err(SourceError::Malformed {
                        line,
                        reason: "missing login name after ','".to_string(),
                    });
                }
                let id = if id.is_empty() {
                    line.to_string()
                } else {
                    id.to_string()
                };
                Identity::new(id, login_name)
            }
            n => {
                return Err(SourceError::Malformed {
                    line,
                    reason: format!("expected `login_name` or `id,login_name`, found {} fields", n),
                })
            }
        };
        identities.push(identity);
    }
    Ok(identities)
}

pub fn retain_emails(identities: &mut Vec<Identity>) {
    identities.retain(|identity| is_email_format(&identity.login_name));
}

/// `local@domain.tld`: local part of `[A-Za-z0-9._%+-]`, domain of
/// `[A-Za-z0-9.-]` and an alphabetic TLD of at least two letters.
pub fn is_email_format(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty()
        || !local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c))
    {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        && tld.len() >= 2
        && tld.chars().all(|c| c.is_ascii_alphabetic())
}
