use std::path::{Path, PathBuf};

use thiserror::Error;

/// A read/write failure on a named file.
#[derive(Debug, Error)]
#[error("{action} {}: {source}", .path.display())]
pub struct FileError {
    pub action: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl FileError {
    pub fn new(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("'{file}' is not well-formed XML (line {line}, column {column}): {detail}")]
    NotWellFormed {
        file: String,
        line: usize,
        column: usize,
        detail: String,
    },
    #[error(transparent)]
    Io(#[from] FileError),
    #[error("markup outside text nodes changed while writing {file} (before={before} after={after})")]
    StructureChanged {
        file: String,
        before: String,
        after: String,
    },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error("no <{target_tag}> element was found{}", scope_suffix(.parent_tag))]
    NoMatches {
        parent_tag: Option<String>,
        target_tag: String,
    },
    #[error("{matched} <{target_tag}> element(s) were found, but none contain text")]
    NoTextContent { target_tag: String, matched: usize },
}

impl ExtractError {
    /// True when extraction worked but yielded nothing usable.
    pub fn is_nothing_to_do(&self) -> bool {
        matches!(self, Self::NoMatches { .. } | Self::NoTextContent { .. })
    }
}

fn scope_suffix(parent_tag: &Option<String>) -> String {
    match parent_tag {
        Some(p) => format!(" inside <{p}>"),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown translation provider: {0}")]
    UnknownProvider(String),
    #[error("{provider} needs an API key (set it in the config or {env_var})")]
    MissingApiKey {
        provider: String,
        env_var: String,
    },
    #[error("{provider} is not reachable at {endpoint}. {hint}")]
    ConnectionRefused {
        provider: String,
        endpoint: String,
        hint: String,
    },
    #[error("{provider} request failed: {detail}")]
    Request { provider: String, detail: String },
    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: String },
    #[error("{provider} returned a response that could not be read: {detail}")]
    MalformedResponse { provider: String, detail: String },
}

impl ProviderError {
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused { .. })
    }
}

/// Normalized provider failure: callers only see the provider name and a readable message.
#[derive(Debug, Clone, Error)]
#[error("{provider}: {message}")]
pub struct ProviderFailure {
    pub provider: String,
    pub message: String,
    pub connection_refused: bool,
}

impl ProviderFailure {
    pub fn from_error(provider: &str, err: &ProviderError) -> Self {
        Self {
            provider: provider.to_string(),
            message: err.to_string(),
            connection_refused: err.is_connection_refused(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Io(#[from] FileError),
    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid CSV in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{} has no '{column}' column", .path.display())]
    MissingColumn { path: PathBuf, column: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_to_do_is_distinct_from_failures() {
        let none = ExtractError::NoMatches {
            parent_tag: Some("item".to_string()),
            target_tag: "name".to_string(),
        };
        assert!(none.is_nothing_to_do());
        assert_eq!(none.to_string(), "no <name> element was found inside <item>");

        let broken = ExtractError::Xml(XmlError::NotWellFormed {
            file: "a.xml".to_string(),
            line: 3,
            column: 7,
            detail: "unclosed element <b>".to_string(),
        });
        assert!(!broken.is_nothing_to_do());
        assert!(broken.to_string().contains("line 3, column 7"));
    }
}
