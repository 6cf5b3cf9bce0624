//! Document decoding for AppConfig payloads.
//!
//! AppConfig stores configuration profiles as opaque bytes tagged with a
//! declared MIME type. This module turns those bytes into an untyped
//! [`serde_json::Value`] so the validator can bind it to the caller's schema
//! regardless of whether the profile was authored in JSON or YAML.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

/// MIME type AppConfig reports for JSON profiles.
pub const JSON_MIME: &str = "application/json";
/// MIME type AppConfig reports for YAML profiles.
pub const YAML_MIME: &str = "application/x-yaml";

/// Content types the helper knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Json,
    Yaml,
}

impl ContentType {
    /// Resolves a declared MIME type (as found in a `Content-Type` header).
    ///
    /// Parameters such as `; charset=utf-8` are ignored and matching is
    /// case-insensitive. Structured-syntax suffixes (`+json`, `+yaml`) map to
    /// their base format.
    pub fn from_mime(declared: &str) -> Result<Self, ParseError> {
        let essence = declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            JSON_MIME | "text/json" => Ok(Self::Json),
            YAML_MIME | "application/yaml" | "text/yaml" | "text/x-yaml" => Ok(Self::Yaml),
            other if other.ends_with("+json") => Ok(Self::Json),
            other if other.ends_with("+yaml") => Ok(Self::Yaml),
            _ => Err(ParseError::UnsupportedContentType(declared.to_string())),
        }
    }

    /// Returns the canonical MIME type for this content type.
    pub fn as_mime(&self) -> &'static str {
        match self {
            Self::Json => JSON_MIME,
            Self::Yaml => YAML_MIME,
        }
    }
}

impl FromStr for ContentType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_mime(s)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// Failures raised while decoding a configuration document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The service declared a content type the helper cannot decode.
    #[error("unsupported content type: {0:?}")]
    UnsupportedContentType(String),
    /// The payload is not valid JSON.
    #[error("unable to parse JSON configuration data: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload is not valid YAML.
    #[error("unable to parse YAML configuration data{}: {source}", yaml_location(.source))]
    Yaml {
        #[source]
        source: serde_yaml::Error,
    },
}

impl From<serde_yaml::Error> for ParseError {
    fn from(source: serde_yaml::Error) -> Self {
        Self::Yaml { source }
    }
}

fn yaml_location(error: &serde_yaml::Error) -> String {
    match error.location() {
        Some(location) => format!(
            " at line {} column {}",
            location.line(),
            location.column()
        ),
        None => String::new(),
    }
}

/// Decodes `raw` according to `content_type`.
///
/// Parser errors are always surfaced; an unparsable document never degrades
/// into an empty or default value.
pub fn parse_document(raw: &[u8], content_type: ContentType) -> Result<Value, ParseError> {
    match content_type {
        ContentType::Json => Ok(serde_json::from_slice(raw)?),
        ContentType::Yaml => Ok(serde_yaml::from_slice(raw)?),
    }
}
