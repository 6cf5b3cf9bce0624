//! Public entry points for the AppConfig helper crate.
//!
//! The crate keeps a validated, typed copy of an AWS AppConfig document in
//! memory and refreshes it from the AppConfig Data API once the cached copy is
//! older than the configured staleness bound. Requests to AWS go through the
//! SDK ([`AppConfigDataClient`]); [`HttpClient`] speaks the same protocol
//! unsigned to an explicitly configured endpoint. The module re-exports the
//! building blocks required to construct a helper, plug in a custom transport
//! or validator, and observe refresh activity without digging into the
//! internal module layout.

pub mod cache;
pub mod client;
pub mod config;
pub mod content;
pub mod helper;
pub mod http;
pub mod policy;
pub mod sdk;
pub mod telemetry;
pub mod validate;

pub use cache::{ConfigCache, ConfigSnapshot};
pub use client::{
    ConfigTarget, FetchError, FetchRequest, FetchResponse, FetchedDocument, PollToken,
    RemoteConfigClient,
};
pub use config::{ConfigError, HelperConfig};
pub use content::{parse_document, ContentType, ParseError};
pub use helper::{
    AppConfigHelper, AppConfigTelemetry, HelperBuilder, HelperError, HelperState, NoopTelemetry,
    RefreshOutcome, StatusSnapshot,
};
pub use http::{HttpClient, HttpClientOptions, HttpError};
pub use policy::{RefreshPolicy, RefreshPolicyState};
pub use sdk::{AppConfigDataClient, SdkClientError};
pub use telemetry::{CompositeTelemetry, CountingTelemetry, TelemetryCounters, TelemetrySnapshot};
pub use validate::{ConfigSchema, FieldViolation, SchemaValidator, ValidationError, Validator};
