//! In-memory holder for the last validated configuration.
//!
//! The cache stores exactly one [`ConfigSnapshot`] at a time behind an `Arc`.
//! Readers clone the `Arc`, so a refresh that swaps in a new snapshot never
//! invalidates values already handed out.

use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use time::OffsetDateTime;

use crate::client::PollToken;
use crate::content::ContentType;

/// A validated configuration together with the payload it was built from.
#[derive(Debug)]
pub struct ConfigSnapshot<T> {
    raw: Bytes,
    content_type: ContentType,
    value: Arc<T>,
    fetched_at: OffsetDateTime,
    poll_token: Option<PollToken>,
    version_label: Option<String>,
}

impl<T> ConfigSnapshot<T> {
    pub fn new(
        raw: Bytes,
        content_type: ContentType,
        value: T,
        poll_token: Option<PollToken>,
        version_label: Option<String>,
    ) -> Self {
        Self {
            raw,
            content_type,
            value: Arc::new(value),
            fetched_at: OffsetDateTime::now_utc(),
            poll_token,
            version_label,
        }
    }

    /// Bytes exactly as delivered by the service.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// The typed configuration.
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    /// Wall-clock time at which the payload was received.
    pub fn fetched_at(&self) -> OffsetDateTime {
        self.fetched_at
    }

    /// Token that accompanied this payload.
    pub fn poll_token(&self) -> Option<&PollToken> {
        self.poll_token.as_ref()
    }

    /// Version label reported by the service, if any.
    pub fn version_label(&self) -> Option<&str> {
        self.version_label.as_deref()
    }
}

/// Single-slot cache for the current snapshot.
#[derive(Debug)]
pub struct ConfigCache<T> {
    slot: RwLock<Option<Arc<ConfigSnapshot<T>>>>,
}

impl<T> Default for ConfigCache<T> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }
}

impl<T> ConfigCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current snapshot, if one has been stored.
    pub fn read(&self) -> Option<Arc<ConfigSnapshot<T>>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs `snapshot` and returns the one it replaced.
    pub fn swap(&self, snapshot: Arc<ConfigSnapshot<T>>) -> Option<Arc<ConfigSnapshot<T>>> {
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(snapshot)
    }

    pub fn is_empty(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
