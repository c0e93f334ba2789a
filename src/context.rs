//! Request-scoped metadata carried alongside work that goes through a gate.
//!
//! A [`Context`] holds an optional request id and an accumulated log tag of the
//! form `[uuid:<id>][key:value]...`. Contexts are immutable; every `with_*`
//! call returns a new value and leaves its parent untouched, so tags added on
//! one branch never show up on siblings or ancestors.

use std::borrow::Cow;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

const UUID_TAG: &str = "uuid";

/// Errors returned by [`Context`] accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
   /// [`Context::uuid`] was called before [`Context::with_uuid`].
   #[error("no uuid is set for context")]
   NoUuidSet,
}

/// Immutable request metadata: a request id plus diagnostic tags.
///
/// Cloning is cheap; the strings are shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
   uuid: Option<Arc<str>>,
   log_tag: Option<Arc<str>>,
}

impl Context {
   /// Creates an empty context.
   #[inline]
   #[must_use]
   pub fn new() -> Self {
      Self::default()
   }

   /// Returns a copy carrying `uuid` as the request id.
   ///
   /// The first id wins: if one is already set, the copy keeps it. An empty
   /// `uuid` is replaced with a freshly generated v4 UUID.
   #[must_use]
   pub fn with_uuid(&self, uuid: &str) -> Self {
      if self.uuid.is_some() {
         return self.clone();
      }
      let uuid: Arc<str> = if uuid.is_empty() {
         Uuid::new_v4().hyphenated().to_string().into()
      } else {
         uuid.into()
      };
      Self {
         uuid: Some(uuid),
         log_tag: self.log_tag.clone(),
      }
   }

   /// Returns the request id set by [`with_uuid`](Self::with_uuid).
   pub fn uuid(&self) -> Result<&str, ContextError> {
      self.uuid.as_deref().ok_or(ContextError::NoUuidSet)
   }

   /// Returns a copy with `[key:value]` appended to the log tag.
   ///
   /// The first tag added to a context that already has a request id is
   /// prefixed with `[uuid:<id>]`. Set the id before tagging if it should
   /// appear in the tag.
   #[must_use]
   pub fn with_log_tag(&self, key: &str, value: &str) -> Self {
      let tag = match (&self.log_tag, &self.uuid) {
         (Some(tag), _) => format!("{tag}[{key}:{value}]"),
         (None, Some(uuid)) => format!("[{UUID_TAG}:{uuid}][{key}:{value}]"),
         (None, None) => format!("[{key}:{value}]"),
      };
      Self {
         uuid: self.uuid.clone(),
         log_tag: Some(tag.into()),
      }
   }

   /// Returns the accumulated log tag.
   ///
   /// Without any tags this is `[uuid:<id>]` if a request id is set, and the
   /// empty string otherwise.
   pub fn log_tag(&self) -> Cow<'_, str> {
      match (self.log_tag.as_deref(), self.uuid.as_deref()) {
         (Some(tag), _) => Cow::Borrowed(tag),
         (None, Some(uuid)) => Cow::Owned(format!("[{UUID_TAG}:{uuid}]")),
         (None, None) => Cow::Borrowed(""),
      }
   }

   /// Opens a `request` span carrying this context's id and tag.
   pub fn span(&self) -> tracing::Span {
      tracing::info_span!(
         "request",
         uuid = self.uuid.as_deref(),
         tag = %self.log_tag(),
      )
   }
}
