//! Upload policy: which files may be uploaded, and where they land.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Content types accepted when no allow-list is configured.
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/svg+xml",
    "application/json",
    "text/plain",
];

/// Upload size ceiling when none is configured (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// Which bucket an object belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    /// Served without authentication.
    Public,
    /// Served only to its owner.
    #[default]
    Private,
    /// Admin-only assets.
    AdminPrivate,
}

/// Bucket names per visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buckets {
    /// Bucket for [`Visibility::Public`].
    pub public: String,
    /// Bucket for [`Visibility::Private`].
    pub private: String,
    /// Bucket for [`Visibility::AdminPrivate`].
    pub admin: String,
}

impl Buckets {
    /// The bucket holding objects of the given visibility.
    #[must_use]
    pub fn for_visibility(&self, visibility: Visibility) -> &str {
        match visibility {
            Visibility::Public => &self.public,
            Visibility::Private => &self.private,
            Visibility::AdminPrivate => &self.admin,
        }
    }
}

/// What a client asks to upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// Feature area the file belongs to, e.g. `tools`.
    pub module: String,
    /// Original file name.
    pub filename: String,
    /// MIME type the client will send.
    pub content_type: String,
    /// Declared size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    /// Target visibility, `private` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

/// Why an upload request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// A required field is empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// The content type is not on the allow-list.
    #[error("content type \"{content_type}\" is not allowed. Allowed types: {allowed}")]
    ContentTypeNotAllowed {
        /// The rejected type.
        content_type: String,
        /// Comma separated allow-list.
        allowed: String,
    },

    /// The declared size exceeds the ceiling.
    #[error("file size exceeds maximum allowed size of {max_mib}MB")]
    TooLarge {
        /// Ceiling in MiB.
        max_mib: u64,
    },

    /// Clients may not target admin-only storage.
    #[error("visibility admin-private is not available for uploads")]
    VisibilityNotAllowed,
}

/// Allow-list and size ceiling for client uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Accepted MIME types.
    pub allowed_content_types: Vec<String>,
    /// Largest declared size accepted.
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_content_types: DEFAULT_ALLOWED_CONTENT_TYPES
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl UploadPolicy {
    /// Check a request and return the visibility it resolves to.
    ///
    /// # Errors
    ///
    /// Returns an [`UploadError`] for the first rule the request breaks.
    pub fn check(&self, request: &UploadRequest) -> Result<Visibility, UploadError> {
        if request.module.trim().is_empty() {
            return Err(UploadError::MissingField("module"));
        }
        if request.filename.trim().is_empty() {
            return Err(UploadError::MissingField("filename"));
        }
        if request.content_type.trim().is_empty() {
            return Err(UploadError::MissingField("contentType"));
        }

        if !self
            .allowed_content_types
            .iter()
            .any(|t| t == &request.content_type)
        {
            return Err(UploadError::ContentTypeNotAllowed {
                content_type: request.content_type.clone(),
                allowed: self.allowed_content_types.join(", "),
            });
        }

        if request.content_length.is_some_and(|len| len > self.max_bytes) {
            return Err(UploadError::TooLarge {
                max_mib: self.max_bytes / 1024 / 1024,
            });
        }

        match request.visibility.unwrap_or_default() {
            Visibility::AdminPrivate => Err(UploadError::VisibilityNotAllowed),
            visibility => Ok(visibility),
        }
    }
}

/// Object key for a new upload: `{user}/{module}/{millis}_{filename}`.
///
/// Characters outside `[A-Za-z0-9._-]` in the file name become `_`.
#[must_use]
pub fn storage_key(user_id: &UserId, module: &str, filename: &str, unix_millis: i64) -> String {
    let sanitized: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{user_id}/{module}/{unix_millis}_{sanitized}")
}

/// Whether `key` is an object the user uploaded, i.e. lives under their
/// `{user}/` prefix.
#[must_use]
pub fn is_owned_key(user_id: &UserId, key: &str) -> bool {
    let prefix = format!("{user_id}/");
    key.strip_prefix(&prefix).is_some_and(|rest| {
        !rest.is_empty() && rest.split('/').all(|part| !part.is_empty() && part != "..")
    })
}
