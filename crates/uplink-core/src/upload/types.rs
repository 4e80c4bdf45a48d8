//! Core domain types for uploads.
//!
//! Pure data types with no I/O dependencies.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque unique identifier for a queued upload.
///
/// Generated at enqueue time and never reused, so it is safe to hold on to an
/// id after the item has been removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(uuid::Uuid);

impl UploadId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UploadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

/// A locally-available byte payload destined for the object store.
///
/// The bytes are reference counted, so cloning a payload is cheap. The queue
/// holds the only long-lived handle once the payload has been enqueued.
#[derive(Clone, Debug)]
pub struct UploadPayload {
    /// Original file name (used for the metadata record and the remote extension).
    pub name: String,
    /// Declared MIME type (e.g. `image/png`).
    pub content_type: String,
    /// Payload contents.
    pub bytes: Bytes,
    /// Destination folder in the metadata store (`None` = root).
    pub folder_id: Option<String>,
}

impl UploadPayload {
    /// Create a payload destined for the root folder.
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
            folder_id: None,
        }
    }

    /// Set the destination folder.
    #[must_use]
    pub fn with_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    /// Declared byte length.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the payload has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the declared type is an image type.
    #[must_use]
    pub fn is_image(&self) -> bool {
        is_image_type(&self.content_type)
    }

    /// File extension taken from the name (text after the last `.`).
    ///
    /// Returns `None` for names without a dot or with a trailing dot.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }
}

/// Check whether a MIME type denotes an image.
#[must_use]
pub fn is_image_type(content_type: &str) -> bool {
    content_type
        .trim()
        .to_ascii_lowercase()
        .starts_with("image/")
}

/// Record written to the metadata store once an upload has landed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Owning user id.
    pub owner_id: String,
    /// Original file name.
    pub name: String,
    /// Final size in bytes (after transform).
    pub size: u64,
    /// Final content type (after transform).
    pub content_type: String,
    /// Remote storage path used by the transfer.
    pub remote_path: String,
    /// Destination folder (`None` = root).
    pub folder_id: Option<String>,
}
