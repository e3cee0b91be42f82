//! Signed direct uploads to Cloudinary.
//!
//! Clients upload media straight to Cloudinary using a short-lived
//! signature, so the API secret never leaves the gateway.

use comms_core::{MediaKind, SignedUpload, UploadSigner};
use sha1::{Digest, Sha1};
use std::fmt;
use time::OffsetDateTime;
use tracing::debug;

const PROVIDER: &str = "cloudinary";

pub const DEFAULT_AUDIO_FOLDER: &str = "commskit/audio";
pub const DEFAULT_IMAGE_FOLDER: &str = "commskit/images";

#[derive(Clone)]
pub struct CloudinarySigner {
    pub cloud_name: String,
    pub api_key: String,
    api_secret: String,
    pub audio_folder: String,
    pub image_folder: String,
}

impl fmt::Debug for CloudinarySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinarySigner")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("audio_folder", &self.audio_folder)
            .field("image_folder", &self.image_folder)
            .finish()
    }
}

impl CloudinarySigner {
    pub fn new<S: Into<String>>(cloud_name: S, api_key: S, api_secret: S) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            audio_folder: DEFAULT_AUDIO_FOLDER.to_string(),
            image_folder: DEFAULT_IMAGE_FOLDER.to_string(),
        }
    }

    pub fn with_folders<S: Into<String>>(mut self, audio_folder: S, image_folder: S) -> Self {
        self.audio_folder = audio_folder.into();
        self.image_folder = image_folder.into();
        self
    }

    pub fn folder(&self, kind: MediaKind) -> &str {
        match kind {
            MediaKind::Audio => &self.audio_folder,
            MediaKind::Image => &self.image_folder,
        }
    }

    /// Sign an upload of `kind` as of `timestamp` (Unix seconds).
    pub fn sign_at(&self, kind: MediaKind, timestamp: i64) -> SignedUpload {
        let folder = self.folder(kind).to_string();
        // Parameters are sorted by name and the secret is appended unseparated.
        let to_sign = format!("folder={}&timestamp={}{}", folder, timestamp, self.api_secret);
        let mut hasher = Sha1::new();
        hasher.update(to_sign.as_bytes());
        let signature = format!("{:x}", hasher.finalize());

        debug!("signed {:?} upload into {}", kind, folder);
        SignedUpload {
            timestamp,
            signature,
            api_key: self.api_key.clone(),
            cloud_name: self.cloud_name.clone(),
            folder,
        }
    }
}

impl UploadSigner for CloudinarySigner {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn sign(&self, kind: MediaKind) -> SignedUpload {
        self.sign_at(kind, OffsetDateTime::now_utc().unix_timestamp())
    }
}
