//! In-memory image repository enforcing lifecycle rules on push.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use stackline_common::error::{Result, StacklineError};
use stackline_common::types::TagMutability;
use stackline_model::registry::{ImageRecord, Registry};

/// Result of a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReceipt {
    /// Digest of the pushed image.
    pub digest: String,
    /// Push sequence number.
    pub pushed_seq: u64,
    /// When the push was accepted.
    pub pushed_at: DateTime<Utc>,
    /// Digests expired by the lifecycle rules after this push, newest first.
    pub expired: Vec<String>,
}

/// A repository holding images for one [`Registry`].
#[derive(Debug, Clone)]
pub struct ImageRepository {
    registry: Registry,
    images: Vec<ImageRecord>,
    next_seq: u64,
}

impl ImageRepository {
    /// Creates an empty repository governed by `registry`.
    #[must_use]
    pub const fn new(registry: Registry) -> Self {
        Self {
            registry,
            images: Vec::new(),
            next_seq: 1,
        }
    }

    /// Repository name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.registry.name
    }

    /// Pushes `content` under `tag` and applies the lifecycle rules.
    ///
    /// Pushing content that is already stored only moves the tag.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::Deploy` if the repository is immutable and
    /// `tag` already names a different image.
    pub fn push(&mut self, tag: &str, content: &[u8]) -> Result<PushReceipt> {
        let digest = content_digest(content);
        let current = self.resolve(tag).map(|img| img.digest.clone());
        if self.registry.tag_mutability == TagMutability::Immutable
            && current.as_ref().is_some_and(|d| d != &digest)
        {
            return Err(StacklineError::Deploy {
                message: format!(
                    "tag \"{tag}\" already exists in immutable repository \"{}\"",
                    self.registry.name
                ),
            });
        }

        for image in &mut self.images {
            image.tags.retain(|t| t != tag);
        }
        let pushed_seq = self.next_seq;
        self.next_seq += 1;
        if let Some(existing) = self.images.iter_mut().find(|img| img.digest == digest) {
            existing.tags.push(tag.to_string());
            existing.pushed_seq = pushed_seq;
        } else {
            self.images.push(ImageRecord {
                digest: digest.clone(),
                tags: vec![tag.to_string()],
                pushed_seq,
            });
        }

        let expired: Vec<String> = self
            .registry
            .expired_images(&self.images)
            .into_iter()
            .map(|img| img.digest.clone())
            .collect();
        self.images.retain(|img| !expired.contains(&img.digest));
        tracing::info!(
            repository = %self.registry.name,
            tag,
            %digest,
            expired = expired.len(),
            "image pushed"
        );
        Ok(PushReceipt {
            digest,
            pushed_seq,
            pushed_at: Utc::now(),
            expired,
        })
    }

    /// Image currently tagged `tag`.
    #[must_use]
    pub fn resolve(&self, tag: &str) -> Option<&ImageRecord> {
        self.images.iter().find(|img| img.tags.iter().any(|t| t == tag))
    }

    /// Stored images, oldest push first.
    #[must_use]
    pub fn images(&self) -> Vec<&ImageRecord> {
        let mut images: Vec<&ImageRecord> = self.images.iter().collect();
        images.sort_by_key(|img| img.pushed_seq);
        images
    }
}

/// `sha256:`-prefixed hex digest of `content`.
#[must_use]
pub fn content_digest(content: &[u8]) -> String {
    let hash = Sha256::digest(content);
    let hex: String = hash.iter().map(|b| format!("{b:02x}")).collect();
    format!("sha256:{hex}")
}
