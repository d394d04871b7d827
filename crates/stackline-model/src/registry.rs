//! Image registries and lifecycle rules.
//!
//! Lifecycle rules are evaluated in priority order. Each image is claimed
//! by the first rule whose selection matches it; a rule keeps the newest
//! `max_image_count` images it claimed and expires the rest. Images no
//! rule claims are kept, which is why a registry needs a terminal rule
//! selecting any image.

use serde::{Deserialize, Serialize};
use stackline_common::error::{Result, StacklineError};
use stackline_common::types::TagMutability;

const MIN_NAME_LEN: usize = 2;
const MAX_NAME_LEN: usize = 256;

/// An image registry (repository) with retention rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    /// Repository name.
    pub name: String,
    /// Whether tags may be moved between images.
    pub tag_mutability: TagMutability,
    /// Retention rules, sorted by ascending priority.
    pub lifecycle_rules: Vec<LifecycleRule>,
}

/// Which images a lifecycle rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagSelection {
    /// Every image.
    Any,
    /// Images carrying at least one tag with one of these prefixes.
    Tagged {
        /// Accepted tag prefixes.
        prefixes: Vec<String>,
    },
    /// Images without tags.
    Untagged,
}

impl TagSelection {
    /// Returns `true` if this selection matches an image with `tags`.
    #[must_use]
    pub fn matches(&self, tags: &[String]) -> bool {
        match self {
            Self::Any => true,
            Self::Untagged => tags.is_empty(),
            Self::Tagged { prefixes } => tags
                .iter()
                .any(|t| prefixes.iter().any(|p| t.starts_with(p.as_str()))),
        }
    }
}

/// A single retention rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRule {
    /// Evaluation priority, lowest first.
    pub priority: u32,
    /// Images the rule applies to.
    pub selection: TagSelection,
    /// Number of most recently pushed matching images to keep.
    pub max_image_count: u32,
}

impl LifecycleRule {
    /// Returns `true` if the rule claims every image it sees.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.selection == TagSelection::Any
    }
}

/// An image stored in a registry, as seen by lifecycle evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Content digest.
    pub digest: String,
    /// Tags currently pointing at this image.
    pub tags: Vec<String>,
    /// Monotonic push sequence; higher is newer.
    pub pushed_seq: u64,
}

impl Registry {
    /// Creates a registry without lifecycle rules.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::Config` if `name` is not a valid
    /// repository name.
    pub fn new(name: impl Into<String>, tag_mutability: TagMutability) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            tag_mutability,
            lifecycle_rules: Vec::new(),
        })
    }

    /// Adds a rule keeping at most `max_image_count` images of `selection`.
    ///
    /// Priorities are reassigned so that non-terminal rules are evaluated
    /// first, in insertion order, followed by the single terminal rule.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::Config` if `max_image_count` is zero or a
    /// second terminal rule is added.
    pub fn add_lifecycle_rule(
        &mut self,
        selection: TagSelection,
        max_image_count: u32,
    ) -> Result<()> {
        if max_image_count == 0 {
            return Err(StacklineError::Config {
                message: format!(
                    "lifecycle rule on \"{}\" must keep at least one image",
                    self.name
                ),
            });
        }
        let rule = LifecycleRule {
            priority: 0,
            selection,
            max_image_count,
        };
        if rule.is_terminal() {
            if self.has_terminal_rule() {
                return Err(StacklineError::Config {
                    message: format!(
                        "registry \"{}\" already has a rule selecting any image",
                        self.name
                    ),
                });
            }
            self.lifecycle_rules.push(rule);
        } else {
            let at = self
                .lifecycle_rules
                .iter()
                .position(LifecycleRule::is_terminal)
                .unwrap_or(self.lifecycle_rules.len());
            self.lifecycle_rules.insert(at, rule);
        }
        for (rule, priority) in self.lifecycle_rules.iter_mut().zip(1..) {
            rule.priority = priority;
        }
        tracing::debug!(
            registry = %self.name,
            rules = self.lifecycle_rules.len(),
            "lifecycle rule added"
        );
        Ok(())
    }

    /// Returns `true` if some rule bounds every image.
    #[must_use]
    pub fn has_terminal_rule(&self) -> bool {
        self.lifecycle_rules.iter().any(LifecycleRule::is_terminal)
    }

    /// Returns the images the lifecycle rules expire, newest first.
    #[must_use]
    pub fn expired_images<'a>(&self, images: &'a [ImageRecord]) -> Vec<&'a ImageRecord> {
        let mut newest_first: Vec<&ImageRecord> = images.iter().collect();
        newest_first.sort_by(|a, b| b.pushed_seq.cmp(&a.pushed_seq));

        let mut claimed = vec![false; newest_first.len()];
        let mut expired = Vec::new();
        for rule in &self.lifecycle_rules {
            let mut kept = 0_u32;
            for (idx, image) in newest_first.iter().enumerate() {
                if claimed[idx] || !rule.selection.matches(&image.tags) {
                    continue;
                }
                claimed[idx] = true;
                if kept < rule.max_image_count {
                    kept += 1;
                } else {
                    expired.push(*image);
                }
            }
        }
        expired.sort_by(|a, b| b.pushed_seq.cmp(&a.pushed_seq));
        expired
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid_chars = name.chars().all(|c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-' | '/')
    });
    let valid_start = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if (MIN_NAME_LEN..=MAX_NAME_LEN).contains(&name.len()) && valid_chars && valid_start {
        Ok(())
    } else {
        Err(StacklineError::Config {
            message: format!("invalid repository name: \"{name}\""),
        })
    }
}
