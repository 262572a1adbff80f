//! Conflict names generated from templates
//!
//! A template is plain text with placeholders:
//!
//! - `{OriginalName}`: the name without its extension (files) or the whole name (directories)
//! - `{.Extension}`: the extension including its dot, empty for directories
//! - `{CurrentDate}` and `{CurrentTime}`: local time as `YYYY-MM-DD` and `HHmmss`
//! - `{Id}`: the node id
//! - `{RandomSuffix}`: lowercase alphanumerics derived from the node id

use chrono::{Local, NaiveDateTime};
use duplex_types::{Error, FileNameFactory, NodeId, NodeType, Result};
use std::fmt;
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Original name placeholder, required in every template
pub const ORIGINAL_NAME_PLACEHOLDER: &str = "{OriginalName}";
/// Extension placeholder
pub const EXTENSION_PLACEHOLDER: &str = "{.Extension}";
/// Current date placeholder
pub const CURRENT_DATE_PLACEHOLDER: &str = "{CurrentDate}";
/// Current time placeholder
pub const CURRENT_TIME_PLACEHOLDER: &str = "{CurrentTime}";
/// Node id placeholder
pub const ID_PLACEHOLDER: &str = "{Id}";
/// Suffix placeholder
pub const RANDOM_SUFFIX_PLACEHOLDER: &str = "{RandomSuffix}";

/// Template for nodes renamed because of a name clash
pub const NAME_CLASH_TEMPLATE: &str =
    "{OriginalName} (# Name clash {CurrentDate} {RandomSuffix}C #){.Extension}";
/// Template for nodes restored or moved away because of a deletion
pub const DELETE_CONFLICT_TEMPLATE: &str =
    "{OriginalName} (# Delete conflict {CurrentDate} {RandomSuffix}C #){.Extension}";
/// Template for the preserved copy of an edit conflict loser
pub const EDIT_CONFLICT_TEMPLATE: &str =
    "{OriginalName} (# Edit conflict {CurrentDate} {RandomSuffix}C #){.Extension}";

/// Longest name the factory produces, in characters
pub const DEFAULT_MAX_NAME_LENGTH: usize = 255;
/// Length of `{RandomSuffix}`
pub const DEFAULT_SUFFIX_LENGTH: usize = 5;

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// [`FileNameFactory`] filling a name template
#[derive(Debug, Clone)]
pub struct ConflictNameFactory {
    template: String,
    max_name_length: usize,
    suffix_length: usize,
    fixed_time: Option<NaiveDateTime>,
}

impl ConflictNameFactory {
    /// Create a factory; the template must contain `{OriginalName}`
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains(ORIGINAL_NAME_PLACEHOLDER) {
            return Err(Error::config(format!(
                "Name template \"{}\" does not contain {}",
                template, ORIGINAL_NAME_PLACEHOLDER
            )));
        }
        Ok(Self {
            template,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            suffix_length: DEFAULT_SUFFIX_LENGTH,
            fixed_time: None,
        })
    }

    /// Set the longest name produced
    pub const fn with_max_name_length(mut self, max_name_length: usize) -> Self {
        self.max_name_length = max_name_length;
        self
    }

    /// Set the length of `{RandomSuffix}`
    pub const fn with_suffix_length(mut self, suffix_length: usize) -> Self {
        self.suffix_length = suffix_length;
        self
    }

    /// Use `time` instead of the current local time
    pub const fn at(mut self, time: NaiveDateTime) -> Self {
        self.fixed_time = Some(time);
        self
    }

    /// The template
    pub fn template(&self) -> &str {
        &self.template
    }

    fn generate(&self, id: NodeId, original_name: &str, extension: &str, now: NaiveDateTime) -> String {
        self.template
            .replace(ORIGINAL_NAME_PLACEHOLDER, original_name)
            .replace(EXTENSION_PLACEHOLDER, extension)
            .replace(CURRENT_DATE_PLACEHOLDER, &now.format("%Y-%m-%d").to_string())
            .replace(CURRENT_TIME_PLACEHOLDER, &now.format("%H%M%S").to_string())
            .replace(ID_PLACEHOLDER, &id.to_string())
            .replace(RANDOM_SUFFIX_PLACEHOLDER, &self.suffix(id))
    }

    fn suffix(&self, id: NodeId) -> String {
        let bytes = id.get().to_le_bytes();
        let mut suffix = String::with_capacity(self.suffix_length);
        let mut round = 0u64;
        while suffix.len() < self.suffix_length {
            // 36^12 fits in 64 bits
            let mut hash = xxh3_64_with_seed(&bytes, round);
            for _ in 0..12 {
                if suffix.len() == self.suffix_length {
                    break;
                }
                suffix.push(char::from(SUFFIX_ALPHABET[(hash % 36) as usize]));
                hash /= 36;
            }
            round += 1;
        }
        suffix
    }
}

impl FileNameFactory for ConflictNameFactory {
    fn name_for(&self, id: NodeId, name: &str, node_type: NodeType) -> String {
        let now = self.fixed_time.unwrap_or_else(|| Local::now().naive_local());
        let (mut original_name, mut extension) = match node_type {
            NodeType::File => split_extension(name),
            NodeType::Directory => (name, ""),
        };

        let length = self.generate(id, original_name, extension, now).chars().count();
        let excess = length.saturating_sub(self.max_name_length);
        if excess > original_name.chars().count() {
            original_name = name;
            extension = "";
        }

        let length = self.generate(id, original_name, extension, now).chars().count();
        let excess = length.saturating_sub(self.max_name_length);
        let kept = original_name.chars().count().saturating_sub(excess);
        let truncated: String = original_name.chars().take(kept).collect();

        self.generate(id, &truncated, extension, now)
    }
}

/// Split `name` into the part before its last dot and the extension with the dot.
/// Names starting with their only dot have no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    }
}

/// The name factories conflict resolution uses
#[derive(Clone)]
pub struct ConflictNaming {
    /// Names for nodes losing a name clash
    pub name_clash: Arc<dyn FileNameFactory>,
    /// Names for nodes moved to the sync root by a deletion conflict
    pub delete_conflict: Arc<dyn FileNameFactory>,
    /// Names for the preserved copy of an edit conflict loser
    pub edit_conflict: Arc<dyn FileNameFactory>,
}

impl ConflictNaming {
    /// Factories from templates
    pub fn from_templates(
        name_clash: &str,
        delete_conflict: &str,
        edit_conflict: &str,
        max_name_length: usize,
        suffix_length: usize,
    ) -> Result<Self> {
        let factory = |template: &str| -> Result<Arc<dyn FileNameFactory>> {
            Ok(Arc::new(
                ConflictNameFactory::new(template)?
                    .with_max_name_length(max_name_length)
                    .with_suffix_length(suffix_length),
            ))
        };
        Ok(Self {
            name_clash: factory(name_clash)?,
            delete_conflict: factory(delete_conflict)?,
            edit_conflict: factory(edit_conflict)?,
        })
    }
}

impl Default for ConflictNaming {
    fn default() -> Self {
        let factory = |template: &str| -> Arc<dyn FileNameFactory> {
            Arc::new(ConflictNameFactory {
                template: template.to_string(),
                max_name_length: DEFAULT_MAX_NAME_LENGTH,
                suffix_length: DEFAULT_SUFFIX_LENGTH,
                fixed_time: None,
            })
        };
        Self {
            name_clash: factory(NAME_CLASH_TEMPLATE),
            delete_conflict: factory(DELETE_CONFLICT_TEMPLATE),
            edit_conflict: factory(EDIT_CONFLICT_TEMPLATE),
        }
    }
}

impl fmt::Debug for ConflictNaming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictNaming").finish_non_exhaustive()
    }
}
