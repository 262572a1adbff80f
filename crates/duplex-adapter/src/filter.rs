//! Items the adapter never tracks

use duplex_types::{FileAttributes, PlaceholderState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Extensions of temporary files written by common applications
pub const DEFAULT_IGNORED_EXTENSIONS: &[&str] =
    &[".crdownload", ".download", ".partial", ".part", ".temp", ".tmp", ".~tmp"];

/// Decides which replica items are excluded from synchronization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemExclusionFilter {
    ignored_extensions: HashSet<String>,
    special_folder_names: HashSet<String>,
    ignore_office_temp_files: bool,
}

impl Default for ItemExclusionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORED_EXTENSIONS.iter().copied(), std::iter::empty::<&str>())
    }
}

impl ItemExclusionFilter {
    /// Create a filter. Extensions include the leading dot; both lists are matched
    /// case-insensitively.
    pub fn new<E, F>(ignored_extensions: E, special_folder_names: F) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        Self {
            ignored_extensions: ignored_extensions
                .into_iter()
                .map(|extension| extension.as_ref().to_lowercase())
                .collect(),
            special_folder_names: special_folder_names
                .into_iter()
                .map(|name| name.as_ref().to_lowercase())
                .collect(),
            ignore_office_temp_files: true,
        }
    }

    /// Enable or disable the Office lock and backup file patterns
    #[must_use]
    pub const fn with_office_temp_files_ignored(mut self, ignored: bool) -> Self {
        self.ignore_office_temp_files = ignored;
        self
    }

    /// Check whether an item must be ignored
    pub fn should_be_ignored(
        &self,
        name: &str,
        attributes: FileAttributes,
        placeholder_state: PlaceholderState,
        parent_is_sync_root: bool,
    ) -> bool {
        let is_directory = attributes.contains(FileAttributes::DIRECTORY);

        if placeholder_state.contains(PlaceholderState::INVALID)
            || attributes.contains(FileAttributes::DEVICE)
            || attributes.contains(FileAttributes::TEMPORARY)
        {
            return true;
        }
        if attributes.contains(FileAttributes::REPARSE_POINT)
            && !placeholder_state.contains(PlaceholderState::PLACEHOLDER)
        {
            return true;
        }
        if attributes.contains(FileAttributes::SYSTEM)
            && (!is_directory || attributes.contains(FileAttributes::HIDDEN))
        {
            return true;
        }
        if !is_directory
            && ((self.ignore_office_temp_files && is_office_temp_file(name))
                || self.has_ignored_extension(name))
        {
            return true;
        }

        is_directory && parent_is_sync_root && self.special_folder_names.contains(&name.to_lowercase())
    }

    fn has_ignored_extension(&self, name: &str) -> bool {
        name.rfind('.')
            .map(|index| name[index..].to_lowercase())
            .is_some_and(|extension| self.ignored_extensions.contains(&extension))
    }
}

fn is_office_temp_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    (lower.starts_with('~') && lower.ends_with(".tmp")) || lower.starts_with("~$") || lower.starts_with(".~")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const FILE: FileAttributes = FileAttributes::ARCHIVE;
    const DIR: FileAttributes = FileAttributes::DIRECTORY;

    fn filter() -> ItemExclusionFilter {
        ItemExclusionFilter::new([".tmp", ".BAK"], ["Recycle"])
    }

    #[rstest]
    #[case("report.docx", FILE, false)]
    #[case("~$report.docx", FILE, true)]
    #[case("~WRL0001.tmp", FILE, true)]
    #[case(".~lock.report#", FILE, true)]
    #[case("notes.Bak", FILE, true)]
    #[case("archive.bak", DIR, false)]
    #[case("~$folder", DIR, false)]
    fn test_names(#[case] name: &str, #[case] attributes: FileAttributes, #[case] ignored: bool) {
        assert_eq!(
            filter().should_be_ignored(name, attributes, PlaceholderState::NONE, false),
            ignored
        );
    }

    #[rstest]
    #[case(FILE | FileAttributes::SYSTEM, PlaceholderState::NONE, true)]
    #[case(DIR | FileAttributes::SYSTEM, PlaceholderState::NONE, false)]
    #[case(DIR | FileAttributes::SYSTEM | FileAttributes::HIDDEN, PlaceholderState::NONE, true)]
    #[case(FILE | FileAttributes::DEVICE, PlaceholderState::NONE, true)]
    #[case(FILE | FileAttributes::TEMPORARY, PlaceholderState::NONE, true)]
    #[case(FILE | FileAttributes::REPARSE_POINT, PlaceholderState::NONE, true)]
    #[case(FILE | FileAttributes::REPARSE_POINT, PlaceholderState::PLACEHOLDER, false)]
    #[case(FILE, PlaceholderState::PLACEHOLDER | PlaceholderState::INVALID, true)]
    fn test_attributes(
        #[case] attributes: FileAttributes,
        #[case] state: PlaceholderState,
        #[case] ignored: bool,
    ) {
        assert_eq!(filter().should_be_ignored("item", attributes, state, false), ignored);
    }

    #[test]
    fn test_office_patterns_can_be_disabled() {
        let filter = filter().with_office_temp_files_ignored(false);
        assert!(!filter.should_be_ignored("~$report.docx", FILE, PlaceholderState::NONE, false));
        assert!(filter.should_be_ignored("~WRL0001.tmp", FILE, PlaceholderState::NONE, false));
    }

    #[test]
    fn test_special_folders_only_directly_under_sync_root() {
        let filter = filter();
        assert!(filter.should_be_ignored("recycle", DIR, PlaceholderState::NONE, true));
        assert!(!filter.should_be_ignored("recycle", DIR, PlaceholderState::NONE, false));
        assert!(!filter.should_be_ignored("recycle", FILE, PlaceholderState::NONE, true));
    }
}
