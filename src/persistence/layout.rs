//! Paths of every persisted file under a state directory.

use std::path::{Path, PathBuf};

use crate::types::Category;

/// Resolves state file locations relative to one root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StateLayout { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn progress_path(&self) -> PathBuf {
        self.root.join("progress.json")
    }

    pub fn processed_path(&self, category: &Category) -> PathBuf {
        self.root.join("processed").join(format!("{category}.log"))
    }

    /// Directory holding one `<category>_vendors.json` per category.
    pub fn vendors_dir(&self) -> PathBuf {
        self.root.join("vendors")
    }

    pub fn errors_path(&self, category: &Category) -> PathBuf {
        self.root.join("errors").join(format!("{category}.log"))
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.root.join("exports")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_scoped_by_category() {
        let layout = StateLayout::new("/var/lib/harvest");
        let category = Category::parse("auto-repair").unwrap();

        assert_eq!(
            layout.processed_path(&category),
            PathBuf::from("/var/lib/harvest/processed/auto-repair.log")
        );
        assert_eq!(
            layout.errors_path(&category),
            PathBuf::from("/var/lib/harvest/errors/auto-repair.log")
        );
        assert_eq!(layout.progress_path(), PathBuf::from("/var/lib/harvest/progress.json"));
    }
}
