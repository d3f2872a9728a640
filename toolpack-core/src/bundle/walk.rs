use super::{normalize_path, BundleEntry, ResourceBundle};
use crate::error::Result;

/// Lazy depth-first traversal of a bundle subtree.
///
/// Yields `(relative_path, entry)` for every directory and file below the
/// root, parents before children, siblings in name order. The root itself
/// is not yielded. After an error the traversal ends.
pub struct Walk<'a> {
    bundle: &'a dyn ResourceBundle,
    root: String,
    // Pending entries, next one on top.
    stack: Vec<BundleEntry>,
}

impl<'a> Walk<'a> {
    /// Starts a traversal. Fails up front if `root` is not a directory.
    pub fn new(bundle: &'a dyn ResourceBundle, root: &str) -> Result<Self> {
        let root = normalize_path(root)?;
        let mut stack = bundle.list(&root)?;
        stack.reverse();

        Ok(Self {
            bundle,
            root,
            stack,
        })
    }

    fn relative(&self, path: &str) -> String {
        if self.root.is_empty() {
            return path.to_string();
        }
        path.strip_prefix(self.root.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(path)
            .to_string()
    }
}

impl Iterator for Walk<'_> {
    type Item = Result<(String, BundleEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.stack.pop()?;

        if entry.is_directory {
            match self.bundle.list(&entry.path) {
                Ok(mut children) => {
                    children.reverse();
                    self.stack.extend(children);
                }
                Err(e) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
            }
        }

        Some(Ok((self.relative(&entry.path), entry)))
    }
}

impl std::iter::FusedIterator for Walk<'_> {}

#[cfg(test)]
mod tests {
    use super::super::EmbeddedBundle;
    use super::*;
    use crate::error::Error;

    fn sample() -> EmbeddedBundle {
        let mut bundle = EmbeddedBundle::new();
        bundle.insert("tool.bin", b"0123456789".to_vec(), true).unwrap();
        bundle.insert("suite/helper.bin", b"helper".to_vec(), true).unwrap();
        bundle.insert("suite/lib/data.bin", b"data".to_vec(), false).unwrap();
        bundle.insert("suite/lib/z/deep.bin", b"deep".to_vec(), false).unwrap();
        bundle.insert("suite/a.txt", b"a".to_vec(), false).unwrap();
        bundle
    }

    fn paths(walk: Walk<'_>) -> Vec<String> {
        walk.map(|item| item.unwrap().0).collect()
    }

    #[test]
    fn test_walk_is_depth_first_name_ordered() {
        let bundle = sample();
        let walked = paths(bundle.walk("suite").unwrap());
        assert_eq!(
            walked,
            vec!["a.txt", "helper.bin", "lib", "lib/data.bin", "lib/z", "lib/z/deep.bin"]
        );
    }

    #[test]
    fn test_walk_from_root() {
        let bundle = sample();
        let walked = paths(bundle.walk("").unwrap());
        assert_eq!(walked.first().map(String::as_str), Some("suite"));
        assert_eq!(walked.last().map(String::as_str), Some("tool.bin"));
        assert_eq!(walked.len(), 8);
    }

    #[test]
    fn test_walk_yields_full_entries() {
        let bundle = sample();
        let (rel, entry) = bundle
            .walk("suite/lib")
            .unwrap()
            .map(Result::unwrap)
            .find(|(_, e)| !e.is_directory)
            .unwrap();
        assert_eq!(rel, "data.bin");
        assert_eq!(entry.path, "suite/lib/data.bin");
    }

    #[test]
    fn test_walk_missing_root() {
        let bundle = sample();
        let err = bundle.walk("nope").err().unwrap();
        assert!(matches!(err, Error::NotFound { .. }), "got {err:?}");
    }

    #[test]
    fn test_walk_file_root_is_not_found() {
        let bundle = sample();
        assert!(bundle.walk("tool.bin").is_err());
    }
}
