use std::borrow::Cow;
use std::collections::BTreeMap;

use super::{normalize_path, BundleEntry, ResourceBundle, Walk};
use crate::error::{Error, Result};

/// A file compiled into the binary by the build script.
#[derive(Debug, Clone, Copy)]
pub struct BundledFile {
    pub path: &'static str,
    pub executable: bool,
    pub data: &'static [u8],
}

mod generated {
    use super::BundledFile;

    include!(concat!(env!("OUT_DIR"), "/bundled_files.rs"));
}

#[derive(Debug, Clone)]
struct StoredFile {
    data: Cow<'static, [u8]>,
    executable: bool,
}

/// An in-memory bundle.
///
/// [`EmbeddedBundle::for_current_platform`] serves the files the build
/// script embedded for this target without copying them. Bundles can also be
/// assembled at runtime with [`EmbeddedBundle::insert`].
#[derive(Debug, Clone, Default)]
pub struct EmbeddedBundle {
    files: BTreeMap<String, StoredFile>,
}

impl EmbeddedBundle {
    /// Creates an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundle embedded for the platform this binary targets.
    pub fn for_current_platform() -> Self {
        Self::from_static(generated::BUNDLED_FILES)
    }

    /// Bundle directory name the embedded files came from, or `""` when the
    /// target has no bundle layout.
    pub fn embedded_platform() -> &'static str {
        generated::BUNDLE_PLATFORM
    }

    /// Wraps a static file table. Entries with invalid paths are skipped.
    pub fn from_static(files: &'static [BundledFile]) -> Self {
        let files = files
            .iter()
            .filter_map(|file| {
                let path = normalize_path(file.path).ok().filter(|p| !p.is_empty())?;
                Some((
                    path,
                    StoredFile {
                        data: Cow::Borrowed(file.data),
                        executable: file.executable,
                    },
                ))
            })
            .collect();
        Self { files }
    }

    /// Adds or replaces a file. Parent directories are implied.
    pub fn insert(
        &mut self,
        path: &str,
        data: impl Into<Cow<'static, [u8]>>,
        executable: bool,
    ) -> Result<()> {
        let path = normalize_path(path)?;
        if path.is_empty() {
            return Err(Error::InvalidName {
                name: path,
                reason: "empty path",
            });
        }

        self.files.insert(
            path,
            StoredFile {
                data: data.into(),
                executable,
            },
        );
        Ok(())
    }

    /// Number of files (directories are implicit and not counted).
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ResourceBundle for EmbeddedBundle {
    fn list(&self, dir: &str) -> Result<Vec<BundleEntry>> {
        let dir = normalize_path(dir)?;
        if self.files.contains_key(&dir) {
            return Err(Error::not_in_bundle(format!("directory {dir}")));
        }

        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };

        let mut children: BTreeMap<&str, BundleEntry> = BTreeMap::new();
        for (path, file) in self
            .files
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
        {
            let rest = &path[prefix.len()..];
            match rest.split_once('/') {
                Some((child, _)) => {
                    children
                        .entry(child)
                        .or_insert_with(|| BundleEntry::directory(format!("{prefix}{child}")));
                }
                None => {
                    children.insert(rest, BundleEntry::file(path.clone(), file.executable));
                }
            }
        }

        if children.is_empty() && !dir.is_empty() {
            return Err(Error::not_in_bundle(format!("directory {dir}")));
        }

        Ok(children.into_values().collect())
    }

    fn read(&self, path: &str) -> Result<Cow<'_, [u8]>> {
        let path = normalize_path(path)?;
        self.files
            .get(&path)
            .map(|file| Cow::Borrowed(file.data.as_ref()))
            .ok_or_else(|| Error::not_in_bundle(path))
    }

    fn walk(&self, root: &str) -> Result<Walk<'_>> {
        Walk::new(self, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TABLE: &[BundledFile] = &[
        BundledFile {
            path: "transcoder",
            executable: true,
            data: b"\x7fELF-ish",
        },
        BundledFile {
            path: "inference/runtime",
            executable: true,
            data: b"runtime",
        },
        BundledFile {
            path: "inference/models/weights.bin",
            executable: false,
            data: b"weights",
        },
        BundledFile {
            path: "../escape",
            executable: false,
            data: b"nope",
        },
    ];

    #[test]
    fn test_from_static_skips_invalid_paths() {
        let bundle = EmbeddedBundle::from_static(TABLE);
        assert_eq!(bundle.len(), 3);
        assert!(bundle.read("../escape").is_err());
    }

    #[test]
    fn test_list_root() {
        let bundle = EmbeddedBundle::from_static(TABLE);
        let entries = bundle.list("").unwrap();
        assert_eq!(
            entries,
            vec![
                BundleEntry::directory("inference"),
                BundleEntry::file("transcoder", true),
            ]
        );
    }

    #[test]
    fn test_list_subdirectory() {
        let bundle = EmbeddedBundle::from_static(TABLE);
        let entries = bundle.list("inference").unwrap();
        assert_eq!(
            entries,
            vec![
                BundleEntry::directory("inference/models"),
                BundleEntry::file("inference/runtime", true),
            ]
        );
    }

    #[test]
    fn test_list_missing_or_file_is_not_found() {
        let bundle = EmbeddedBundle::from_static(TABLE);
        assert!(bundle.list("missing").unwrap_err().is_not_found());
        assert!(bundle.list("transcoder").unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_does_not_match_sibling_prefixes() {
        let mut bundle = EmbeddedBundle::new();
        bundle.insert("lib/a", b"a".to_vec(), false).unwrap();
        bundle.insert("lib-extra/b", b"b".to_vec(), false).unwrap();

        let entries = bundle.list("lib").unwrap();
        assert_eq!(entries, vec![BundleEntry::file("lib/a", false)]);
    }

    #[test]
    fn test_read() {
        let bundle = EmbeddedBundle::from_static(TABLE);
        assert_eq!(bundle.read("inference/runtime").unwrap().as_ref(), b"runtime");
        assert!(bundle.read("inference").unwrap_err().is_not_found());
        assert!(bundle.read("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_empty_bundle_lists_empty_root() {
        let bundle = EmbeddedBundle::new();
        assert!(bundle.list("").unwrap().is_empty());
        assert!(bundle.is_empty());
    }

    #[test]
    fn test_insert_rejects_empty_path() {
        let mut bundle = EmbeddedBundle::new();
        assert!(bundle.insert("", b"x".to_vec(), false).is_err());
        assert!(bundle.insert("./", b"x".to_vec(), false).is_err());
    }

    #[test]
    fn test_current_platform_bundle_is_well_formed() {
        let bundle = EmbeddedBundle::for_current_platform();
        for item in bundle.walk("").unwrap() {
            let (rel, entry) = item.unwrap();
            assert_eq!(rel, entry.path);
            if !entry.is_directory {
                assert!(bundle.read(&entry.path).is_ok());
            }
        }
    }
}
