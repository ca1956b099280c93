//! Change detection against the persisted fingerprint table

use super::scanner::{scan_files, ScanOptions};
use crate::db::Database;
use crate::error::Result;
use crate::language::LanguageRegistry;
use crate::model::Snippet;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Outcome of comparing a file's fresh hash with the stored one
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Hash unchanged; the last persisted snippets of the file
    Reuse(Vec<Snippet>),
    /// New or modified; must be parsed again
    Reparse,
}

/// Per-run state for one encountered file
#[derive(Debug, Clone)]
pub struct FileState {
    pub relative_path: String,
    pub path: PathBuf,
    pub hash: String,
    pub classification: Classification,
    /// Decoded source; `None` when the file is not valid UTF-8
    pub source: Option<String>,
}

/// Everything the rest of the run needs to know about the tree on disk.
///
/// Lives for one indexing run.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub files: Vec<FileState>,
    pub changed_files: BTreeSet<String>,
    /// Fresh hash of every encountered file
    pub fresh_hashes: BTreeMap<String, String>,
    /// Fingerprints as stored before this run
    pub previous_hashes: HashMap<String, String>,
    /// Files that could not be read
    pub read_failures: Vec<(String, String)>,
}

impl ChangeSet {
    pub fn reused_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.classification, Classification::Reuse(_)))
            .count()
    }

    /// Every encountered file, including those that failed to read
    pub fn encountered(&self) -> BTreeSet<String> {
        self.fresh_hashes.keys().cloned().collect()
    }

    /// Treat a changed file as if this run never saw its new content:
    /// restore the previous fingerprint and reuse the persisted snippets.
    pub fn revert(&mut self, relative_path: &str, persisted: Vec<Snippet>) {
        self.changed_files.remove(relative_path);
        match self.previous_hashes.get(relative_path) {
            Some(old) => {
                self.fresh_hashes
                    .insert(relative_path.to_string(), old.clone());
            }
            None => {
                self.fresh_hashes.remove(relative_path);
            }
        }
        if let Some(state) = self
            .files
            .iter_mut()
            .find(|f| f.relative_path == relative_path)
        {
            state.classification = Classification::Reuse(persisted);
            state.source = None;
        }
    }
}

/// Fingerprint of raw file bytes
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

pub struct ChangeDetector<'a> {
    registry: &'a LanguageRegistry,
    options: ScanOptions,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(registry: &'a LanguageRegistry, options: ScanOptions) -> Self {
        Self { registry, options }
    }

    /// Walk `root` and classify every supported file
    pub fn detect(&self, root: &Path, db: &Database) -> Result<ChangeSet> {
        let previous_hashes = db.get_all_fingerprints()?;
        let mut set = ChangeSet {
            previous_hashes,
            ..Default::default()
        };

        for entry in scan_files(root, &self.options)? {
            if !self.registry.is_supported(&entry.path) {
                continue;
            }
            let relative = entry.relative_path;

            let bytes = match std::fs::read(&entry.path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(file = %relative, "failed to read file: {}", e);
                    set.read_failures.push((relative.clone(), e.to_string()));
                    // keep what was indexed before so cleanup leaves it alone
                    if let Some(old) = set.previous_hashes.get(&relative).cloned() {
                        set.fresh_hashes.insert(relative.clone(), old.clone());
                        set.files.push(FileState {
                            classification: Classification::Reuse(
                                db.get_snippets_by_file(&relative)?,
                            ),
                            relative_path: relative,
                            path: entry.path,
                            hash: old,
                            source: None,
                        });
                    }
                    continue;
                }
            };
            let hash = fingerprint_bytes(&bytes);
            let classification = self.classify(&relative, &hash, &set.previous_hashes, db)?;

            if classification == Classification::Reparse {
                set.changed_files.insert(relative.clone());
            }
            set.fresh_hashes.insert(relative.clone(), hash.clone());
            set.files.push(FileState {
                relative_path: relative,
                path: entry.path,
                hash,
                classification,
                source: String::from_utf8(bytes).ok(),
            });
        }

        tracing::debug!(
            files = set.files.len(),
            changed = set.changed_files.len(),
            "change detection complete"
        );
        Ok(set)
    }

    /// `Reuse` when the stored fingerprint equals `fresh_hash`
    pub fn classify(
        &self,
        relative_path: &str,
        fresh_hash: &str,
        previous: &HashMap<String, String>,
        db: &Database,
    ) -> Result<Classification> {
        match previous.get(relative_path) {
            Some(stored) if stored == fresh_hash => {
                Ok(Classification::Reuse(db.get_snippets_by_file(relative_path)?))
            }
            _ => Ok(Classification::Reparse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SnippetKind;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Database, LanguageRegistry) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        (dir, db, LanguageRegistry::with_defaults())
    }

    #[test]
    fn test_new_files_are_reparsed() {
        let (dir, db, registry) = setup();
        fs::write(dir.path().join("a.py"), "def foo(): pass\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set = ChangeDetector::new(&registry, ScanOptions::default())
            .detect(dir.path(), &db)
            .unwrap();
        assert_eq!(set.files.len(), 1);
        assert!(set.changed_files.contains("a.py"));
        assert_eq!(
            set.fresh_hashes["a.py"],
            crate::model::content_fingerprint("def foo(): pass\n")
        );
    }

    #[test]
    fn test_unchanged_file_reuses_snippets() {
        let (dir, db, registry) = setup();
        let source = "def foo(): pass\n";
        fs::write(dir.path().join("a.py"), source).unwrap();
        let snippet = Snippet::new("foo", SnippetKind::Function, source.trim_end(), "a.py", (0, 15), (1, 1));
        db.upsert_snippets(std::slice::from_ref(&snippet)).unwrap();
        db.set_fingerprints(&[("a.py".into(), fingerprint_bytes(source.as_bytes()))])
            .unwrap();

        let set = ChangeDetector::new(&registry, ScanOptions::default())
            .detect(dir.path(), &db)
            .unwrap();
        assert!(set.changed_files.is_empty());
        assert_eq!(set.files[0].classification, Classification::Reuse(vec![snippet]));
        assert_eq!(set.reused_count(), 1);
    }

    #[test]
    fn test_revert_restores_previous_fingerprint() {
        let (dir, db, registry) = setup();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("b.py"), "y = 2\n").unwrap();
        db.set_fingerprints(&[("a.py".into(), "old".into())]).unwrap();

        let mut set = ChangeDetector::new(&registry, ScanOptions::default())
            .detect(dir.path(), &db)
            .unwrap();
        assert_eq!(set.changed_files.len(), 2);

        set.revert("a.py", Vec::new());
        set.revert("b.py", Vec::new());
        assert!(set.changed_files.is_empty());
        assert_eq!(set.fresh_hashes.get("a.py").map(String::as_str), Some("old"));
        assert!(!set.fresh_hashes.contains_key("b.py"));
    }
}
