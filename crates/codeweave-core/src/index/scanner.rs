//! Source tree walk

use crate::config::IndexerConfig;
use crate::error::Result;
use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Scan result
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub path: PathBuf,
    /// Path relative to the scan root, `/`-separated
    pub relative_path: String,
}

/// Scan options
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub follow_symlinks: bool,
    pub exclude_dirs: Vec<String>,
    pub exclude_extensions: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub exclude_hidden: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from(&IndexerConfig::default())
    }
}

impl From<&IndexerConfig> for ScanOptions {
    fn from(config: &IndexerConfig) -> Self {
        Self {
            follow_symlinks: config.follow_symlinks,
            exclude_dirs: config.exclude_dirs.clone(),
            exclude_extensions: config
                .exclude_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_globs: config.exclude_globs.clone(),
            exclude_hidden: true,
        }
    }
}

/// Every file under `root` that survives the exclusion lists, sorted by relative path
pub fn scan_files(root: &Path, options: &ScanOptions) -> Result<Vec<ScanResult>> {
    let globs = options
        .exclude_globs
        .iter()
        .map(|g| Pattern::new(g))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut results = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(options.follow_symlinks)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !should_skip(e, options));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if has_excluded_extension(path, options) {
            continue;
        }

        let relative = relative_path(root, path);
        if globs.iter().any(|g| g.matches(&relative)) {
            continue;
        }

        results.push(ScanResult {
            path: path.to_path_buf(),
            relative_path: relative,
        });
    }

    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

/// `/`-separated path of `path` below `root`
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn should_skip(entry: &DirEntry, options: &ScanOptions) -> bool {
    let name = entry.file_name().to_string_lossy();

    if options.exclude_hidden && name.starts_with('.') {
        return true;
    }

    if entry.file_type().is_dir() && options.exclude_dirs.iter().any(|d| name == *d) {
        return true;
    }

    false
}

fn has_excluded_extension(path: &Path, options: &ScanOptions) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let ext = e.to_lowercase();
            options.exclude_extensions.iter().any(|x| *x == ext)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_exclusions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/a.py");
        touch(dir.path(), "src/b.pyc");
        touch(dir.path(), "node_modules/x/index.py");
        touch(dir.path(), ".git/config");
        touch(dir.path(), "__pycache__/a.cpython.py");
        touch(dir.path(), "gen/skip.py");

        let options = ScanOptions {
            exclude_globs: vec!["gen/**".to_string()],
            ..Default::default()
        };
        let found: Vec<_> = scan_files(dir.path(), &options)
            .unwrap()
            .into_iter()
            .map(|r| r.relative_path)
            .collect();
        assert_eq!(found, vec!["src/a.py"]);
    }

    #[test]
    fn test_sorted_relative_paths() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "z.py");
        touch(dir.path(), "a/b.py");
        let found: Vec<_> = scan_files(dir.path(), &ScanOptions::default())
            .unwrap()
            .into_iter()
            .map(|r| r.relative_path)
            .collect();
        assert_eq!(found, vec!["a/b.py", "z.py"]);
    }
}
