use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use walkdir::WalkDir;
use zip::ZipArchive;

/// Create a scratch directory for one import/export attempt. The directory is
/// removed on drop, on every exit path.
pub fn scratch_dir(prefix: &str) -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .context("failed to create scratch directory")
}

/// Extracts the given `.zip` file to the target directory.
pub fn extract_zip(zip_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = fs::File::open(zip_path)
        .with_context(|| format!("failed to open {}", zip_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("failed to read zip archive {}", zip_path.display()))?;
    archive
        .extract(dest_dir)
        .with_context(|| format!("failed to extract {} to {}", zip_path.display(), dest_dir.display()))?;
    Ok(())
}

/// Recursively locate every file under `dir` whose extension matches `ext`
/// (case-insensitive), in traversal order.
pub fn find_files_by_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(ext))
                .unwrap_or(false)
        })
        .collect()
}

/// Reduce a layer name to a filesystem-safe stem.
pub fn sanitize_name(name: &str) -> String {
    let re = regex::Regex::new(r"[^A-Za-z0-9_-]+").expect("static pattern");
    let cleaned = re.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() { "layer".to_string() } else { cleaned.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_name("Gold Deposits (2024)"), "Gold_Deposits_2024");
        assert_eq!(sanitize_name("  "), "layer");
        assert_eq!(sanitize_name("a/b\\c"), "a_b_c");
    }

    #[test]
    fn find_files_is_recursive_and_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("inner");
        fs::create_dir(&nested).unwrap();
        fs::File::create(dir.path().join("a.SHP")).unwrap().write_all(b"x").unwrap();
        fs::File::create(nested.join("b.shp")).unwrap().write_all(b"x").unwrap();
        fs::File::create(nested.join("c.dbf")).unwrap().write_all(b"x").unwrap();

        let found = find_files_by_extension(dir.path(), "shp");
        assert_eq!(found.len(), 2);
    }
}
