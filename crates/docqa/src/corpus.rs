//! Corpus directory scanning and text decoding.
//!
//! Walks the corpus directory in sorted order, skipping hidden directories,
//! and yields every file whose extension is allow-listed. Source ids are
//! corpus-relative paths with `/` separators, so they are stable across
//! platforms.

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use docqa_core::models::Document;
use docqa_core::RagError;

/// An eligible file found under the corpus directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFile {
    pub path: PathBuf,
    pub source: String,
}

/// List eligible files under `dir`, sorted by source id.
pub fn scan_corpus(dir: &Path, allowed_extensions: &[String]) -> Result<Vec<CorpusFile>> {
    if !dir.is_dir() {
        bail!("Corpus directory does not exist: {}", dir.display());
    }

    let include_set = build_globset(allowed_extensions)?;
    let mut files = Vec::new();

    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        let source = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if !include_set.is_match(&source) {
            continue;
        }

        files.push(CorpusFile {
            path: path.to_path_buf(),
            source,
        });
    }

    files.sort_by(|a, b| a.source.cmp(&b.source));
    Ok(files)
}

/// Read every eligible document under `dir`.
///
/// Files that are not valid text are skipped with a warning; read errors
/// abort the load.
pub fn load_corpus(dir: &Path, allowed_extensions: &[String]) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    for file in scan_corpus(dir, allowed_extensions)? {
        let bytes = std::fs::read(&file.path)
            .with_context(|| format!("Failed to read {}", file.path.display()))?;
        match decode_text(&file.source, bytes) {
            Ok(doc) => docs.push(doc),
            Err(e) => warn!(source = %file.source, error = %e, "skipping corpus file"),
        }
    }
    Ok(docs)
}

/// Decode uploaded or on-disk bytes as a text [`Document`].
///
/// Rejects invalid UTF-8 and content containing NUL bytes. A leading
/// byte-order mark is dropped.
pub fn decode_text(source: &str, bytes: Vec<u8>) -> docqa_core::Result<Document> {
    if bytes.contains(&0) {
        return Err(RagError::Validation(format!(
            "{} is not a text file (contains NUL bytes)",
            source
        )));
    }
    let text = String::from_utf8(bytes)
        .map_err(|_| RagError::Validation(format!("{} is not valid UTF-8 text", source)))?;
    let text = match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    };
    Ok(Document::new(source, text))
}

/// Reduce an uploaded filename to a safe basename.
///
/// Drops any directory part, keeps ASCII letters, digits, `.`, `_`, and
/// `-`, turns whitespace runs into `_`, and trims leading and trailing dots
/// and underscores. Returns `None` when nothing usable remains.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let joined = base.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn build_globset(extensions: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for ext in extensions {
        let glob = GlobBuilder::new(&format!("**/*.{}", ext))
            .case_insensitive(true)
            .literal_separator(true)
            .build()?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn txt() -> Vec<String> {
        vec!["txt".to_string()]
    }

    #[test]
    fn test_scan_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("policies")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("a.TXT"), "a").unwrap();
        fs::write(root.join("policies/refunds.txt"), "r").unwrap();
        fs::write(root.join("notes.md"), "m").unwrap();
        fs::write(root.join(".git/HEAD.txt"), "h").unwrap();

        let sources: Vec<String> = scan_corpus(root, &txt())
            .unwrap()
            .into_iter()
            .map(|f| f.source)
            .collect();
        assert_eq!(sources, vec!["a.TXT", "b.txt", "policies/refunds.txt"]);
    }

    #[test]
    fn test_missing_dir_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(scan_corpus(&tmp.path().join("nope"), &txt()).is_err());
    }

    #[test]
    fn test_load_skips_binary_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("good.txt"), "hello").unwrap();
        fs::write(tmp.path().join("bad.txt"), [0xff, 0xfe, 0x00, 0x41]).unwrap();

        let docs = load_corpus(tmp.path(), &txt()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "good.txt");
        assert_eq!(docs[0].text, "hello");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("refunds.txt").as_deref(), Some("refunds.txt"));
        assert_eq!(
            sanitize_filename("My Policy  v2.txt").as_deref(),
            Some("My_Policy_v2.txt")
        );
        assert_eq!(
            sanitize_filename("../../etc/passwd.txt").as_deref(),
            Some("passwd.txt")
        );
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\notes.txt").as_deref(),
            Some("notes.txt")
        );
        assert_eq!(sanitize_filename(".hidden.txt").as_deref(), Some("hidden.txt"));
        assert_eq!(sanitize_filename("résumé.txt").as_deref(), Some("rsum.txt"));
        assert_eq!(sanitize_filename("..."), None);
        assert_eq!(sanitize_filename("日本.__"), None);
    }

    #[test]
    fn test_decode_text() {
        assert!(decode_text("x.txt", vec![0xc3, 0x28]).is_err());
        assert!(decode_text("x.txt", b"a\0b".to_vec()).is_err());
        let doc = decode_text("x.txt", "\u{feff}héllo".as_bytes().to_vec()).unwrap();
        assert_eq!(doc.text, "héllo");
    }
}
