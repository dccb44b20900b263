//! Repository Scanner
//!
//! Walks a root directory under an ignore-rule set and describes every kept
//! file as an ordered list of fixed-size [`FileChunk`]s. Chunk geometry is
//! the unit the rest of the pipeline addresses file content by;
//! [`ChunkedContentReader`] turns a chunk back into its UTF-8 text when
//! prompt context is assembled.
//!
//! Chunk invariants: for a file of size `S` and chunk size `C`, the chunk
//! count is `ceil(S/C)` with a minimum of 1 (an empty file still yields one
//! zero-length chunk), offsets are `i×C`, and chunk lengths sum exactly to
//! `S` with no gap or overlap.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::scanner::CHUNK_SIZE;
use crate::types::{DocError, Result};

/// One fixed-size slice of a scanned file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunk {
    pub path: PathBuf,
    pub total_size: u64,
    pub chunk_index: u32,
    pub chunk_count: u32,
    pub byte_offset: u64,
    pub byte_length: u64,
}

/// Compute the ordered chunk list for one file of `total_size` bytes.
///
/// A zero-byte file still yields exactly one zero-length chunk.
pub fn chunks_for(path: &Path, total_size: u64, chunk_size: u64) -> Vec<FileChunk> {
    debug_assert!(chunk_size > 0);
    let chunk_count = (total_size.div_ceil(chunk_size)).max(1) as u32;
    (0..chunk_count)
        .map(|index| {
            let byte_offset = u64::from(index) * chunk_size;
            let byte_length = (total_size - byte_offset).min(chunk_size);
            FileChunk {
                path: path.to_path_buf(),
                total_size,
                chunk_index: index,
                chunk_count,
                byte_offset,
                byte_length,
            }
        })
        .collect()
}

/// Parsed ignore-rule set: `#` comment lines stripped, trailing `/` marking
/// directory-only rules, glob patterns otherwise.
pub struct IgnoreRules {
    matcher: Option<Gitignore>,
}

impl IgnoreRules {
    /// Parse newline-separated rule text relative to `root`
    pub fn parse(root: &Path, rules: &str) -> Self {
        let mut builder = GitignoreBuilder::new(root);
        let mut added = 0usize;
        for line in rules.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Err(err) = builder.add_line(None, line) {
                warn!(rule = line, "skipping malformed ignore rule: {err}");
                continue;
            }
            added += 1;
        }
        if added == 0 {
            return Self { matcher: None };
        }
        match builder.build() {
            Ok(matcher) => Self {
                matcher: Some(matcher),
            },
            Err(err) => {
                warn!("ignore rule set failed to build, keeping everything: {err}");
                Self { matcher: None }
            }
        }
    }

    pub fn empty() -> Self {
        Self { matcher: None }
    }

    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        match &self.matcher {
            Some(matcher) => matcher.matched_path_or_any_parents(path, is_dir).is_ignore(),
            None => false,
        }
    }
}

/// Directory scanner producing the ordered chunk list for a root path
pub struct RepositoryScanner {
    root: PathBuf,
    rules: IgnoreRules,
    chunk_size: u64,
}

impl RepositoryScanner {
    pub fn new<P: AsRef<Path>>(root: P, rules: IgnoreRules) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            rules,
            chunk_size: CHUNK_SIZE,
        }
    }

    #[cfg(test)]
    fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Walk the root and return every kept file's chunks, ordered by path
    /// and then by chunk index.
    pub fn scan(&self) -> Result<Vec<FileChunk>> {
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .follow_links(false)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build();

        let mut chunks = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|err| DocError::Storage(err.to_string()))?;
            let path = entry.path();
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            if self.rules.is_ignored(path, is_dir) {
                continue;
            }
            if is_dir || entry.file_type().is_none() {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            chunks.extend(chunks_for(path, size, self.chunk_size));
        }

        debug!(root = %self.root.display(), chunks = chunks.len(), "repository scan complete");
        Ok(chunks)
    }
}

/// Reads the exact byte range of a chunk back as UTF-8 text
pub struct ChunkedContentReader;

impl ChunkedContentReader {
    /// Read one chunk's bytes and decode them as UTF-8.
    ///
    /// The byte range is exact, so a multi-byte character split across a
    /// chunk boundary makes its chunks individually undecodable; that case
    /// surfaces as an error rather than silently lossy text.
    pub fn read_chunk(chunk: &FileChunk) -> Result<String> {
        let mut file = File::open(&chunk.path)?;
        file.seek(SeekFrom::Start(chunk.byte_offset))?;
        let mut buffer = vec![0u8; chunk.byte_length as usize];
        file.read_exact(&mut buffer)?;
        String::from_utf8(buffer).map_err(|err| {
            DocError::Storage(format!(
                "chunk {} of {} is not valid UTF-8: {err}",
                chunk.chunk_index,
                chunk.path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_yields_one_chunk() {
        let chunks = chunks_for(Path::new("empty.txt"), 0, CHUNK_SIZE);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].byte_offset, 0);
        assert_eq!(chunks[0].byte_length, 0);
        assert_eq!(chunks[0].chunk_count, 1);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let chunks = chunks_for(Path::new("f"), 2048, 1024);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].byte_length, 1024);
    }

    proptest! {
        #[test]
        fn prop_chunk_geometry(size in 0u64..10_000_000, chunk_size in 1u64..1_000_000) {
            let chunks = chunks_for(Path::new("f"), size, chunk_size);
            let expected = (size.div_ceil(chunk_size)).max(1) as usize;
            prop_assert_eq!(chunks.len(), expected);

            let mut cursor = 0u64;
            for (idx, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.chunk_index as usize, idx);
                prop_assert_eq!(chunk.chunk_count as usize, expected);
                prop_assert_eq!(chunk.byte_offset, cursor);
                prop_assert_eq!(chunk.byte_offset, idx as u64 * chunk_size);
                cursor += chunk.byte_length;
            }
            // Contiguous, non-overlapping, summing exactly to the file size.
            prop_assert_eq!(cursor, size);
            if size > 0 {
                let last = chunks.last().unwrap();
                prop_assert_eq!(last.byte_length, size - (expected as u64 - 1) * chunk_size);
            }
        }
    }

    #[test]
    fn test_ignore_rules_comments_and_dir_suffix() {
        let root = Path::new("/repo");
        let rules = IgnoreRules::parse(root, "# build output\ntarget/\n*.log\n\n");
        assert!(rules.is_ignored(Path::new("/repo/target"), true));
        assert!(rules.is_ignored(Path::new("/repo/debug.log"), false));
        assert!(!rules.is_ignored(Path::new("/repo/target"), false));
        assert!(!rules.is_ignored(Path::new("/repo/src/main.rs"), false));
    }

    #[test]
    fn test_blank_rules_keep_everything() {
        let rules = IgnoreRules::parse(Path::new("/repo"), "# only comments\n\n");
        assert!(!rules.is_ignored(Path::new("/repo/anything"), false));
    }

    #[test]
    fn test_scan_orders_and_filters() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "bbbb").unwrap();
        fs::write(dir.path().join("a.txt"), "aa").unwrap();
        fs::write(dir.path().join("skip.log"), "nope").unwrap();

        let rules = IgnoreRules::parse(dir.path(), "*.log\n");
        let chunks = RepositoryScanner::new(dir.path(), rules).scan().unwrap();

        let names: Vec<String> = chunks
            .iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(chunks[0].total_size, 2);
        assert_eq!(chunks[1].total_size, 4);
    }

    #[test]
    fn test_scan_splits_large_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("big.txt"), "x".repeat(2500)).unwrap();

        let chunks = RepositoryScanner::new(dir.path(), IgnoreRules::empty())
            .with_chunk_size(1024)
            .scan()
            .unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].byte_length, 2500 - 2048);
    }

    #[test]
    fn test_read_chunk_exact_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.txt");
        fs::write(&path, "hello world").unwrap();

        let chunks = chunks_for(&path, 11, 6);
        assert_eq!(chunks.len(), 2);
        assert_eq!(ChunkedContentReader::read_chunk(&chunks[0]).unwrap(), "hello ");
        assert_eq!(ChunkedContentReader::read_chunk(&chunks[1]).unwrap(), "world");
    }

    #[test]
    fn test_read_chunk_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.txt");
        fs::write(&path, "").unwrap();

        let chunks = chunks_for(&path, 0, CHUNK_SIZE);
        assert_eq!(ChunkedContentReader::read_chunk(&chunks[0]).unwrap(), "");
    }
}
