//! Append-only directory of posts on disk, plus an in-memory index.
//!
//! A small in-memory collection behind simple CRUD methods, backed by a
//! directory on disk rather than a database.

use std::{collections::HashMap, fs, path::{Path, PathBuf}};

use crate::post::Post;

/// Ordered sequence of posts loaded from a fixed directory, with a
/// `HashMap` mirror for O(1) ident lookups instead of a linear scan.
#[derive(Debug, Default)]
pub struct Ledger {
    posts_dir: PathBuf,
    posts: Vec<Post>,
    index_by_ident: HashMap<String, usize>,
}

impl Ledger {
    /// Create an empty ledger rooted at `posts_dir` (typically
    /// `<working_dir>/posts`). Does not touch disk until `load` or `store`
    /// is called.
    pub fn new(posts_dir: impl Into<PathBuf>) -> Self {
        Self {
            posts_dir: posts_dir.into(),
            posts: Vec::new(),
            index_by_ident: HashMap::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.posts.len()
    }

    pub fn posts_dir(&self) -> &Path {
        &self.posts_dir
    }

    /// Enumerate `posts_dir`, loading each file and appending successes in
    /// directory-enumeration order. A per-file parse failure is skipped
    /// (not fatal to the scan). Returns the count loaded, or `-1` if the
    /// directory itself could not be enumerated (e.g. missing — a ledger
    /// with no `posts/` directory yet is not an error, it loads as empty).
    pub fn load(&mut self) -> i64 {
        self.posts.clear();
        self.index_by_ident.clear();

        let entries = match fs::read_dir(&self.posts_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                tracing::warn!("ledger: could not read {}: {e}", self.posts_dir.display());
                return -1;
            }
        };

        let mut loaded = 0i64;
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let Ok(file_type) = entry.file_type() else { continue };
            if !file_type.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match Post::load(&self.posts_dir, &name) {
                Some(post) => {
                    self.index_by_ident.insert(post.ident(), self.posts.len());
                    self.posts.push(post);
                    loaded += 1;
                }
                None => {
                    tracing::warn!("ledger: skipping unparsable post file {name}");
                }
            }
        }
        loaded
    }

    /// Save `post` under a filename derived from its `ident`, then adopt
    /// it into the in-memory list. `post` is consumed — ownership
    /// transfers to the ledger.
    pub fn store(&mut self, post: Post) -> Result<(), crate::error::HydraError> {
        let filename = post.ident();
        post.save(&self.posts_dir, &filename)?;
        self.index_by_ident.insert(filename, self.posts.len());
        self.posts.push(post);
        Ok(())
    }

    /// Bounds-checked read by position.
    pub fn fetch(&self, index: usize) -> Option<&Post> {
        self.posts.get(index)
    }

    /// 0-based position of the post with this `ident`, or `-1` if absent.
    pub fn index(&self, ident: &str) -> i64 {
        self.index_by_ident
            .get(ident)
            .map(|&i| i as i64)
            .unwrap_or(-1)
    }

    pub fn contains(&self, ident: &str) -> bool {
        self.index_by_ident.contains_key(ident)
    }
}
