//! Hierarchical key/value config trees, persisted as text. `hydra.cfg` and
//! `peers/<id>.cfg` both use this format. It's a small, original format
//! supporting exactly what this crate needs: flat `/section/key = value`
//! paths, one per line.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use crate::error::HydraError;

/// A loaded or to-be-saved config tree: an ordered map from slash-separated
/// path (e.g. `/hydra/identity`) to its string value.
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    values: BTreeMap<String, String>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.values.get(path).map(String::as_str)
    }

    pub fn resolve<'a>(&'a self, path: &str, default: &'a str) -> &'a str {
        self.get(path).unwrap_or(default)
    }

    pub fn put(&mut self, path: impl Into<String>, value: impl Into<String>) {
        self.values.insert(path.into(), value.into());
    }

    /// Parse a `/path = value` tree from text. Blank lines and lines
    /// starting with `#` are ignored. Malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut tree = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((path, value)) = line.split_once('=') else {
                continue;
            };
            tree.put(path.trim().to_string(), value.trim().to_string());
        }
        tree
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (path, value) in &self.values {
            out.push_str(path);
            out.push_str(" = ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Load from `path`. Returns `None` if the file does not exist or could
    /// not be parsed.
    pub fn load(path: &Path) -> Option<Self> {
        let text = fs::read_to_string(path).ok()?;
        Some(Self::parse(&text))
    }

    /// Write to a temp file and rename, same atomicity contract as
    /// `Post::save`.
    pub fn save(&self, path: &Path) -> Result<(), HydraError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("cfg.tmp");
        fs::write(&tmp, self.render())?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// This node's own identity, loaded from `hydra.cfg`.
///
/// Identity **must** already exist — the server having previously
/// initialized it is a precondition; a missing identity is a fatal
/// startup error, not something this crate papers over with a generated
/// default.
#[derive(Debug, Clone)]
pub struct HydraConfig {
    pub identity: String,
    pub nickname: String,
}

impl HydraConfig {
    /// Load `<working_dir>/hydra.cfg`. Fails if the file is missing or the
    /// identity key is absent.
    pub fn load(working_dir: &Path) -> Result<Self, HydraError> {
        let path = working_dir.join("hydra.cfg");
        let tree = ConfigTree::load(&path).ok_or_else(|| {
            HydraError::Parse(format!("{} not found; server must initialize it first", path.display()))
        })?;
        let identity = tree
            .get("/hydra/identity")
            .ok_or_else(|| HydraError::Parse("/hydra/identity missing from hydra.cfg".into()))?
            .to_string();
        let nickname = tree.resolve("/hydra/nickname", "").to_string();
        Ok(Self { identity, nickname })
    }
}

/// Per-peer persistent cursor: `peers/<identity>.cfg`.
///
/// If `newest` is set, `oldest` is always set too.
#[derive(Debug, Clone, Default)]
pub struct PeerCursor {
    pub identity: String,
    pub nickname: String,
    pub oldest: Option<String>,
    pub newest: Option<String>,
}

impl PeerCursor {
    fn path_for(working_dir: &Path, identity: &str) -> PathBuf {
        working_dir.join("peers").join(format!("{identity}.cfg"))
    }

    /// Load `peers/<identity>.cfg`, or start a fresh (empty) cursor if the
    /// peer is not yet known (an absent file means the peer is unknown).
    pub fn load_or_new(working_dir: &Path, identity: &str, nickname: &str) -> Self {
        let path = Self::path_for(working_dir, identity);
        match ConfigTree::load(&path) {
            Some(tree) => Self {
                identity: tree.resolve("/peer/identity", identity).to_string(),
                nickname: tree.resolve("/peer/nickname", nickname).to_string(),
                oldest: tree.get("/peer/oldest").map(str::to_string),
                newest: tree.get("/peer/newest").map(str::to_string),
            },
            None => Self {
                identity: identity.to_string(),
                nickname: nickname.to_string(),
                oldest: None,
                newest: None,
            },
        }
    }

    pub fn save(&self, working_dir: &Path) -> Result<(), HydraError> {
        let mut tree = ConfigTree::new();
        tree.put("/peer/identity", self.identity.clone());
        tree.put("/peer/nickname", self.nickname.clone());
        if let Some(oldest) = &self.oldest {
            tree.put("/peer/oldest", oldest.clone());
        }
        if let Some(newest) = &self.newest {
            tree.put("/peer/newest", newest.clone());
        }
        tree.save(&Self::path_for(working_dir, &self.identity))
    }

    pub fn is_known_peer(&self) -> bool {
        self.oldest.is_some() && self.newest.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_tree_round_trips_through_text() {
        let mut tree = ConfigTree::new();
        tree.put("/hydra/identity", "ABC123");
        tree.put("/hydra/nickname", "bob");
        let text = tree.render();
        let parsed = ConfigTree::parse(&text);
        assert_eq!(parsed.get("/hydra/identity"), Some("ABC123"));
        assert_eq!(parsed.get("/hydra/nickname"), Some("bob"));
    }

    #[test]
    fn hydra_config_requires_identity() {
        let dir = tempfile::tempdir().unwrap();
        let err = HydraConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, HydraError::Parse(_)));
    }

    #[test]
    fn hydra_config_loads_identity_and_nickname() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = ConfigTree::new();
        tree.put("/hydra/identity", "ABC123");
        tree.put("/hydra/nickname", "bob");
        tree.save(&dir.path().join("hydra.cfg")).unwrap();

        let config = HydraConfig::load(dir.path()).unwrap();
        assert_eq!(config.identity, "ABC123");
        assert_eq!(config.nickname, "bob");
    }

    #[test]
    fn peer_cursor_absent_file_is_unknown_peer() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = PeerCursor::load_or_new(dir.path(), "peer-1", "alice");
        assert!(!cursor.is_known_peer());
    }

    #[test]
    fn peer_cursor_save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut cursor = PeerCursor::load_or_new(dir.path(), "peer-1", "alice");
        cursor.oldest = Some("AAA".into());
        cursor.newest = Some("BBB".into());
        cursor.save(dir.path()).unwrap();

        let reloaded = PeerCursor::load_or_new(dir.path(), "peer-1", "alice");
        assert!(reloaded.is_known_peer());
        assert_eq!(reloaded.oldest.as_deref(), Some("AAA"));
        assert_eq!(reloaded.newest.as_deref(), Some("BBB"));
    }
}
