//! A single immutable content item: subject + metadata + opaque content,
//! identified by a digest-derived `ident`.
//!
//! Grounded in `examples/original_source/include/hydra_post.h` for the
//! operation surface, rendered as single-owner Rust values instead of the
//! original's paired alloc/destroy handles (spec.md §9 redesign note).

use std::{
    fs,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::HydraError;

/// Default MIME type assigned when content is set from text.
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

/// Where a post's content currently lives.
///
/// Collapses the C reference's `location` string plus implicit buffer/path
/// state into one enum with exactly the three states spec.md §3 names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostContent {
    /// Content held in memory (set via `set_content`/`set_data`, or loaded
    /// from a metadata file that embedded it inline).
    Inline(Vec<u8>),
    /// Content lives in a file on local disk; digest/size were computed by
    /// streaming that file at set-time.
    File(PathBuf),
    /// Metadata only — content has not (yet) been fetched from a peer.
    Remote,
}

/// An immutable content item.
///
/// Every field is private; mutation only happens through the `set_*`
/// operations, each of which recomputes `digest` (and therefore invalidates
/// any previously observed `ident()`), per invariant I2.
#[derive(Debug, Clone)]
pub struct Post {
    subject: String,
    timestamp: String,
    parent_id: String,
    mime_type: String,
    digest: String,
    content_size: u64,
    content: PostContent,
    /// Byte offset already fetched for the current in-flight transfer.
    /// Unused by the single-chunk transfer implemented today; kept so a
    /// future multi-chunk `fetch`/`set_data` extension does not need a
    /// field added to the wire-visible struct (spec.md §9 note 3).
    chunk_offset: u64,
}

/// On-disk representation of a post's metadata file (`posts/<ident>`).
///
/// JSON was chosen over a bespoke binary format because it losslessly
/// round-trips the five identity fields plus inline content and is the
/// format the rest of this crate's data already assumes for serialization
/// (see DESIGN.md).
#[derive(Debug, Serialize, Deserialize)]
struct PostRecord {
    subject: String,
    timestamp: String,
    parent_id: String,
    mime_type: String,
    digest: String,
    content_size: u64,
    location: RecordLocation,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RecordLocation {
    Inline {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    File {
        path: PathBuf,
    },
    Remote,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode_upper(hasher.finalize())
}

fn sha1_hex_file(path: &Path) -> Result<(String, u64), HydraError> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hex::encode_upper(hasher.finalize()), size))
}

impl Post {
    /// Allocate an empty post with `subject` and a fresh UTC timestamp.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            parent_id: String::new(),
            mime_type: String::new(),
            digest: String::new(),
            content_size: 0,
            content: PostContent::Remote,
            chunk_offset: 0,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn content_size(&self) -> u64 {
        self.content_size
    }

    pub fn content(&self) -> &PostContent {
        &self.content
    }

    pub fn set_parent_id(&mut self, parent_id: impl Into<String>) {
        self.parent_id = parent_id.into();
    }

    pub fn set_mime_type(&mut self, mime_type: impl Into<String>) {
        self.mime_type = mime_type.into();
    }

    /// Replace content with the UTF-8 bytes of `text` (invariant I3).
    pub fn set_content(&mut self, text: &str) {
        self.set_data(text.as_bytes().to_vec());
        self.mime_type = DEFAULT_MIME_TYPE.to_string();
    }

    /// Replace content with `bytes`, taking ownership and recomputing
    /// digest + size.
    pub fn set_data(&mut self, bytes: Vec<u8>) {
        self.digest = sha1_hex(&bytes);
        self.content_size = bytes.len() as u64;
        self.content = PostContent::Inline(bytes);
        self.chunk_offset = 0;
    }

    /// Point content at an existing, readable local file, streaming it to
    /// compute the digest. Fails with `HydraError::Io` if unreadable.
    pub fn set_file(&mut self, path: impl AsRef<Path>) -> Result<(), HydraError> {
        let path = path.as_ref();
        let (digest, size) = sha1_hex_file(path)?;
        self.digest = digest;
        self.content_size = size;
        self.content = PostContent::File(path.to_path_buf());
        self.chunk_offset = 0;
        Ok(())
    }

    /// Deterministic content-derived post ID (invariant I2): uppercase hex
    /// SHA-1 of `subject || "\n" || timestamp || "\n" || parent_id || "\n" ||
    /// mime_type || "\n" || digest`.
    pub fn ident(&self) -> String {
        let joined = [
            self.subject.as_str(),
            self.timestamp.as_str(),
            self.parent_id.as_str(),
            self.mime_type.as_str(),
            self.digest.as_str(),
        ]
        .join("\n");
        sha1_hex(joined.as_bytes())
    }

    /// Return up to `size` bytes starting at `offset`. `size == 0` means
    /// "all remaining". Returns `OutOfRange` when `offset` is past the end
    /// of the content; spec.md §4.A leaves an additional memory-threshold
    /// refusal as optional ("may refuse"), and this implementation does not
    /// impose one.
    pub fn fetch(&self, size: u64, offset: u64) -> Result<Vec<u8>, HydraError> {
        match &self.content {
            PostContent::Inline(data) => {
                let offset = offset as usize;
                if offset > data.len() {
                    return Err(HydraError::OutOfRange);
                }
                let end = if size == 0 {
                    data.len()
                } else {
                    (offset + size as usize).min(data.len())
                };
                Ok(data[offset..end].to_vec())
            }
            PostContent::File(path) => {
                let mut file = fs::File::open(path)?;
                file.seek(SeekFrom::Start(offset))?;
                let want = if size == 0 {
                    (self.content_size.saturating_sub(offset)) as usize
                } else {
                    size as usize
                };
                let mut buf = vec![0u8; want];
                let mut read_total = 0;
                loop {
                    let n = file.read(&mut buf[read_total..])?;
                    if n == 0 {
                        break;
                    }
                    read_total += n;
                    if read_total == buf.len() {
                        break;
                    }
                }
                buf.truncate(read_total);
                Ok(buf)
            }
            PostContent::Remote => Err(HydraError::OutOfRange),
        }
    }

    /// Save metadata (and inline content, if any) to `posts_dir/<filename>`.
    /// Writes to a temp file and renames, so readers scanning `posts_dir`
    /// never observe a partial file (spec.md §5 shared-resources contract).
    pub fn save(&self, posts_dir: &Path, filename: &str) -> Result<(), HydraError> {
        fs::create_dir_all(posts_dir)?;
        let location = match &self.content {
            PostContent::Inline(data) => RecordLocation::Inline { data: data.clone() },
            PostContent::File(path) => RecordLocation::File { path: path.clone() },
            PostContent::Remote => RecordLocation::Remote,
        };
        let record = PostRecord {
            subject: self.subject.clone(),
            timestamp: self.timestamp.clone(),
            parent_id: self.parent_id.clone(),
            mime_type: self.mime_type.clone(),
            digest: self.digest.clone(),
            content_size: self.content_size,
            location,
        };
        let body = serde_json::to_vec_pretty(&record)
            .map_err(|e| HydraError::Parse(e.to_string()))?;

        let dest = posts_dir.join(filename);
        let tmp = posts_dir.join(format!(".{filename}.tmp"));
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &dest)?;
        Ok(())
    }

    /// Inverse of `save`. Returns `None` on parse or I/O failure rather
    /// than propagating — a single corrupt post file must not abort a
    /// directory-wide `Ledger::load`.
    pub fn load(posts_dir: &Path, filename: &str) -> Option<Post> {
        let body = fs::read(posts_dir.join(filename)).ok()?;
        let record: PostRecord = serde_json::from_slice(&body).ok()?;
        let content = match record.location {
            RecordLocation::Inline { data } => PostContent::Inline(data),
            RecordLocation::File { path } => PostContent::File(path),
            RecordLocation::Remote => PostContent::Remote,
        };
        Some(Post {
            subject: record.subject,
            timestamp: record.timestamp,
            parent_id: record.parent_id,
            mime_type: record.mime_type,
            digest: record.digest,
            content_size: record.content_size,
            content,
            chunk_offset: 0,
        })
    }

    /// Copy the six identity fields into a protocol frame.
    pub fn encode(&self) -> crate::protocol::types::HeaderFields {
        crate::protocol::types::HeaderFields {
            subject: self.subject.clone(),
            timestamp: self.timestamp.clone(),
            parent_id: self.parent_id.clone(),
            mime_type: self.mime_type.clone(),
            digest: self.digest.clone(),
            content_size: self.content_size,
        }
    }

    /// Build a content-less post (`PostContent::Remote`) from a decoded
    /// `HEADER-OK` frame.
    pub fn decode(fields: crate::protocol::types::HeaderFields) -> Post {
        Post {
            subject: fields.subject,
            timestamp: fields.timestamp,
            parent_id: fields.parent_id,
            mime_type: fields.mime_type,
            digest: fields.digest,
            content_size: fields.content_size,
            content: PostContent::Remote,
            chunk_offset: 0,
        }
    }

    pub fn dup(&self) -> Post {
        self.clone()
    }

    pub fn chunk_offset(&self) -> u64 {
        self.chunk_offset
    }

    pub fn set_chunk_offset(&mut self, offset: u64) {
        self.chunk_offset = offset;
    }
}
