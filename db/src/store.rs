//! Persisted schema caches.
//!
//! Each module gets one gzip-compressed JSON document under the store's
//! directory, named `<module stem>Cache.json.gz`. The document records the
//! fingerprint of the module it was extracted from; a cache whose
//! fingerprint, format version or extraction settings no longer match is
//! treated as a miss and re-extracted.
//!
//! Loading never fails towards the caller: a missing, corrupt or stale
//! file only means the module is extracted again.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use defschema_core::{SchemaCache, validate_cache};
use defschema_extract::{ExtractionConfig, extract_module};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{DatabaseError, Result};

/// Version of the persisted document layout.
pub const CACHE_FORMAT_VERSION: u32 = 1;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Identity of a module file at extraction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleFingerprint {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub mtime_secs: i64,
    /// Hex-encoded SHA-256 of the file contents.
    pub sha256: String,
}

impl ModuleFingerprint {
    /// Fingerprints the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](DatabaseError::IoError) if the file cannot be
    /// read.
    pub fn of(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        let bytes = std::fs::read(path)?;
        let mtime_secs = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(Self {
            path: path.canonicalize().unwrap_or_else(|_| path.to_path_buf()),
            size_bytes: metadata.len(),
            mtime_secs,
            sha256: calculate_checksum(&bytes),
        })
    }
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn calculate_checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Digest of the extraction settings a cache was produced with.
pub fn config_digest(config: &ExtractionConfig) -> String {
    let bytes = serde_json::to_vec(config).unwrap_or_default();
    calculate_checksum(&bytes)
}

/// On-disk form of one module's cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDocument {
    pub format_version: u32,
    pub fingerprint: ModuleFingerprint,
    #[serde(default)]
    pub config_digest: String,
    /// RFC 3339 timestamp of the extraction pass.
    pub generated_at: String,
    pub cache: SchemaCache,
}

impl CacheDocument {
    pub fn new(fingerprint: ModuleFingerprint, config: &ExtractionConfig, cache: SchemaCache) -> Self {
        Self {
            format_version: CACHE_FORMAT_VERSION,
            fingerprint,
            config_digest: config_digest(config),
            generated_at: chrono::Utc::now().to_rfc3339(),
            cache,
        }
    }
}

/// How [`CacheStore::load_or_extract`] obtained its cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOutcome {
    /// A persisted cache matched the module.
    Hit,
    /// The module was extracted and the result persisted.
    Extracted,
    /// The module could not be loaded or extracted; the cache is empty.
    Degraded,
}

/// Directory of persisted module caches.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file used for `module`.
    pub fn path_for(&self, module: &Path) -> PathBuf {
        let stem = module
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".to_string());
        self.dir.join(format!("{stem}Cache.json.gz"))
    }

    /// Returns the persisted cache for the fingerprinted module, if one
    /// exists and is still valid.
    pub fn load(
        &self,
        fingerprint: &ModuleFingerprint,
        config: &ExtractionConfig,
    ) -> Option<SchemaCache> {
        let path = self.path_for(&fingerprint.path);
        if !path.exists() {
            debug!(path = %path.display(), "no persisted cache");
            return None;
        }

        let document = match read_document(&path) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "discarding unreadable cache");
                return None;
            }
        };
        if document.format_version != CACHE_FORMAT_VERSION {
            warn!(
                path = %path.display(),
                found = document.format_version,
                expected = CACHE_FORMAT_VERSION,
                "discarding cache with another format version"
            );
            return None;
        }
        if document.fingerprint != *fingerprint {
            info!(path = %path.display(), "module changed since cache was written");
            return None;
        }
        if document.config_digest != config_digest(config) {
            info!(path = %path.display(), "extraction settings changed since cache was written");
            return None;
        }
        let problems = validate_cache(&document.cache);
        if let Some(first) = problems.first() {
            warn!(
                path = %path.display(),
                problems = problems.len(),
                first = %first,
                "discarding cache that fails validation"
            );
            return None;
        }
        Some(document.cache)
    }

    /// Persists `cache` for the fingerprinted module, replacing any
    /// previous file.
    pub fn save(
        &self,
        fingerprint: &ModuleFingerprint,
        config: &ExtractionConfig,
        cache: &SchemaCache,
    ) -> Result<PathBuf> {
        let path = self.path_for(&fingerprint.path);
        let document = CacheDocument::new(fingerprint.clone(), config, cache.clone());
        write_document(&path, &document)?;
        debug!(path = %path.display(), "persisted cache");
        Ok(path)
    }

    /// Returns the cache for `module`, extracting and persisting it on a
    /// miss or when `force` is set.
    pub fn load_or_extract(
        &self,
        module: &Path,
        config: &ExtractionConfig,
        force: bool,
    ) -> (SchemaCache, CacheOutcome) {
        let fingerprint = match ModuleFingerprint::of(module) {
            Ok(fp) => fp,
            Err(err) => {
                warn!(module = %module.display(), error = %err, "module not loadable, using empty cache");
                return (SchemaCache::default(), CacheOutcome::Degraded);
            }
        };

        if !force {
            if let Some(cache) = self.load(&fingerprint, config) {
                info!(
                    module = %module.display(),
                    definitions = cache.definitions.len(),
                    "loaded persisted cache"
                );
                return (cache, CacheOutcome::Hit);
            }
        }

        let cache = match extract_module(module, config) {
            Ok(cache) => cache,
            Err(err) => {
                warn!(module = %module.display(), error = %err, "extraction failed, using empty cache");
                return (SchemaCache::default(), CacheOutcome::Degraded);
            }
        };
        if let Err(err) = self.save(&fingerprint, config, &cache) {
            warn!(module = %module.display(), error = %err, "could not persist cache");
        }
        (cache, CacheOutcome::Extracted)
    }
}

/// Reads a persisted cache document.
///
/// # Errors
///
/// Returns [`IoError`](DatabaseError::IoError) if the file cannot be
/// opened, or [`CacheCorruption`](DatabaseError::CacheCorruption) if it
/// does not decode.
pub fn read_document(path: &Path) -> Result<CacheDocument> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    serde_json::from_reader(decoder)
        .map_err(|e| DatabaseError::CacheCorruption(format!("{}: {e}", path.display())))
}

/// Writes a cache document as gzip-compressed JSON.
pub fn write_document(path: &Path, document: &CacheDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, document)?;
    encoder.finish()?.flush()?;
    Ok(())
}

/// Either a fingerprinted document or a bare cache.
#[derive(Deserialize)]
#[serde(untagged)]
enum CacheFile {
    Document(Box<CacheDocument>),
    Bare(SchemaCache),
}

/// Reads a cache from `path` regardless of how it was written.
///
/// Accepts persisted documents as well as bare caches, gzip-compressed or
/// plain JSON. No fingerprint check is made.
pub fn read_cache(path: impl AsRef<Path>) -> Result<SchemaCache> {
    let path = path.as_ref();
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut plain = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_end(&mut plain)
            .map_err(|e| DatabaseError::CacheCorruption(format!("{}: {e}", path.display())))?;
        bytes = plain;
    }
    let file: CacheFile = serde_json::from_slice(&bytes)
        .map_err(|e| DatabaseError::CacheCorruption(format!("{}: {e}", path.display())))?;
    Ok(match file {
        CacheFile::Document(doc) => doc.cache,
        CacheFile::Bare(cache) => cache,
    })
}

/// Writes a bare cache; gzip-compressed when `path` ends in `.gz`, pretty
/// JSON otherwise.
pub fn write_cache(path: impl AsRef<Path>, cache: &SchemaCache) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(path)?);
    if path.extension().is_some_and(|ext| ext == "gz") {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        serde_json::to_writer(&mut encoder, cache)?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = writer;
        serde_json::to_writer_pretty(&mut writer, cache)?;
        writer.flush()?;
    }
    Ok(())
}
