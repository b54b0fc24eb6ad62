/**
 * Template Store
 * One binary record per identity, written in a single forward pass and
 * replaced atomically
 *
 * Record layout (little-endian):
 *   u32 format_version
 *   [u8; 64] owner_id, null padded
 *   u32 task_type
 *   i64 created_at, i64 last_used
 *   u64 n + n * f32 feature values
 *   u64 n + n digest bytes
 *   u64 n + n salt bytes
 */

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::Config;
use crate::error::{try_with_capacity, NeuroLockError, Result};
use crate::features::{FeatureVector, MentalTask, FEATURE_WIDTH};
use crate::hashing::SaltedDigest;
use crate::template::{capture_stamp, validate_owner_id, Template, TEMPLATE_FORMAT_VERSION};

pub const OWNER_ID_BLOCK: usize = 64;

const LEN_FIELD: usize = 8;

pub struct TemplateStore {
    dir: PathBuf,
    extension: String,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.template_dir.clone(), config.template_extension.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<owner_id><extension>`
    pub fn path_for(&self, owner_id: &str) -> Result<PathBuf> {
        validate_owner_id(owner_id)?;
        Ok(self.dir.join(format!("{}{}", owner_id, self.extension)))
    }

    /// Persist `template`, replacing any existing record for the same owner.
    /// A reader sees either the old record or the new one, never a partial
    /// write.
    pub fn save(&self, template: &Template) -> Result<()> {
        let path = self.path_for(&template.owner_id)?;
        let bytes = encode(template)?;

        fs::create_dir_all(&self.dir)?;

        // Each save gets its own temp file, so concurrent writers never share
        // a partially written inode. Dropping it on error removes it.
        let written = NamedTempFile::new_in(&self.dir).and_then(|mut tmp| {
            tmp.as_file_mut().write_all(&bytes)?;
            tmp.as_file_mut().sync_all()?;
            tmp.persist(&path).map(|_| ()).map_err(|e| e.error)
        });

        if let Err(e) = written {
            warn!("Failed to save template for {}: {}", template.owner_id, e);
            return Err(NeuroLockError::IoFailure(e));
        }

        info!("Template saved for {} ({} bytes)", template.owner_id, bytes.len());
        Ok(())
    }

    pub fn load(&self, owner_id: &str) -> Result<Template> {
        let path = self.path_for(owner_id)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(NeuroLockError::NotFound(owner_id.to_string()))
            }
            Err(e) => return Err(NeuroLockError::IoFailure(e)),
        };

        let template = decode(&bytes)?;
        if template.owner_id != owner_id {
            return Err(NeuroLockError::CorruptRecord(format!(
                "record at {} belongs to '{}'",
                path.display(),
                template.owner_id
            )));
        }

        debug!("Template loaded for {}", owner_id);
        Ok(template)
    }

    pub fn exists(&self, owner_id: &str) -> Result<bool> {
        Ok(self.path_for(owner_id)?.is_file())
    }

    pub fn delete(&self, owner_id: &str) -> Result<()> {
        let path = self.path_for(owner_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Template deleted for {}", owner_id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(NeuroLockError::NotFound(owner_id.to_string()))
            }
            Err(e) => Err(NeuroLockError::IoFailure(e)),
        }
    }

    /// Owner ids of every record in the store, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(NeuroLockError::IoFailure(e)),
        };

        let mut owners = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(owner) = name.strip_suffix(self.extension.as_str()) {
                if validate_owner_id(owner).is_ok() {
                    owners.push(owner.to_string());
                }
            }
        }
        owners.sort();
        Ok(owners)
    }
}

/// Serialize a template into its on-disk form.
pub fn encode(template: &Template) -> Result<Zeroizing<Vec<u8>>> {
    validate_owner_id(&template.owner_id)?;

    let features = template.feature_vector.values();
    let digest = template.digest.digest();
    let salt = template.digest.salt();

    let size = 4 + OWNER_ID_BLOCK + 4 + 8 + 8
        + LEN_FIELD + features.len() * FEATURE_WIDTH
        + LEN_FIELD + digest.len()
        + LEN_FIELD + salt.len();
    let mut out = Zeroizing::new(try_with_capacity::<u8>(size)?);

    out.extend_from_slice(&template.format_version.to_le_bytes());
    let mut owner_block = [0u8; OWNER_ID_BLOCK];
    owner_block[..template.owner_id.len()].copy_from_slice(template.owner_id.as_bytes());
    out.extend_from_slice(&owner_block);
    out.extend_from_slice(&template.task_type.as_u32().to_le_bytes());
    out.extend_from_slice(&template.created_at.to_le_bytes());
    out.extend_from_slice(&template.last_used.to_le_bytes());

    out.extend_from_slice(&(features.len() as u64).to_le_bytes());
    template.feature_vector.write_le_bytes(&mut out);

    out.extend_from_slice(&(digest.len() as u64).to_le_bytes());
    out.extend_from_slice(digest);

    out.extend_from_slice(&(salt.len() as u64).to_le_bytes());
    out.extend_from_slice(salt);

    Ok(out)
}

/// Parse an on-disk record. Every length prefix is checked against the bytes
/// actually remaining before anything is allocated.
pub fn decode(bytes: &[u8]) -> Result<Template> {
    let mut reader = RecordReader::new(bytes);

    let format_version = reader.read_u32()?;
    if format_version != TEMPLATE_FORMAT_VERSION {
        return Err(NeuroLockError::CorruptRecord(format!(
            "unsupported format version {}",
            format_version
        )));
    }

    let owner_block = reader.take(OWNER_ID_BLOCK)?;
    let owner_len = owner_block
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| NeuroLockError::CorruptRecord("owner id is not terminated".to_string()))?;
    let owner_id = std::str::from_utf8(&owner_block[..owner_len])
        .map_err(|_| NeuroLockError::CorruptRecord("owner id is not UTF-8".to_string()))?
        .to_string();
    validate_owner_id(&owner_id)
        .map_err(|_| NeuroLockError::CorruptRecord(format!("invalid owner id '{}'", owner_id)))?;

    let task_type = MentalTask::try_from(reader.read_u32()?)
        .map_err(|e| NeuroLockError::CorruptRecord(e.to_string()))?;
    let created_at = reader.read_i64()?;
    let last_used = reader.read_i64()?;

    let feature_count = reader.read_len(FEATURE_WIDTH)?;
    let feature_bytes = reader.take(feature_count * FEATURE_WIDTH)?;
    let feature_vector =
        FeatureVector::from_le_bytes(feature_bytes, task_type, capture_stamp(created_at))?;

    let digest_len = reader.read_len(1)?;
    let mut digest = Zeroizing::new(try_with_capacity::<u8>(digest_len)?);
    digest.extend_from_slice(reader.take(digest_len)?);

    let salt_len = reader.read_len(1)?;
    let mut salt = Zeroizing::new(try_with_capacity::<u8>(salt_len)?);
    salt.extend_from_slice(reader.take(salt_len)?);

    if reader.remaining() != 0 {
        return Err(NeuroLockError::CorruptRecord(format!(
            "{} trailing bytes after salt",
            reader.remaining()
        )));
    }

    Ok(Template {
        owner_id,
        task_type,
        feature_vector,
        digest: SaltedDigest::from_parts(std::mem::take(&mut *digest), std::mem::take(&mut *salt)),
        created_at,
        last_used,
        format_version,
    })
}

struct RecordReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(NeuroLockError::CorruptRecord(format!(
                "need {} bytes at offset {}, only {} remain",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    /// Element count whose payload (`count * width` bytes) must fit in what
    /// is left of the record.
    fn read_len(&mut self, width: usize) -> Result<usize> {
        let declared = u64::from_le_bytes(self.take_array()?);
        let count = usize::try_from(declared).map_err(|_| {
            NeuroLockError::CorruptRecord(format!("length {} does not fit in memory", declared))
        })?;
        match count.checked_mul(width) {
            Some(needed) if needed <= self.remaining() => Ok(count),
            _ => Err(NeuroLockError::CorruptRecord(format!(
                "declared length {} exceeds remaining {} bytes",
                declared,
                self.remaining()
            ))),
        }
    }
}
