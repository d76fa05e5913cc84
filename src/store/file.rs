//! Binary per-session storage for chunk embeddings.
//!
//! Each session lives in `<dir>/<sha256(session_id)>.bin`, with a sibling
//! `.lock` file that writers hold across their read-modify-write.
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - item_id: [u8; 26] (ULID, ASCII)
//! - chunk_len: u32 (little-endian)
//! - chunk: [u8; chunk_len] (UTF-8)
//! - embedding: [f32; dimensions] (little-endian)
//! - checksum: u32 (CRC32 of the entry bytes before checksum)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Take, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;

use crate::eid::{ItemId, ITEM_ID_LEN};
use crate::store::lock::FileLock;
use crate::store::{ChunkStore, NewItem, StoreError, StoredItem};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Store that keeps one checksummed binary file per session.
///
/// Appends rewrite the session file through a uniquely named temp file and
/// a rename, so a batch is either fully visible or not at all. Writers to
/// one session are serialized across processes by an advisory lock on the
/// session's lock file; readers never block.
pub struct FileStore {
    dir: PathBuf,
    model_id: [u8; 32],
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store rooted at `dir` for vectors produced by `model_id`.
    pub fn new(dir: PathBuf, model_id: [u8; 32]) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            model_id,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the file holding `session_id`.
    pub fn session_path(&self, session_id: &str) -> PathBuf {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(session_id.as_bytes());
        let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.dir.join(format!("{name}.bin"))
    }

    fn load(&self, path: &Path, session_id: &str) -> Result<SessionFile, StoreError> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;
        if header.model_id != self.model_id {
            return Err(StoreError::ModelMismatch);
        }

        let dimensions = header.dimensions as usize;
        let mut body = reader.take(file_len.saturating_sub(HEADER_SIZE as u64));
        let mut items = Vec::with_capacity(header.entry_count.min(1 << 16) as usize);
        for _ in 0..header.entry_count {
            items.push(read_entry(&mut body, session_id, dimensions)?);
        }

        Ok(SessionFile { dimensions, items })
    }

    /// Write `session` to `path` atomically.
    ///
    /// The temp file is removed when dropped, so a failed write or rename
    /// leaves nothing behind.
    fn save(&self, path: &Path, session: &SessionFile) -> Result<(), StoreError> {
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        write_session(temp.as_file_mut(), &self.model_id, session)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl ChunkStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn append(
        &self,
        session_id: &str,
        chunk: &str,
        embedding: &[f32],
    ) -> Result<ItemId, StoreError> {
        let ids = self.append_all(
            session_id,
            &[NewItem {
                chunk: chunk.to_string(),
                embedding: embedding.to_vec(),
            }],
        )?;
        ids.into_iter()
            .next()
            .ok_or_else(|| StoreError::InvalidFormat("append produced no id".to_string()))
    }

    fn append_all(&self, session_id: &str, items: &[NewItem]) -> Result<Vec<ItemId>, StoreError> {
        if items.is_empty() {
            return Ok(vec![]);
        }

        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;

        let path = self.session_path(session_id);
        let _file_lock = FileLock::acquire_blocking(&path.with_extension("lock"))?;

        let mut session = if path.exists() {
            self.load(&path, session_id)?
        } else {
            SessionFile {
                dimensions: items[0].embedding.len(),
                items: Vec::new(),
            }
        };

        if let Some(bad) = items
            .iter()
            .find(|item| item.embedding.len() != session.dimensions)
        {
            return Err(StoreError::DimensionMismatch {
                expected: session.dimensions,
                got: bad.embedding.len(),
            });
        }

        let ids: Vec<ItemId> = items.iter().map(|_| ItemId::new()).collect();
        session
            .items
            .extend(items.iter().zip(ids.iter()).map(|(item, id)| StoredItem {
                id: id.clone(),
                session_id: session_id.to_string(),
                chunk: item.chunk.clone(),
                embedding: item.embedding.clone(),
            }));

        self.save(&path, &session)?;
        log::debug!(
            "Stored {} chunks for session '{session_id}' ({} total)",
            ids.len(),
            session.items.len()
        );

        Ok(ids)
    }

    fn fetch_all(&self, session_id: &str) -> Result<Vec<StoredItem>, StoreError> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Ok(vec![]);
        }
        Ok(self.load(&path, session_id)?.items)
    }

    fn health_check(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let probe = self.dir.join(format!(".health-{}", ItemId::new()));
        std::fs::write(&probe, b"ok")?;
        std::fs::remove_file(&probe)?;
        Ok(())
    }
}

/// Decoded contents of one session file.
struct SessionFile {
    dimensions: usize,
    items: Vec<StoredItem>,
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

fn write_session(
    file: &mut File,
    model_id: &[u8; 32],
    session: &SessionFile,
) -> Result<(), StoreError> {
    let dimensions = u16::try_from(session.dimensions).map_err(|_| {
        StoreError::InvalidFormat(format!(
            "{} dimensions exceed the format limit of {}",
            session.dimensions,
            u16::MAX
        ))
    })?;

    let mut writer = BufWriter::new(file);

    let header = Header {
        version: FORMAT_VERSION,
        model_id: *model_id,
        dimensions,
        entry_count: session.items.len() as u64,
    };
    write_header(&mut writer, &header)?;

    for item in &session.items {
        write_entry(&mut writer, item)?;
    }

    writer.flush()?;
    Ok(())
}

fn read_header<R: Read>(reader: &mut R) -> Result<Header, StoreError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            StoreError::InvalidFormat("file shorter than header".to_string())
        }
        _ => StoreError::Io(e),
    })?;

    let version = header_bytes[0];

    // Version check first
    if version != FORMAT_VERSION {
        return Err(StoreError::VersionMismatch(version, FORMAT_VERSION));
    }

    let stored_checksum = u32::from_le_bytes([
        header_bytes[43],
        header_bytes[44],
        header_bytes[45],
        header_bytes[46],
    ]);

    // Verify checksum (computed over header without checksum field)
    if stored_checksum != crc32fast::hash(&header_bytes[0..43]) {
        return Err(StoreError::ChecksumMismatch);
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[1..33]);

    let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);

    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header_bytes[35..43]);
    let entry_count = u64::from_le_bytes(count_bytes);

    Ok(Header {
        version,
        model_id,
        dimensions,
        entry_count,
    })
}

fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<(), StoreError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = header.version;
    header_bytes[1..33].copy_from_slice(&header.model_id);
    header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

/// Read one entry from the file body.
///
/// `reader` is limited to the bytes left in the file, so a corrupt length
/// is rejected before anything is allocated for it.
fn read_entry<R: Read>(
    reader: &mut Take<R>,
    session_id: &str,
    dimensions: usize,
) -> Result<StoredItem, StoreError> {
    let truncated = |e: std::io::Error| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            StoreError::InvalidFormat("truncated entry".to_string())
        }
        _ => StoreError::Io(e),
    };
    let mut hasher = crc32fast::Hasher::new();

    let mut id_bytes = [0u8; ITEM_ID_LEN];
    reader.read_exact(&mut id_bytes).map_err(truncated)?;
    hasher.update(&id_bytes);

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).map_err(truncated)?;
    hasher.update(&len_bytes);
    let chunk_len = u32::from_le_bytes(len_bytes) as u64;

    // chunk + embedding + checksum
    let remaining = chunk_len + dimensions as u64 * 4 + 4;
    if remaining > reader.limit() {
        return Err(StoreError::InvalidFormat(format!(
            "entry needs {remaining} bytes, {} left in file",
            reader.limit()
        )));
    }

    let mut chunk_bytes = vec![0u8; chunk_len as usize];
    reader.read_exact(&mut chunk_bytes).map_err(truncated)?;
    hasher.update(&chunk_bytes);

    let mut embedding_bytes = vec![0u8; dimensions * 4];
    reader.read_exact(&mut embedding_bytes).map_err(truncated)?;
    hasher.update(&embedding_bytes);

    let mut checksum_bytes = [0u8; 4];
    reader.read_exact(&mut checksum_bytes).map_err(truncated)?;
    if u32::from_le_bytes(checksum_bytes) != hasher.finalize() {
        return Err(StoreError::ChecksumMismatch);
    }

    let id = std::str::from_utf8(&id_bytes)
        .ok()
        .and_then(|s| s.parse::<ItemId>().ok())
        .ok_or_else(|| StoreError::InvalidFormat("invalid item id".to_string()))?;
    let chunk = String::from_utf8(chunk_bytes)
        .map_err(|_| StoreError::InvalidFormat("chunk is not valid UTF-8".to_string()))?;
    let embedding = embedding_bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(StoredItem {
        id,
        session_id: session_id.to_string(),
        chunk,
        embedding,
    })
}

fn write_entry<W: Write>(writer: &mut W, item: &StoredItem) -> Result<(), StoreError> {
    if item.id.len() != ITEM_ID_LEN {
        return Err(StoreError::InvalidFormat(format!("invalid item id {}", item.id)));
    }
    let chunk_len = u32::try_from(item.chunk.len())
        .map_err(|_| StoreError::InvalidFormat("chunk too large".to_string()))?
        .to_le_bytes();

    let mut hasher = crc32fast::Hasher::new();
    for part in [item.id.as_bytes(), &chunk_len[..], item.chunk.as_bytes()] {
        hasher.update(part);
        writer.write_all(part)?;
    }

    for &value in &item.embedding {
        let bytes = value.to_le_bytes();
        hasher.update(&bytes);
        writer.write_all(&bytes)?;
    }

    writer.write_all(&hasher.finalize().to_le_bytes())?;
    Ok(())
}
