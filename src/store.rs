use crate::games::GameRow;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const STORE_MAGIC: &[u8; 4] = b"PVLT";
const STORE_VERSION: u32 = 1;
const SCHEMA_FORMAT: &str = "pgnvault-games";

// magic(4) version(4) committed(4) records_end(8) index_offset(8) checksum(32)
const HEADER_LEN: u64 = 60;
const CHECKSUM_CHUNK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path}: not a pgnvault store")]
    BadMagic { path: PathBuf },

    #[error("unsupported store version {got} (this build reads version {supported})")]
    UnsupportedVersion { got: u32, supported: u32 },

    #[error("store corrupt: {reason}")]
    Corrupt { reason: String },

    #[error("schema mismatch: {reason}")]
    SchemaMismatch { reason: String },

    #[error("no open transaction")]
    NoTransaction,

    #[error("transaction already open")]
    TransactionOpen,
}

/// Self-description written into the store right after the fixed header.
/// Append-mode opens refuse files whose schema does not match this build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schema {
    pub format: String,
    pub version: u32,
    pub columns: Vec<String>,
}

impl Schema {
    fn current() -> Self {
        Self {
            format: SCHEMA_FORMAT.to_string(),
            version: STORE_VERSION,
            columns: [
                "event", "site", "date", "round", "white", "black", "result", "eco", "opening",
                "parse_error", "moves",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        }
    }
}

/// File-backed game store. Inserted rows are buffered in memory, appended to
/// the file on `flush`, and become visible to readers only once
/// `end_transaction` rewrites the header: committed count, record-region end
/// and a blake3 checksum over the record region advance together. A reader
/// opening the file mid-transaction sees the previous commit.
#[derive(Debug)]
pub struct GameStore {
    path: PathBuf,
    file: File,
    schema: Option<Schema>,
    committed: u32,
    records_start: u64,
    records_end: u64,
    index_offset: u64,
    flushed_end: u64,
    flushed_count: u32,
    pending: Vec<Vec<u8>>,
    in_transaction: bool,
}

impl GameStore {
    /// Create a brand-new store file. Refuses to overwrite an existing file.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        let mut store = Self {
            path: path.to_path_buf(),
            file,
            schema: None,
            committed: 0,
            records_start: HEADER_LEN + 4,
            records_end: HEADER_LEN + 4,
            index_offset: 0,
            flushed_end: HEADER_LEN + 4,
            flushed_count: 0,
            pending: Vec::new(),
            in_transaction: false,
        };
        store.write_header(&[0u8; 32])?;
        store.file.seek(SeekFrom::Start(HEADER_LEN))?;
        store.file.write_all(&0u32.to_le_bytes())?;
        store.file.sync_all()?;
        debug!(path = %path.display(), "created store");
        Ok(store)
    }

    /// Open an existing store read-write, verifying magic, version, schema
    /// and the committed-region checksum.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut store = Self {
            path: path.to_path_buf(),
            file,
            schema: None,
            committed: 0,
            records_start: 0,
            records_end: 0,
            index_offset: 0,
            flushed_end: 0,
            flushed_count: 0,
            pending: Vec::new(),
            in_transaction: false,
        };

        let mut header = [0u8; HEADER_LEN as usize];
        store.file.seek(SeekFrom::Start(0))?;
        store.file.read_exact(&mut header).map_err(|_| StoreError::Corrupt {
            reason: "truncated header".to_string(),
        })?;
        if &header[0..4] != STORE_MAGIC {
            return Err(StoreError::BadMagic {
                path: path.to_path_buf(),
            });
        }
        let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if version != STORE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                got: version,
                supported: STORE_VERSION,
            });
        }
        store.committed = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        store.records_end = u64::from_le_bytes(
            header[12..20]
                .try_into()
                .map_err(|_| StoreError::Corrupt {
                    reason: "short header field".to_string(),
                })?,
        );
        store.index_offset = u64::from_le_bytes(
            header[20..28]
                .try_into()
                .map_err(|_| StoreError::Corrupt {
                    reason: "short header field".to_string(),
                })?,
        );
        let mut expected = [0u8; 32];
        expected.copy_from_slice(&header[28..60]);

        let mut len_bytes = [0u8; 4];
        store.file.read_exact(&mut len_bytes).map_err(|_| StoreError::Corrupt {
            reason: "missing schema block".to_string(),
        })?;
        let schema_len = u32::from_le_bytes(len_bytes) as usize;
        if schema_len == 0 {
            return Err(StoreError::Corrupt {
                reason: "schema block was never written".to_string(),
            });
        }
        let mut schema_bytes = vec![0u8; schema_len];
        store.file.read_exact(&mut schema_bytes).map_err(|_| StoreError::Corrupt {
            reason: "truncated schema block".to_string(),
        })?;
        let schema: Schema =
            serde_json::from_slice(&schema_bytes).map_err(|err| StoreError::Corrupt {
                reason: format!("unreadable schema block: {err}"),
            })?;
        if schema.format != SCHEMA_FORMAT {
            return Err(StoreError::SchemaMismatch {
                reason: format!("format {:?}", schema.format),
            });
        }
        if schema.version != STORE_VERSION {
            return Err(StoreError::SchemaMismatch {
                reason: format!("schema version {}", schema.version),
            });
        }
        store.schema = Some(schema);
        store.records_start = HEADER_LEN + 4 + schema_len as u64;
        if store.records_end < store.records_start {
            return Err(StoreError::Corrupt {
                reason: "record region ends before it starts".to_string(),
            });
        }
        let actual = store.region_checksum(store.records_start, store.records_end)?;
        if actual != expected {
            return Err(StoreError::Corrupt {
                reason: "record region checksum mismatch".to_string(),
            });
        }
        store.flushed_end = store.records_end;
        debug!(path = %path.display(), games = store.committed, "opened store");
        Ok(store)
    }

    pub fn begin_transaction(&mut self) -> Result<(), StoreError> {
        if self.in_transaction {
            return Err(StoreError::TransactionOpen);
        }
        self.in_transaction = true;
        self.pending.clear();
        self.flushed_count = 0;
        self.flushed_end = self.records_end;
        Ok(())
    }

    /// Write the schema block. Only valid on a freshly created store before
    /// any rows exist; append-mode opens load the existing block instead.
    pub fn create_schema(&mut self) -> Result<(), StoreError> {
        if self.schema.is_some() || self.committed > 0 || self.flushed_count > 0 {
            return Err(StoreError::Corrupt {
                reason: "schema block must be written before any games".to_string(),
            });
        }
        let schema = Schema::current();
        let bytes = serde_json::to_vec(&schema).map_err(|err| StoreError::Corrupt {
            reason: format!("schema serialization: {err}"),
        })?;
        self.file.seek(SeekFrom::Start(HEADER_LEN))?;
        self.file.write_all(&(bytes.len() as u32).to_le_bytes())?;
        self.file.write_all(&bytes)?;
        self.records_start = HEADER_LEN + 4 + bytes.len() as u64;
        self.records_end = self.records_start;
        self.flushed_end = self.records_start;
        self.schema = Some(schema);
        Ok(())
    }

    /// Committed rows plus anything inserted in the open transaction.
    pub fn count_records(&self) -> u32 {
        self.committed + self.flushed_count + self.pending.len() as u32
    }

    pub fn insert_game(&mut self, id: u32, row: &GameRow) -> Result<(), StoreError> {
        if !self.in_transaction {
            return Err(StoreError::NoTransaction);
        }
        if self.schema.is_none() {
            return Err(StoreError::Corrupt {
                reason: "store has no schema".to_string(),
            });
        }
        self.pending.push(encode_record(id, row));
        Ok(())
    }

    /// Append buffered rows to the file. They stay invisible to readers
    /// until `end_transaction` commits.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        // Appending past the committed region invalidates any index block
        // that lived there.
        self.index_offset = 0;
        self.file.seek(SeekFrom::Start(self.flushed_end))?;
        let mut written = 0u64;
        let count = self.pending.len() as u32;
        for record in self.pending.drain(..) {
            self.file.write_all(&(record.len() as u32).to_le_bytes())?;
            self.file.write_all(&record)?;
            written += 4 + record.len() as u64;
        }
        self.file.flush()?;
        self.flushed_end += written;
        self.flushed_count += count;
        debug!(rows = count, bytes = written, "flushed game rows");
        Ok(())
    }

    /// Commit: everything flushed in this transaction becomes durable and
    /// visible in one header rewrite.
    pub fn end_transaction(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction {
            return Err(StoreError::NoTransaction);
        }
        self.flush()?;
        self.records_end = self.flushed_end;
        self.committed += self.flushed_count;
        self.flushed_count = 0;
        let checksum = self.region_checksum(self.records_start, self.records_end)?;
        self.write_header(&checksum)?;
        self.file.sync_all()?;
        self.in_transaction = false;
        debug!(games = self.committed, "committed transaction");
        Ok(())
    }

    /// Append an id-to-offset table after the committed records and point
    /// the header at it. Only meaningful after a commit.
    pub fn create_indexes(&mut self) -> Result<(), StoreError> {
        if self.in_transaction {
            return Err(StoreError::TransactionOpen);
        }
        let entries = self.scan_offsets()?;
        self.file.seek(SeekFrom::Start(self.records_end))?;
        self.file.write_all(&(entries.len() as u32).to_le_bytes())?;
        for (id, offset) in &entries {
            self.file.write_all(&id.to_le_bytes())?;
            self.file.write_all(&offset.to_le_bytes())?;
        }
        self.index_offset = self.records_end;
        let checksum = self.region_checksum(self.records_start, self.records_end)?;
        self.write_header(&checksum)?;
        self.file.sync_all()?;
        debug!(entries = entries.len(), "built id index");
        Ok(())
    }

    /// Read every committed row in file order.
    pub fn read_all(&mut self) -> Result<Vec<(u32, GameRow)>, StoreError> {
        let len = (self.records_end - self.records_start) as usize;
        let mut region = vec![0u8; len];
        self.file.seek(SeekFrom::Start(self.records_start))?;
        self.file.read_exact(&mut region)?;

        let mut rows = Vec::with_capacity(self.committed as usize);
        let mut offset = 0usize;
        while offset < region.len() {
            let record_len = read_u32(&region, &mut offset)? as usize;
            if offset + record_len > region.len() {
                return Err(StoreError::Corrupt {
                    reason: "record overruns region".to_string(),
                });
            }
            let payload = &region[offset..offset + record_len];
            offset += record_len;
            rows.push(decode_record(payload)?);
        }
        Ok(rows)
    }

    /// Drop uncommitted tail bytes and close the handle.
    pub fn close(self) -> Result<(), StoreError> {
        let valid_end = if self.index_offset > 0 {
            self.index_offset + 4 + self.committed as u64 * 12
        } else {
            self.records_end
        };
        self.file.set_len(valid_end)?;
        self.file.sync_all()?;
        Ok(())
    }

    fn write_header(&mut self, checksum: &[u8; 32]) -> Result<(), StoreError> {
        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        header.extend_from_slice(STORE_MAGIC);
        header.extend_from_slice(&STORE_VERSION.to_le_bytes());
        header.extend_from_slice(&self.committed.to_le_bytes());
        header.extend_from_slice(&self.records_end.to_le_bytes());
        header.extend_from_slice(&self.index_offset.to_le_bytes());
        header.extend_from_slice(checksum);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        Ok(())
    }

    fn region_checksum(&mut self, start: u64, end: u64) -> Result<[u8; 32], StoreError> {
        let mut hasher = blake3::Hasher::new();
        let mut remaining = end.saturating_sub(start);
        let mut buf = vec![0u8; CHECKSUM_CHUNK];
        self.file.seek(SeekFrom::Start(start))?;
        while remaining > 0 {
            let take = remaining.min(CHECKSUM_CHUNK as u64) as usize;
            self.file.read_exact(&mut buf[..take])?;
            hasher.update(&buf[..take]);
            remaining -= take as u64;
        }
        Ok(*hasher.finalize().as_bytes())
    }

    fn scan_offsets(&mut self) -> Result<Vec<(u32, u64)>, StoreError> {
        let len = (self.records_end - self.records_start) as usize;
        let mut region = vec![0u8; len];
        self.file.seek(SeekFrom::Start(self.records_start))?;
        self.file.read_exact(&mut region)?;

        let mut entries = Vec::with_capacity(self.committed as usize);
        let mut offset = 0usize;
        while offset < region.len() {
            let record_offset = self.records_start + offset as u64;
            let record_len = read_u32(&region, &mut offset)? as usize;
            if offset + record_len > region.len() {
                return Err(StoreError::Corrupt {
                    reason: "record overruns region".to_string(),
                });
            }
            let mut cursor = offset;
            let id = read_u32(&region, &mut cursor)?;
            entries.push((id, record_offset));
            offset += record_len;
        }
        entries.sort_by_key(|(id, _)| *id);
        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn encode_record(id: u32, row: &GameRow) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&id.to_le_bytes());
    for field in [
        &row.event,
        &row.site,
        &row.date,
        &row.round,
        &row.white,
        &row.black,
        &row.result,
        &row.eco,
        &row.opening,
        &row.parse_error,
    ] {
        write_str(&mut out, field.as_deref().unwrap_or(""));
    }
    out.extend_from_slice(&(row.moves.len() as u32).to_le_bytes());
    out.extend_from_slice(&row.moves);
    out
}

fn decode_record(payload: &[u8]) -> Result<(u32, GameRow), StoreError> {
    let mut offset = 0usize;
    let id = read_u32(payload, &mut offset)?;
    let mut fields = Vec::with_capacity(10);
    for _ in 0..10 {
        fields.push(read_str(payload, &mut offset)?);
    }
    let blob_len = read_u32(payload, &mut offset)? as usize;
    if offset + blob_len > payload.len() {
        return Err(StoreError::Corrupt {
            reason: "move blob overruns record".to_string(),
        });
    }
    let moves = payload[offset..offset + blob_len].to_vec();

    let mut fields = fields.into_iter();
    let mut next = || fields.next().filter(|s: &String| !s.is_empty());
    Ok((
        id,
        GameRow {
            event: next(),
            site: next(),
            date: next(),
            round: next(),
            white: next(),
            black: next(),
            result: next(),
            eco: next(),
            opening: next(),
            parse_error: next(),
            moves,
        },
    ))
}

fn write_str(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

fn read_str(bytes: &[u8], offset: &mut usize) -> Result<String, StoreError> {
    let len = read_u32(bytes, offset)? as usize;
    if *offset + len > bytes.len() {
        return Err(StoreError::Corrupt {
            reason: "string overruns record".to_string(),
        });
    }
    let value = String::from_utf8_lossy(&bytes[*offset..*offset + len]).into_owned();
    *offset += len;
    Ok(value)
}

fn read_u32(bytes: &[u8], offset: &mut usize) -> Result<u32, StoreError> {
    if *offset + 4 > bytes.len() {
        return Err(StoreError::Corrupt {
            reason: "truncated integer".to_string(),
        });
    }
    let value = u32::from_le_bytes([
        bytes[*offset],
        bytes[*offset + 1],
        bytes[*offset + 2],
        bytes[*offset + 3],
    ]);
    *offset += 4;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_row(white: &str, moves: &[u8]) -> GameRow {
        GameRow {
            event: Some("Test Open".to_string()),
            white: Some(white.to_string()),
            black: Some("Opponent".to_string()),
            result: Some("1-0".to_string()),
            moves: moves.to_vec(),
            ..GameRow::default()
        }
    }

    #[test]
    fn create_commit_reopen_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("games.pvlt");

        let mut store = GameStore::create(&path).unwrap();
        store.begin_transaction().unwrap();
        store.create_schema().unwrap();
        store.insert_game(0, &sample_row("Adams", &[1, 2, 3])).unwrap();
        store.insert_game(1, &sample_row("Baird", &[1, 2, 4])).unwrap();
        store.flush().unwrap();
        store.end_transaction().unwrap();
        store.create_indexes().unwrap();
        store.close().unwrap();

        let mut store = GameStore::open(&path).unwrap();
        assert_eq!(store.count_records(), 2);
        let rows = store.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 0);
        assert_eq!(rows[0].1.white.as_deref(), Some("Adams"));
        assert_eq!(rows[1].1.moves, vec![1, 2, 4]);
        store.close().unwrap();
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("games.pvlt");
        std::fs::write(&path, b"something").unwrap();
        assert!(GameStore::create(&path).is_err());
    }

    #[test]
    fn uncommitted_rows_are_invisible() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("games.pvlt");

        let mut store = GameStore::create(&path).unwrap();
        store.begin_transaction().unwrap();
        store.create_schema().unwrap();
        store.insert_game(0, &sample_row("Adams", &[9])).unwrap();
        store.insert_game(1, &sample_row("Baird", &[9])).unwrap();
        store.end_transaction().unwrap();
        store.close().unwrap();

        let mut store = GameStore::open(&path).unwrap();
        store.begin_transaction().unwrap();
        store.insert_game(2, &sample_row("Clarke", &[9])).unwrap();
        store.flush().unwrap();
        // No end_transaction: simulate an abort by closing the handle.
        store.close().unwrap();

        let mut store = GameStore::open(&path).unwrap();
        assert_eq!(store.count_records(), 2);
        assert_eq!(store.read_all().unwrap().len(), 2);
        store.close().unwrap();
    }

    #[test]
    fn insert_outside_transaction_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("games.pvlt");
        let mut store = GameStore::create(&path).unwrap();
        let err = store.insert_game(0, &sample_row("Adams", &[1])).unwrap_err();
        assert!(matches!(err, StoreError::NoTransaction));
    }

    #[test]
    fn open_missing_schema_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("games.pvlt");
        let store = GameStore::create(&path).unwrap();
        store.close().unwrap();
        let err = GameStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn open_rejects_foreign_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("games.pvlt");
        std::fs::write(&path, vec![0u8; 128]).unwrap();
        let err = GameStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::BadMagic { .. }));
    }

    #[test]
    fn second_transaction_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("games.pvlt");

        let mut store = GameStore::create(&path).unwrap();
        store.begin_transaction().unwrap();
        store.create_schema().unwrap();
        store.insert_game(0, &sample_row("Adams", &[5])).unwrap();
        store.end_transaction().unwrap();
        store.create_indexes().unwrap();
        store.close().unwrap();

        let mut store = GameStore::open(&path).unwrap();
        store.begin_transaction().unwrap();
        let next_id = store.count_records();
        store
            .insert_game(next_id, &sample_row("Baird", &[6]))
            .unwrap();
        store.flush().unwrap();
        store.end_transaction().unwrap();
        store.close().unwrap();

        let mut store = GameStore::open(&path).unwrap();
        let rows = store.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].0, 1);
        assert_eq!(rows[1].1.white.as_deref(), Some("Baird"));
        store.close().unwrap();
    }
}
