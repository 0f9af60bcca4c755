// Database - RocksDB abstraction
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::Path;
use std::sync::Arc;

/// Wrapper around RocksDB
pub struct Database {
    db: Arc<DB>,
}

impl Database {
    /// Open or create a database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        // Limit file accumulation to avoid "Too many open files"
        opts.set_keep_log_file_num(5);
        opts.set_max_manifest_file_size(64 * 1024 * 1024);
        opts.set_max_background_jobs(2);
        opts.set_recycle_log_file_num(2);

        let db = DB::open(&opts, path).map_err(|e| DatabaseError::OpenFailed(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError> {
        self.db
            .get(key)
            .map_err(|e| DatabaseError::ReadFailed(e.to_string()))
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), DatabaseError> {
        self.db
            .put(key, value)
            .map_err(|e| DatabaseError::WriteFailed(e.to_string()))
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), DatabaseError> {
        self.db
            .delete(key)
            .map_err(|e| DatabaseError::WriteFailed(e.to_string()))
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool, DatabaseError> {
        Ok(self.get(key)?.is_some())
    }

    /// Atomic batch write
    pub fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), DatabaseError> {
        let mut batch = rocksdb::WriteBatch::default();

        for op in ops {
            match op {
                WriteOp::Put { key, value } => batch.put(&key, &value),
                WriteOp::Delete { key } => batch.delete(&key),
            }
        }

        self.db
            .write(batch)
            .map_err(|e| DatabaseError::WriteFailed(e.to_string()))
    }

    /// Collect all entries with keys in `[start, end)`, ascending
    pub fn scan_range(&self, start: &[u8], end: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(start, Direction::Forward));
        for item in iter {
            match item {
                Ok((key, value)) => {
                    if key.as_ref() >= end {
                        break;
                    }
                    out.push((key.to_vec(), value.to_vec()));
                }
                Err(e) => {
                    tracing::warn!("skipping corrupt db entry during scan: {e}");
                }
            }
        }
        out
    }

    /// Largest entry with key `<= key`, or `None`
    pub fn seek_at_or_before(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        let mut iter = self
            .db
            .iterator(IteratorMode::From(key, Direction::Reverse));
        match iter.next() {
            Some(Ok((k, v))) => Some((k.to_vec(), v.to_vec())),
            _ => None,
        }
    }
}

/// A single write operation for batch writes
#[derive(Debug, Clone)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("failed to open database: {0}")]
    OpenFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),
}
