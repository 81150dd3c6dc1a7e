//! Append-only file backend.
//!
//! Every effective mutation becomes one length-prefixed `bincode` record:
//!
//! ```text
//! ┌──────────────┬─────────────────────────────┐
//! │ len: u32 LE  │ LogRecord (len bytes)       │  ... repeated
//! └──────────────┴─────────────────────────────┘
//! ```
//!
//! Opening folds the log into the net [`Snapshot`]. A trailing record cut
//! short by a crash is dropped and the file truncated back to the last whole
//! record, so later appends stay aligned. A length prefix above
//! [`MAX_RECORD_LEN`] or a whole record that fails to decode is corruption,
//! not a torn tail, and fails the open.

use ahash::AHashMap;
use graphdb_core::{ItemId, PersistentBackend, Snapshot};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Largest record the log accepts.
pub const MAX_RECORD_LEN: u32 = 16 * 1024 * 1024;

// ============================================================================
// Log Records
// ============================================================================

/// One log entry. Written with borrowed payloads (`LogRecord<&V, &str>`),
/// read back owned (`LogRecord<V>`); both encode identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord<V, P = String> {
    PutItem {
        id: ItemId,
        value: V,
    },
    RetractItem {
        id: ItemId,
    },
    PutRelation {
        subject: ItemId,
        predicate: P,
        object: ItemId,
    },
    RetractRelation {
        subject: ItemId,
        predicate: P,
        object: ItemId,
    },
    /// Undoes the `PutRelation` right before it, keys included.
    RevertRelation {
        subject: ItemId,
        predicate: P,
        object: ItemId,
    },
    /// Predicates keyed on `item`; written by compaction so emptied
    /// predicates survive it.
    Keys {
        item: ItemId,
        outgoing: Vec<P>,
        incoming: Vec<P>,
    },
}

/// Result of [`FileBackend::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    pub records_before: usize,
    pub records_after: usize,
}

struct LogScan<V> {
    records: Vec<LogRecord<V>>,
    valid_len: u64,
    file_len: u64,
}

// ============================================================================
// File Backend
// ============================================================================

/// Durable backend writing an append-only record log.
pub struct FileBackend<V> {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
    _values: PhantomData<fn() -> V>,
}

impl<V: Serialize + DeserializeOwned> FileBackend<V> {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let backend = Self {
            writer: Mutex::new(BufWriter::new(open_append(path)?)),
            path: path.to_path_buf(),
            _values: PhantomData,
        };
        backend.repair_tail()?;
        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the log so it holds only the net snapshot.
    pub fn compact(&self) -> io::Result<CompactionStats> {
        let mut writer = self.writer.lock();
        writer.flush()?;
        let (snapshot, records_before) = self.replay()?;

        let tmp = self.path.with_extension("compact");
        let mut records_after = 0usize;
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for (id, value) in &snapshot.items {
                write_record(&mut out, &LogRecord::<&V, &str>::PutItem { id: *id, value })?;
                records_after += 1;
            }

            let mut keyed: BTreeMap<ItemId, (Vec<&str>, Vec<&str>)> = BTreeMap::new();
            for (item, preds) in &snapshot.outgoing_keys {
                keyed.entry(*item).or_default().0 = preds.iter().map(String::as_str).collect();
            }
            for (item, preds) in &snapshot.incoming_keys {
                keyed.entry(*item).or_default().1 = preds.iter().map(String::as_str).collect();
            }
            for (item, (outgoing, incoming)) in keyed {
                write_record(
                    &mut out,
                    &LogRecord::<&V, &str>::Keys {
                        item,
                        outgoing,
                        incoming,
                    },
                )?;
                records_after += 1;
            }
            for (subject, predicate, object) in &snapshot.relations {
                write_record(
                    &mut out,
                    &LogRecord::<&V, &str>::PutRelation {
                        subject: *subject,
                        predicate,
                        object: *object,
                    },
                )?;
                records_after += 1;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }

        fs::rename(&tmp, &self.path)?;
        *writer = BufWriter::new(open_append(&self.path)?);

        tracing::info!(
            path = %self.path.display(),
            records_before,
            records_after,
            "compacted graph log"
        );
        Ok(CompactionStats {
            records_before,
            records_after,
        })
    }

    fn append(&self, record: &LogRecord<&V, &str>) -> io::Result<()> {
        let mut writer = self.writer.lock();
        write_record(&mut *writer, record)
    }

    /// Cut a torn trailing record off the file.
    fn repair_tail(&self) -> io::Result<()> {
        let scan = scan_log::<V>(&self.path)?;
        if scan.valid_len < scan.file_len {
            tracing::warn!(
                path = %self.path.display(),
                valid_len = scan.valid_len,
                file_len = scan.file_len,
                "truncating incomplete trailing record in graph log"
            );
            let mut writer = self.writer.lock();
            writer.flush()?;
            writer.get_ref().set_len(scan.valid_len)?;
        }
        Ok(())
    }

    /// Fold the on-disk log into its net snapshot. Caller flushes first.
    fn replay(&self) -> io::Result<(Snapshot<V>, usize)> {
        let scan = scan_log::<V>(&self.path)?;
        let count = scan.records.len();
        Ok((fold(scan.records), count))
    }
}

impl<V: Serialize + DeserializeOwned> PersistentBackend<V> for FileBackend<V> {
    fn persist_item(&self, id: ItemId, value: &V) -> io::Result<()> {
        self.append(&LogRecord::PutItem { id, value })
    }

    fn retract_item(&self, id: ItemId) -> io::Result<()> {
        self.append(&LogRecord::RetractItem { id })
    }

    fn persist_relation(&self, subject: ItemId, predicate: &str, object: ItemId) -> io::Result<()> {
        self.append(&LogRecord::PutRelation {
            subject,
            predicate,
            object,
        })
    }

    fn retract_relation(&self, subject: ItemId, predicate: &str, object: ItemId) -> io::Result<()> {
        self.append(&LogRecord::RetractRelation {
            subject,
            predicate,
            object,
        })
    }

    fn revert_relation(&self, subject: ItemId, predicate: &str, object: ItemId) -> io::Result<()> {
        self.append(&LogRecord::RevertRelation {
            subject,
            predicate,
            object,
        })
    }

    fn load_all(&self) -> io::Result<Snapshot<V>> {
        self.writer.lock().flush()?;
        let (snapshot, records) = self.replay()?;
        tracing::info!(
            path = %self.path.display(),
            records,
            items = snapshot.items.len(),
            relations = snapshot.relations.len(),
            "loaded graph log"
        );
        Ok(snapshot)
    }

    fn flush(&self) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writer.flush()?;
        writer.get_ref().sync_data()
    }

    fn close(&self) -> io::Result<()> {
        self.flush()
    }
}

// ============================================================================
// Encoding helpers
// ============================================================================

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
}

fn invalid_data(err: impl std::error::Error + Send + Sync + 'static) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

fn write_record<W: Write, R: Serialize>(out: &mut W, record: &R) -> io::Result<()> {
    let data = bincode::serialize(record).map_err(invalid_data)?;
    let len = u32::try_from(data.len()).map_err(invalid_data)?;
    if len > MAX_RECORD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("log record of {len} bytes exceeds {MAX_RECORD_LEN}"),
        ));
    }
    out.write_all(&len.to_le_bytes())?;
    out.write_all(&data)
}

fn scan_log<V: DeserializeOwned>(path: &Path) -> io::Result<LogScan<V>> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut valid_len = 0u64;

    loop {
        let mut len_bytes = [0u8; 4];
        match reader.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }

        let len = u32::from_le_bytes(len_bytes);
        if len > MAX_RECORD_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("corrupt log record length {len} at offset {valid_len}"),
            ));
        }
        let len = u64::from(len);
        // Only the last record can run past the end of the file.
        if valid_len + 4 + len > file_len {
            break;
        }

        let mut data = vec![0u8; len as usize];
        reader.read_exact(&mut data)?;
        let record: LogRecord<V> = bincode::deserialize(&data).map_err(invalid_data)?;
        records.push(record);
        valid_len += 4 + len;
    }

    Ok(LogScan {
        records,
        valid_len,
        file_len,
    })
}

/// Apply records in order, keeping relations in insertion order and
/// predicate keys in first-use order.
fn fold<V>(records: Vec<LogRecord<V>>) -> Snapshot<V> {
    let mut items: BTreeMap<ItemId, V> = BTreeMap::new();
    let mut relations: Vec<Option<(ItemId, String, ItemId)>> = Vec::new();
    let mut positions: AHashMap<(ItemId, String, ItemId), usize> = AHashMap::new();
    let mut outgoing: BTreeMap<ItemId, Vec<String>> = BTreeMap::new();
    let mut incoming: BTreeMap<ItemId, Vec<String>> = BTreeMap::new();
    // Most recent new triple, with whether it created its outgoing and
    // incoming keys.
    let mut last_put: Option<((ItemId, String, ItemId), bool, bool)> = None;

    for record in records {
        let previous_put = last_put.take();
        match record {
            LogRecord::PutItem { id, value } => {
                items.insert(id, value);
            }
            LogRecord::RetractItem { id } => {
                items.remove(&id);
                outgoing.remove(&id);
                incoming.remove(&id);
                for slot in relations.iter_mut() {
                    if slot.as_ref().is_some_and(|(s, _, o)| *s == id || *o == id) {
                        if let Some(triple) = slot.take() {
                            positions.remove(&triple);
                        }
                    }
                }
            }
            LogRecord::PutRelation {
                subject,
                predicate,
                object,
            } => {
                let created_out = push_key(&mut outgoing, subject, &predicate);
                let created_in = push_key(&mut incoming, object, &predicate);
                let triple = (subject, predicate, object);
                if !positions.contains_key(&triple) {
                    positions.insert(triple.clone(), relations.len());
                    relations.push(Some(triple.clone()));
                    last_put = Some((triple, created_out, created_in));
                }
            }
            LogRecord::RetractRelation {
                subject,
                predicate,
                object,
            } => {
                if let Some(pos) = positions.remove(&(subject, predicate, object)) {
                    relations[pos] = None;
                }
            }
            LogRecord::RevertRelation {
                subject,
                predicate,
                object,
            } => {
                let triple = (subject, predicate, object);
                if let Some(pos) = positions.remove(&triple) {
                    relations[pos] = None;
                }
                if let Some((put, created_out, created_in)) = previous_put {
                    if put == triple {
                        if created_out {
                            pop_key(&mut outgoing, subject, &triple.1);
                        }
                        if created_in {
                            pop_key(&mut incoming, object, &triple.1);
                        }
                    }
                }
            }
            LogRecord::Keys {
                item,
                outgoing: out,
                incoming: inc,
            } => {
                for predicate in &out {
                    push_key(&mut outgoing, item, predicate);
                }
                for predicate in &inc {
                    push_key(&mut incoming, item, predicate);
                }
            }
        }
    }

    let live_keys = |keys: BTreeMap<ItemId, Vec<String>>| -> Vec<(ItemId, Vec<String>)> {
        keys.into_iter()
            .filter(|(item, preds)| items.contains_key(item) && !preds.is_empty())
            .collect()
    };
    let outgoing_keys = live_keys(outgoing);
    let incoming_keys = live_keys(incoming);

    Snapshot {
        items: items.into_iter().collect(),
        relations: relations.into_iter().flatten().collect(),
        outgoing_keys,
        incoming_keys,
    }
}

/// Returns whether the key was new.
fn push_key(keys: &mut BTreeMap<ItemId, Vec<String>>, item: ItemId, predicate: &str) -> bool {
    let preds = keys.entry(item).or_default();
    if preds.iter().any(|p| p == predicate) {
        return false;
    }
    preds.push(predicate.to_string());
    true
}

fn pop_key(keys: &mut BTreeMap<ItemId, Vec<String>>, item: ItemId, predicate: &str) {
    if let Some(preds) = keys.get_mut(&item) {
        preds.retain(|p| p != predicate);
        if preds.is_empty() {
            keys.remove(&item);
        }
    }
}
