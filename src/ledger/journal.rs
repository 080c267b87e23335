//! Durable ledger backed by an append-only JSON-lines journal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Ledger, LedgerError, LedgerRecord, RecordQuery};

/// One line of the journal.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry {
    Insert { record: LedgerRecord },
    Delete { ids: Vec<Uuid> },
}

/// Append handle plus the number of records tombstoned since the last compaction.
struct JournalWriter {
    file: File,
    /// Bytes of whole lines on disk
    len: u64,
    tombstones: usize,
    /// The file may end in a partial line; compact before the next append
    dirty: bool,
}

/// A ledger persisted to a journal file.
///
/// Every insert appends one line and every batch delete appends a single
/// tombstone line, so a batch is either fully on disk or not at all. The
/// live records are indexed in memory; the index is rebuilt by replaying
/// the journal on open.
pub struct JournalLedger {
    path: PathBuf,
    compact_after: usize,
    writer: Mutex<JournalWriter>,
    records: RwLock<HashMap<Uuid, LedgerRecord>>,
}

impl std::fmt::Debug for JournalLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalLedger")
            .field("path", &self.path)
            .field("compact_after", &self.compact_after)
            .field("records", &self.records.read().len())
            .finish()
    }
}

impl JournalLedger {
    /// Open (or create) the journal at `path`.
    ///
    /// The journal is rewritten once `compact_after` records have been
    /// tombstoned, or immediately if replay found malformed lines.
    pub async fn open(path: impl AsRef<Path>, compact_after: usize) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let (records, tombstones, malformed) = replay(&path).await?;
        info!(
            path = %path.display(),
            records = records.len(),
            tombstones = tombstones,
            "Opened ledger journal"
        );

        let file = open_append(&path).await?;
        let len = file.metadata().await?.len();
        let ledger = Self {
            path,
            compact_after: compact_after.max(1),
            writer: Mutex::new(JournalWriter {
                file,
                len,
                tombstones,
                dirty: malformed > 0,
            }),
            records: RwLock::new(records),
        };

        if malformed > 0 {
            warn!(malformed = malformed, "Discarded malformed journal lines, compacting");
            let mut writer = ledger.writer.lock().await;
            if let Err(e) = ledger.compact(&mut writer).await {
                warn!(error = %e, "Journal compaction failed, retrying before next append");
            }
        }

        Ok(ledger)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the ledger holds no live records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry. A failed write is cut back off the file so the next
    /// entry starts on a fresh line.
    async fn append(
        &self,
        writer: &mut JournalWriter,
        entry: &JournalEntry,
    ) -> Result<(), LedgerError> {
        if writer.dirty {
            self.compact(writer).await?;
        }

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        if let Err(e) = write_line(&mut writer.file, &line).await {
            match writer.file.set_len(writer.len).await {
                Ok(()) => debug!(len = writer.len, "Rolled back partial journal write"),
                Err(truncate_err) => {
                    warn!(error = %truncate_err, "Could not roll back partial journal write");
                    writer.dirty = true;
                }
            }
            return Err(e.into());
        }

        writer.len += line.len() as u64;
        Ok(())
    }

    /// Rewrite the journal so it holds only live records.
    async fn compact(&self, writer: &mut JournalWriter) -> Result<(), LedgerError> {
        let snapshot: Vec<LedgerRecord> = self.records.read().values().cloned().collect();

        let mut contents = Vec::new();
        for record in snapshot.iter().cloned() {
            serde_json::to_writer(&mut contents, &JournalEntry::Insert { record })?;
            contents.push(b'\n');
        }

        let staging = self.path.with_extension("compacting");
        {
            let mut file = File::create(&staging).await?;
            file.write_all(&contents).await?;
            file.sync_all().await?;
        }
        // Take the handle before the rename so it always names the live file.
        let file = open_append(&staging).await?;
        fs::rename(&staging, &self.path).await?;

        debug!(
            path = %self.path.display(),
            dropped = writer.tombstones,
            live = snapshot.len(),
            "Compacted ledger journal"
        );
        writer.file = file;
        writer.len = contents.len() as u64;
        writer.tombstones = 0;
        writer.dirty = false;
        Ok(())
    }
}

async fn open_append(path: &Path) -> Result<File, LedgerError> {
    Ok(OpenOptions::new().create(true).append(true).open(path).await?)
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await
}

/// Rebuild the live record set from the journal.
///
/// Returns the records, the number of tombstoned records, and the number of
/// lines that could not be decoded.
async fn replay(path: &Path) -> Result<(HashMap<Uuid, LedgerRecord>, usize, usize), LedgerError> {
    let mut records = HashMap::new();
    let mut tombstones = 0;
    let mut malformed = 0;

    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((records, 0, 0)),
        Err(e) => return Err(e.into()),
    };

    let mut lines = BufReader::new(file).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JournalEntry>(&line) {
            Ok(JournalEntry::Insert { record }) => {
                records.insert(record.id, record);
            }
            Ok(JournalEntry::Delete { ids }) => {
                tombstones += ids.iter().filter(|id| records.remove(*id).is_some()).count();
            }
            Err(e) => {
                warn!(error = %e, "Skipping malformed journal line");
                malformed += 1;
            }
        }
    }

    Ok((records, tombstones, malformed))
}

#[async_trait]
impl Ledger for JournalLedger {
    async fn insert(&self, record: LedgerRecord) -> Result<(), LedgerError> {
        let mut writer = self.writer.lock().await;
        self.append(&mut writer, &JournalEntry::Insert { record: record.clone() })
            .await?;
        self.records.write().insert(record.id, record);
        Ok(())
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<LedgerRecord>, LedgerError> {
        let records = self.records.read();
        Ok(query.select(records.values()))
    }

    async fn delete_batch(&self, ids: &[Uuid]) -> Result<usize, LedgerError> {
        let mut writer = self.writer.lock().await;

        let live: Vec<Uuid> = {
            let records = self.records.read();
            ids.iter().copied().filter(|id| records.contains_key(id)).collect()
        };
        if live.is_empty() {
            return Ok(0);
        }

        self.append(&mut writer, &JournalEntry::Delete { ids: live.clone() })
            .await?;
        {
            let mut records = self.records.write();
            for id in &live {
                records.remove(id);
            }
        }

        // The batch is already durable; a failed compaction is retried on
        // the next delete.
        writer.tombstones += live.len();
        if writer.tombstones >= self.compact_after {
            if let Err(e) = self.compact(&mut writer).await {
                warn!(error = %e, tombstones = writer.tombstones, "Journal compaction failed");
            }
        }

        Ok(live.len())
    }
}
