//! Durable on-disk message storage.
//!
//! Layout:
//! ```text
//! {root}/
//! ├── index.jsonl          append-only journal of put/delete/clear entries
//! └── messages/
//!     ├── 3f2c...e1.eml    raw message content, one file per message
//!     └── ...
//! ```
//!
//! A message is committed once its `put` journal entry has been synced.
//! The record file is written (temp file + rename) before the journal entry,
//! so a crash in between leaves an orphan record that is removed on the
//! next load, never a journal entry without content.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::backend::MessageBackend;
use super::message::{Message, MessageId};
use crate::{MailhogError, Result};

const JOURNAL_FILE: &str = "index.jsonl";
const MESSAGES_DIR: &str = "messages";
const RECORD_EXT: &str = "eml";
const TEMP_EXT: &str = "tmp";

/// Envelope metadata stored in the journal for each message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IndexEntry {
    id: MessageId,
    from: String,
    to: Vec<String>,
    received_at: DateTime<Utc>,
    size: usize,
}

impl IndexEntry {
    fn of(message: &Message) -> Self {
        Self {
            id: message.id,
            from: message.from.clone(),
            to: message.to.clone(),
            received_at: message.received_at,
            size: message.size,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry {
    Put(IndexEntry),
    Delete { id: MessageId },
    Clear,
}

/// Maildir-style backend: one record file per message plus a journal.
#[derive(Debug)]
pub struct MaildirBackend {
    root: PathBuf,
    journal: File,
    /// Length of the journal up to the last complete entry.
    journal_len: u64,
}

impl MaildirBackend {
    /// Open (creating if needed) the storage directory.
    ///
    /// Failure here means the store cannot be used at all.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(MESSAGES_DIR)).map_err(|e| {
            MailhogError::Storage(format!("cannot create {}: {e}", root.display()))
        })?;
        let journal = open_journal(&root.join(JOURNAL_FILE))?;
        let journal_len = journal.metadata()?.len();
        Ok(Self {
            root,
            journal,
            journal_len,
        })
    }

    /// Root directory of this storage.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn journal_path(&self) -> PathBuf {
        self.root.join(JOURNAL_FILE)
    }

    fn record_path(&self, id: &MessageId) -> PathBuf {
        self.root
            .join(MESSAGES_DIR)
            .join(format!("{id}.{RECORD_EXT}"))
    }

    /// Append one entry and sync it.
    ///
    /// Bytes left behind by a failed append are cut off first, so a partial
    /// line never merges with the next entry.
    fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        if self.journal.metadata()?.len() != self.journal_len {
            warn!("Truncating incomplete journal entry");
            self.journal.set_len(self.journal_len)?;
        }

        let written = self
            .journal
            .write_all(&line)
            .and_then(|()| self.journal.sync_data());
        if let Err(e) = written {
            if let Err(trunc) = self.journal.set_len(self.journal_len) {
                warn!("Failed to truncate journal after write error: {}", trunc);
            }
            return Err(e.into());
        }

        self.journal_len += line.len() as u64;
        Ok(())
    }

    /// Replay the journal into the live entries, in insertion order.
    fn replay(&self) -> Result<Vec<IndexEntry>> {
        let content = match fs::read(self.journal_path()) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut order: Vec<Option<IndexEntry>> = Vec::new();
        let mut positions: HashMap<MessageId, usize> = HashMap::new();

        let lines: Vec<&[u8]> = content
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .collect();
        let last = lines.len().saturating_sub(1);

        for (n, line) in lines.iter().enumerate() {
            let entry: JournalEntry = match serde_json::from_slice(line) {
                Ok(entry) => entry,
                Err(e) if n == last => {
                    warn!("Ignoring torn journal tail: {}", e);
                    break;
                }
                Err(e) => {
                    warn!("Skipping corrupt journal line {}: {}", n + 1, e);
                    continue;
                }
            };

            match entry {
                JournalEntry::Put(entry) => {
                    if positions.contains_key(&entry.id) {
                        warn!("Duplicate journal entry for {}", entry.id);
                        continue;
                    }
                    positions.insert(entry.id, order.len());
                    order.push(Some(entry));
                }
                JournalEntry::Delete { id } => {
                    if let Some(pos) = positions.remove(&id) {
                        order[pos] = None;
                    }
                }
                JournalEntry::Clear => {
                    order.clear();
                    positions.clear();
                }
            }
        }

        Ok(order.into_iter().flatten().collect())
    }

    /// Remove record and temp files not referenced by `live`.
    ///
    /// Files that cannot be removed are logged and left for the next load.
    fn remove_orphans(&self, live: &HashSet<MessageId>) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(self.root.join(MESSAGES_DIR))? {
            let path = entry?.path();
            let keep = match path.extension().and_then(|e| e.to_str()) {
                Some(RECORD_EXT) => path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<MessageId>().ok())
                    .is_some_and(|id| live.contains(&id)),
                Some(TEMP_EXT) => false,
                _ => true,
            };
            if !keep {
                debug!("Removing orphan record {}", path.display());
                match remove_if_exists(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }
        Ok(removed)
    }

    /// Rewrite the journal with one `put` entry per live message.
    fn compact(&mut self, messages: &[Message]) -> Result<()> {
        let path = self.journal_path();
        let tmp = path.with_extension(TEMP_EXT);
        {
            let mut file = File::create(&tmp)?;
            for message in messages {
                let mut line = serde_json::to_vec(&JournalEntry::Put(IndexEntry::of(message)))?;
                line.push(b'\n');
                file.write_all(&line)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        sync_dir(&self.root)?;
        self.journal = open_journal(&path)?;
        self.journal_len = self.journal.metadata()?.len();
        Ok(())
    }
}

impl MessageBackend for MaildirBackend {
    fn name(&self) -> &'static str {
        "maildir"
    }

    fn load(&mut self) -> Result<Vec<Message>> {
        let entries = self.replay()?;
        let mut messages = Vec::with_capacity(entries.len());

        for entry in entries {
            let path = self.record_path(&entry.id);
            match fs::read(&path) {
                Ok(raw) => {
                    if raw.len() != entry.size {
                        warn!(
                            id = %entry.id,
                            "Record size {} differs from journal size {}",
                            raw.len(),
                            entry.size
                        );
                    }
                    messages.push(Message::from_parts(
                        entry.id,
                        entry.from,
                        entry.to,
                        raw,
                        entry.received_at,
                    ));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(id = %entry.id, "Record missing, dropping from index");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let live: HashSet<MessageId> = messages.iter().map(|m| m.id).collect();
        let orphans = self.remove_orphans(&live)?;
        self.compact(&messages)?;

        info!(
            "Loaded {} message(s) from {} ({} orphan file(s) removed)",
            messages.len(),
            self.root.display(),
            orphans
        );
        Ok(messages)
    }

    fn persist(&mut self, message: &Message) -> Result<()> {
        let path = self.record_path(&message.id);
        let tmp = path.with_extension(TEMP_EXT);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&message.raw)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        sync_dir(&self.root.join(MESSAGES_DIR))?;

        if let Err(e) = self.append(&JournalEntry::Put(IndexEntry::of(message))) {
            // Not committed: leave no record behind.
            let _ = fs::remove_file(&path);
            return Err(e);
        }
        Ok(())
    }

    fn remove(&mut self, id: &MessageId) -> Result<()> {
        // Committed once the entry is synced; a leftover record is an orphan.
        self.append(&JournalEntry::Delete { id: *id })?;
        let path = self.record_path(id);
        if let Err(e) = remove_if_exists(&path) {
            warn!(id = %id, "Failed to remove {}: {}", path.display(), e);
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.append(&JournalEntry::Clear)?;
        if let Err(e) = self.remove_orphans(&HashSet::new()) {
            warn!("Failed to remove cleared records: {}", e);
        }
        Ok(())
    }
}

fn open_journal(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| MailhogError::Storage(format!("cannot open {}: {e}", path.display())))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
