/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Durable file-backed message store.
//!
//! Each session identity owns one append-only log `<file_stem>.log` made of
//! text-framed records:
//!
//! ```text
//! H <creation_nanos>\n
//! M <seq> <len> <timestamp_nanos>\n<len bytes>\n
//! N <next_sender> <next_target>\n
//! ```
//!
//! Every write is followed by `fsync`. Opening the store replays the log; a
//! record cut short at the end of the file (a crash mid-write) is truncated
//! away, while a malformed record anywhere else is corruption. Reset writes a
//! fresh log beside the old one and renames it into place, so the file on
//! disk is always either fully old or fully reset.

use crate::traits::{MessageStore, StoredMessage, collect_range};
use async_trait::async_trait;
use bytes::Bytes;
use fixline_core::error::StoreError;
use fixline_core::types::{SeqNum, SessionId, Timestamp};
use memchr::memchr;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One parsed log record.
#[derive(Debug, PartialEq)]
enum Record {
    Header(Timestamp),
    Message(StoredMessage),
    Counters(SeqNum, SeqNum),
}

impl Record {
    fn encode(&self) -> Vec<u8> {
        match self {
            Self::Header(created) => format!("H {}\n", created.as_nanos()).into_bytes(),
            Self::Counters(sender, target) => format!("N {sender} {target}\n").into_bytes(),
            Self::Message(message) => {
                let mut out = format!(
                    "M {} {} {}\n",
                    message.seq_num,
                    message.bytes.len(),
                    message.timestamp.as_nanos()
                )
                .into_bytes();
                out.extend_from_slice(&message.bytes);
                out.push(b'\n');
                out
            }
        }
    }

    /// Parses the record at the start of `buf`.
    ///
    /// `Ok(None)` means the buffer ends inside the record.
    fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, String> {
        let Some(nl) = memchr(b'\n', buf) else {
            return Ok(None);
        };
        let line = std::str::from_utf8(&buf[..nl]).map_err(|e| e.to_string())?;
        let mut parts = line.split(' ');
        let kind = parts.next().unwrap_or_default();
        let mut number = |name: &str| -> Result<u64, String> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| format!("bad {name} in record {line:?}"))
        };
        let record = match kind {
            "H" => (Self::Header(Timestamp::from_nanos(number("creation time")?)), nl + 1),
            "N" => {
                let sender = SeqNum::new(number("sender seq")?);
                let target = SeqNum::new(number("target seq")?);
                (Self::Counters(sender, target), nl + 1)
            }
            "M" => {
                let seq_num = SeqNum::new(number("seq")?);
                let len = usize::try_from(number("length")?).map_err(|e| e.to_string())?;
                let timestamp = Timestamp::from_nanos(number("timestamp")?);
                let start = nl + 1;
                let end = start
                    .checked_add(len)
                    .ok_or_else(|| format!("message {seq_num} length {len} out of range"))?;
                match buf.get(end) {
                    None => return Ok(None),
                    Some(b'\n') => {}
                    Some(_) => return Err(format!("message {seq_num} not terminated")),
                }
                let message = StoredMessage {
                    seq_num,
                    bytes: Bytes::copy_from_slice(&buf[start..end]),
                    timestamp,
                };
                (Self::Message(message), end + 1)
            }
            other => return Err(format!("unknown record kind {other:?}")),
        };
        Ok(Some(record))
    }
}

#[derive(Debug)]
struct State {
    path: PathBuf,
    file: File,
    messages: BTreeMap<u64, StoredMessage>,
    next_sender_seq: SeqNum,
    next_target_seq: SeqNum,
    creation_time: Timestamp,
}

/// Log file operations needed to append a record.
trait LogFile: Write {
    fn size(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Appends `bytes` durably. On failure the log is cut back to its previous
/// length so a partial record never ends up ahead of a later one.
fn append_record<F: LogFile>(file: &mut F, bytes: &[u8]) -> io::Result<()> {
    let len = file.size()?;
    let written = file.write_all(bytes).and_then(|()| file.sync());
    if let Err(err) = written {
        if let Err(rollback) = file.truncate(len).and_then(|()| file.sync()) {
            warn!(error = %rollback, len, "failed to roll back partial store record");
        }
        return Err(err);
    }
    Ok(())
}

impl State {
    fn write(&mut self, record: &Record) -> Result<(), StoreError> {
        append_record(&mut self.file, &record.encode())?;
        Ok(())
    }

    fn persist_counters(&mut self, sender: SeqNum, target: SeqNum) -> Result<(), StoreError> {
        self.write(&Record::Counters(sender, target))?;
        self.next_sender_seq = sender;
        self.next_target_seq = target;
        Ok(())
    }
}

/// Replays a log file into a fresh state, creating the file if absent.
fn load(path: &Path) -> Result<State, StoreError> {
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    let mut state = State {
        path: path.to_path_buf(),
        file,
        messages: BTreeMap::new(),
        next_sender_seq: SeqNum::new(1),
        next_target_seq: SeqNum::new(1),
        creation_time: Timestamp::now(),
    };

    if data.is_empty() {
        let created = state.creation_time;
        state.write(&Record::Header(created))?;
        return Ok(state);
    }

    let mut offset = 0;
    while offset < data.len() {
        match Record::parse(&data[offset..]) {
            Ok(Some((record, used))) => {
                match record {
                    Record::Header(created) => state.creation_time = created,
                    Record::Counters(sender, target) => {
                        state.next_sender_seq = sender;
                        state.next_target_seq = target;
                    }
                    Record::Message(message) => {
                        if message.seq_num >= state.next_sender_seq {
                            state.next_sender_seq = message.seq_num.next();
                        }
                        state.messages.insert(message.seq_num.value(), message);
                    }
                }
                offset += used;
            }
            Ok(None) => {
                warn!(
                    path = %path.display(),
                    offset,
                    dropped = data.len() - offset,
                    "truncating incomplete record at end of store log"
                );
                state.file.set_len(offset as u64)?;
                state.file.sync_all()?;
                break;
            }
            Err(reason) => {
                return Err(StoreError::Corrupted {
                    reason: format!("{} at offset {offset}: {reason}", path.display()),
                });
            }
        }
    }

    debug!(
        path = %path.display(),
        messages = state.messages.len(),
        next_sender = %state.next_sender_seq,
        next_target = %state.next_target_seq,
        "replayed store log"
    );
    Ok(state)
}

/// Writes a fresh log next to `path` and renames it over the old one.
fn rewrite_empty(path: &Path) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("log.tmp");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&Record::Header(Timestamp::now()).encode())?;
        tmp.write_all(&Record::Counters(SeqNum::new(1), SeqNum::new(1)).encode())?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    #[cfg(unix)]
    {
        if let Some(dir) = path.parent().and_then(|d| File::open(d).ok()) {
            if let Err(err) = dir.sync_all() {
                warn!(path = %path.display(), error = %err, "failed to sync store directory");
            }
        }
    }

    Ok(())
}

/// Runs blocking file work off the async runtime.
async fn blocking<T, F>(state: &Arc<Mutex<State>>, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&mut State) -> Result<T, StoreError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&mut state.lock()))
        .await
        .map_err(|e| StoreError::Io(e.to_string()))?
}

/// File-backed message store for one session identity.
#[derive(Debug, Clone)]
pub struct FileStore {
    state: Arc<Mutex<State>>,
}

impl FileStore {
    /// Opens (or creates) the log for `session` under `dir` and replays it.
    ///
    /// Performs blocking I/O.
    ///
    /// # Errors
    /// Returns `StoreError::Corrupted` for a malformed log or `Io` on
    /// filesystem failures.
    pub fn open(dir: impl AsRef<Path>, session: &SessionId) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.log", session.file_stem()));
        let state = load(&path)?;
        info!(
            session = %session,
            path = %path.display(),
            messages = state.messages.len(),
            "opened file store"
        );
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Returns the log file path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.state.lock().path.clone()
    }

    /// Returns the number of stored messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }
}

#[async_trait]
impl MessageStore for FileStore {
    async fn append(&self, seq_num: SeqNum, message: Bytes) -> Result<(), StoreError> {
        blocking(&self.state, move |state| {
            let message = StoredMessage {
                seq_num,
                bytes: message,
                timestamp: Timestamp::now(),
            };
            state
                .write(&Record::Message(message.clone()))
                .map_err(|e| StoreError::StoreFailed {
                    seq_num: seq_num.value(),
                    reason: e.to_string(),
                })?;
            state.messages.insert(seq_num.value(), message);
            if seq_num >= state.next_sender_seq {
                state.next_sender_seq = seq_num.next();
            }
            Ok(())
        })
        .await
    }

    async fn range(&self, begin: SeqNum, end: SeqNum) -> Result<Vec<StoredMessage>, StoreError> {
        let state = self.state.lock();
        collect_range(&state.messages, begin, end, state.next_sender_seq)
    }

    fn next_sender_seq(&self) -> SeqNum {
        self.state.lock().next_sender_seq
    }

    fn next_target_seq(&self) -> SeqNum {
        self.state.lock().next_target_seq
    }

    fn counters(&self) -> (SeqNum, SeqNum) {
        let state = self.state.lock();
        (state.next_sender_seq, state.next_target_seq)
    }

    async fn set_next_sender_seq(&self, seq: SeqNum) -> Result<(), StoreError> {
        blocking(&self.state, move |state| {
            let target = state.next_target_seq;
            state.persist_counters(seq, target)
        })
        .await
    }

    async fn set_next_target_seq(&self, seq: SeqNum) -> Result<(), StoreError> {
        blocking(&self.state, move |state| {
            let sender = state.next_sender_seq;
            state.persist_counters(sender, seq)
        })
        .await
    }

    async fn reset(&self) -> Result<(), StoreError> {
        blocking(&self.state, |state| {
            rewrite_empty(&state.path)?;
            *state = load(&state.path)?;
            info!(path = %state.path.display(), "store reset");
            Ok(())
        })
        .await
    }

    fn creation_time(&self) -> Timestamp {
        self.state.lock().creation_time
    }

    async fn refresh(&self) -> Result<(), StoreError> {
        blocking(&self.state, |state| {
            *state = load(&state.path)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionId {
        SessionId::new("FIX.4.4", "CLIENT", "SERVER")
    }

    async fn append_n(store: &FileStore, range: std::ops::RangeInclusive<u64>) {
        for seq in range {
            store
                .append(SeqNum::new(seq), Bytes::from(format!("8=FIX.4.4\x0134={seq}\x01")))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path(), &session()).unwrap();
            append_n(&store, 1..=5).await;
            store.set_next_target_seq(SeqNum::new(9)).await.unwrap();
        }
        let store = FileStore::open(dir.path(), &session()).unwrap();
        assert_eq!(store.counters(), (SeqNum::new(6), SeqNum::new(9)));
        let found = store.range(SeqNum::new(2), SeqNum::new(3)).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(&found[1].bytes[..], b"8=FIX.4.4\x0134=3\x01");
    }

    #[tokio::test]
    async fn test_creation_time_persists() {
        let dir = tempfile::tempdir().unwrap();
        let created = FileStore::open(dir.path(), &session()).unwrap().creation_time();
        let reopened = FileStore::open(dir.path(), &session()).unwrap();
        assert_eq!(reopened.creation_time(), created);
    }

    #[tokio::test]
    async fn test_torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let store = FileStore::open(dir.path(), &session()).unwrap();
            append_n(&store, 1..=3).await;
            store.path()
        };
        let intact = fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"M 4 40 123\n8=FIX.4.4").unwrap();
        drop(file);

        let store = FileStore::open(dir.path(), &session()).unwrap();
        assert_eq!(store.next_sender_seq(), SeqNum::new(4));
        assert_eq!(store.message_count(), 3);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact);

        append_n(&store, 4..=4).await;
        let reopened = FileStore::open(dir.path(), &session()).unwrap();
        assert_eq!(reopened.message_count(), 4);
    }

    #[tokio::test]
    async fn test_mid_log_garbage_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let store = FileStore::open(dir.path(), &session()).unwrap();
            append_n(&store, 1..=1).await;
            store.path()
        };
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"X garbage\nN 2 1\n").unwrap();
        drop(file);

        assert!(matches!(
            FileStore::open(dir.path(), &session()),
            Err(StoreError::Corrupted { .. })
        ));
    }

    #[tokio::test]
    async fn test_reset_is_atomic_and_durable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), &session()).unwrap();
        append_n(&store, 1..=4).await;
        store.set_next_target_seq(SeqNum::new(7)).await.unwrap();

        store.reset().await.unwrap();
        assert_eq!(store.counters(), (SeqNum::new(1), SeqNum::new(1)));
        assert_eq!(store.message_count(), 0);
        assert!(!store.path().with_extension("log.tmp").exists());

        let reopened = FileStore::open(dir.path(), &session()).unwrap();
        assert_eq!(reopened.counters(), (SeqNum::new(1), SeqNum::new(1)));
        assert_eq!(reopened.message_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_sees_other_writer() {
        let dir = tempfile::tempdir().unwrap();
        let reader = FileStore::open(dir.path(), &session()).unwrap();
        let writer = FileStore::open(dir.path(), &session()).unwrap();
        append_n(&writer, 1..=2).await;

        assert_eq!(reader.message_count(), 0);
        reader.refresh().await.unwrap();
        assert_eq!(reader.message_count(), 2);
    }

    #[test]
    fn test_record_parse() {
        let record = Record::Counters(SeqNum::new(3), SeqNum::new(4));
        let bytes = record.encode();
        assert_eq!(Record::parse(&bytes), Ok(Some((record, bytes.len()))));
        assert_eq!(Record::parse(b"M 1 10 0\nabc"), Ok(None));
        assert!(Record::parse(b"M 1 2 0\nabc\n").is_err());
        assert!(Record::parse(b"N x 1\n").is_err());
        assert!(Record::parse(b"M 1 18446744073709551615 0\nabc\n").is_err());
    }

    /// In-memory log that accepts `budget` more bytes before failing.
    struct FullDisk {
        data: Vec<u8>,
        budget: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("no space left on device"));
            }
            let n = buf.len().min(self.budget);
            self.data.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogFile for FullDisk {
        fn size(&self) -> io::Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_append_leaves_no_partial_record() {
        let first = Record::Counters(SeqNum::new(1), SeqNum::new(1)).encode();
        let message = Record::Message(StoredMessage {
            seq_num: SeqNum::new(2),
            bytes: Bytes::from_static(b"8=FIX.4.4\x0134=2\x01"),
            timestamp: Timestamp::from_nanos(1),
        })
        .encode();
        let mut log = FullDisk {
            data: Vec::new(),
            budget: first.len() + 8,
        };

        append_record(&mut log, &first).unwrap();
        assert!(append_record(&mut log, &message).is_err());
        assert_eq!(log.data, first);

        log.budget = usize::MAX;
        append_record(&mut log, &message).unwrap();
        let mut offset = 0;
        while offset < log.data.len() {
            let (_, used) = Record::parse(&log.data[offset..]).unwrap().unwrap();
            offset += used;
        }
        assert_eq!(offset, log.data.len());
    }
}
