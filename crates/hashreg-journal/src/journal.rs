use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, error, warn};

use hashreg_core::RegistryEvent;

use crate::config::SyncMode;
use crate::error::{JournalError, Result};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Byte sink a journal appends frames to.
trait FrameSink: Write {
    /// Cut the sink back to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl FrameSink for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

struct JournalWriter<S> {
    sink: S,
    /// End of the last complete frame.
    offset: u64,
    /// Set when a failed frame could not be cut away again.
    broken: bool,
}

impl<S: FrameSink> JournalWriter<S> {
    fn new(sink: S, offset: u64) -> Self {
        Self {
            sink,
            offset,
            broken: false,
        }
    }

    /// Append one encoded frame. On any failure the sink is cut back to the
    /// previous frame boundary before the error is returned.
    fn append(&mut self, frame: &[u8], sync_mode: SyncMode) -> io::Result<u64> {
        if self.broken {
            return Err(io::Error::other(
                "journal holds a partial frame from a failed write; reopen it to recover",
            ));
        }

        let start = self.offset;
        if let Err(e) = self.write_through(frame, sync_mode) {
            warn!(offset = start, error = %e, "journal write failed; rolling back frame");
            if let Err(cut) = self.sink.truncate(start) {
                error!(offset = start, error = %cut, "journal rollback failed");
                self.broken = true;
            }
            return Err(e);
        }

        self.offset += frame.len() as u64;
        Ok(start)
    }

    fn write_through(&mut self, frame: &[u8], sync_mode: SyncMode) -> io::Result<()> {
        self.sink.write_all(frame)?;
        self.sink.flush()?;
        if sync_mode == SyncMode::EveryWrite {
            self.sink.sync()?;
        }
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.sink.truncate(len)?;
        self.offset = len;
        self.broken = false;
        Ok(())
    }
}

/// What [`Journal::recover`] found on disk.
#[derive(Debug)]
pub struct Recovery {
    /// Every intact event, in commit order.
    pub events: Vec<RegistryEvent>,
    /// End of the last whole frame.
    pub end: u64,
    pub file_len: u64,
}

impl Recovery {
    /// Whether unreadable bytes follow the last whole frame.
    pub fn has_torn_tail(&self) -> bool {
        self.end < self.file_len
    }
}

/// Append-only event journal.
///
/// Each committed call is written as one frame, so a call's events are
/// either all on disk or none are:
///
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized Vec<RegistryEvent>)]
/// ```
///
/// On recovery the file is read front to back. A short tail (torn write)
/// ends recovery and must be cut off with [`Journal::truncate_torn_tail`]
/// before anything else is appended; a frame with a bad CRC is skipped with
/// a warning.
///
/// The file is locked exclusively for as long as the journal is open, so
/// only one process appends to it at a time.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter<File>>,
    sync_mode: SyncMode,
}

impl Journal {
    /// Open (or create) the journal file at `path`.
    ///
    /// Fails with [`JournalError::Locked`] if another handle holds the file.
    pub fn open(path: &Path, sync_mode: SyncMode) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        fs2::FileExt::try_lock_exclusive(&file).map_err(|e| {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                JournalError::Locked(path.to_path_buf())
            } else {
                JournalError::Io(e)
            }
        })?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter::new(file, offset)),
            sync_mode,
        })
    }

    /// Append one call's events as a single frame. Returns the frame offset.
    pub fn append_all(&self, events: &[RegistryEvent]) -> Result<u64> {
        let frame = encode_frame(events)?;
        let mut w = self.writer.lock().map_err(|_| JournalError::LockPoisoned)?;
        let start = w.append(&frame, self.sync_mode)?;
        debug!(offset = start, events = events.len(), len = frame.len(), "journal append");
        Ok(start)
    }

    /// Read back every intact event, in commit order.
    pub fn recover(&self) -> Result<Recovery> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut events = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            let mut header = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
                warn!(offset, length, file_len, "torn journal frame; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            file.read_exact(&mut payload)?;

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping journal frame"
                );
            } else {
                match bincode::deserialize::<Vec<RegistryEvent>>(&payload) {
                    Ok(frame) => events.extend(frame),
                    Err(e) => warn!(offset, error = %e, "undecodable journal frame; skipping"),
                }
            }

            offset += (HEADER_SIZE + length as usize) as u64;
        }

        debug!(recovered = events.len(), end = offset, "journal recovery complete");
        Ok(Recovery {
            events,
            end: offset,
            file_len,
        })
    }

    /// Cut off whatever follows the last whole frame so new frames start on
    /// a frame boundary. Does nothing when the tail is clean.
    pub fn truncate_torn_tail(&self, recovery: &Recovery) -> Result<()> {
        if !recovery.has_torn_tail() {
            return Ok(());
        }
        warn!(
            path = %self.path.display(),
            end = recovery.end,
            discarded = recovery.file_len - recovery.end,
            "truncating torn journal tail"
        );
        self.writer
            .lock()
            .map_err(|_| JournalError::LockPoisoned)?
            .truncate(recovery.end)?;
        Ok(())
    }

    /// Current end of the journal in bytes.
    pub fn offset(&self) -> Result<u64> {
        Ok(self
            .writer
            .lock()
            .map_err(|_| JournalError::LockPoisoned)?
            .offset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Header plus payload for one call's events.
fn encode_frame(events: &[RegistryEvent]) -> Result<Vec<u8>> {
    let payload =
        bincode::serialize(events).map_err(|e| JournalError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| JournalError::Serialization("frame exceeds 4 GiB".into()))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}
