use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::common::{Lsn, QuireError, Result, LOG_BUFFER_SIZE};

use super::{LogManager, LogQuery, PutFlags};

/// Identifies a log file; also keeps offset zero free for the null LSN.
const LOG_MAGIC: &[u8; 8] = b"QUIRELOG";
const FILE_HEADER_SIZE: u64 = 8;

/// Frame header: payload length, flags, crc32 of flags and payload.
const FRAME_HEADER_SIZE: u64 = 12;
/// Frame trailer: payload length again, for backward scans.
const FRAME_TRAILER_SIZE: u64 = 4;
const FRAME_OVERHEAD: u64 = FRAME_HEADER_SIZE + FRAME_TRAILER_SIZE;

const FLAG_CHECKPOINT: u32 = 1;

struct Frame {
    flags: u32,
    payload: Vec<u8>,
}

impl Frame {
    fn span(&self) -> u64 {
        FRAME_OVERHEAD + self.payload.len() as u64
    }
}

struct LogState {
    file: File,
    /// Appended bytes not yet written to the file
    buffer: Vec<u8>,
    /// File offset of `buffer[0]`; always a frame boundary
    buffer_start: u64,
    /// Everything below this offset is on stable storage
    durable_end: u64,
    last_ckp: Lsn,
    bytes_since_ckp: u64,
}

impl LogState {
    fn end(&self) -> u64 {
        self.buffer_start + self.buffer.len() as u64
    }

    fn write_out(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(self.buffer_start))?;
        self.file.write_all(&self.buffer)?;
        self.buffer_start += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    fn force(&mut self) -> Result<()> {
        self.write_out()?;
        self.file.sync_data()?;
        self.durable_end = self.buffer_start;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, out: &mut [u8]) -> Result<()> {
        if offset >= self.buffer_start {
            let start = (offset - self.buffer_start) as usize;
            let end = start + out.len();
            if end > self.buffer.len() {
                return Err(QuireError::LogRecordNotFound(Lsn::new(offset)));
            }
            out.copy_from_slice(&self.buffer[start..end]);
        } else {
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.read_exact(out)?;
        }
        Ok(())
    }

    fn read_u32(&mut self, offset: u64) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.read_at(offset, &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    fn read_frame(&mut self, lsn: Lsn) -> Result<Frame> {
        let offset = lsn.as_u64();
        if offset < FILE_HEADER_SIZE || offset + FRAME_OVERHEAD > self.end() {
            return Err(QuireError::LogRecordNotFound(lsn));
        }

        let mut header = [0u8; FRAME_HEADER_SIZE as usize];
        self.read_at(offset, &mut header)?;
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let flags = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);

        if offset + FRAME_OVERHEAD + len > self.end() {
            return Err(QuireError::LogRecordNotFound(lsn));
        }
        let mut payload = vec![0u8; len as usize];
        self.read_at(offset + FRAME_HEADER_SIZE, &mut payload)?;

        if frame_crc(flags, &payload) != crc {
            return Err(QuireError::LogCorrupted {
                lsn,
                reason: "checksum mismatch".to_string(),
            });
        }
        Ok(Frame { flags, payload })
    }

    fn prev_lsn(&mut self, lsn: Lsn) -> Result<Lsn> {
        let offset = lsn.as_u64();
        if offset <= FILE_HEADER_SIZE {
            return Err(QuireError::NotFound);
        }
        let prev_len = self.read_u32(offset - FRAME_TRAILER_SIZE)? as u64;
        let prev = offset
            .checked_sub(FRAME_OVERHEAD + prev_len)
            .filter(|&prev| prev >= FILE_HEADER_SIZE)
            .ok_or_else(|| QuireError::LogCorrupted {
                lsn,
                reason: format!("bad trailer length {prev_len}"),
            })?;
        Ok(Lsn::new(prev))
    }
}

fn frame_crc(flags: u32, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&flags.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// File-backed write-ahead log.
///
/// A record's LSN is the byte offset of its frame. Appends are buffered in
/// memory and reach the file when the buffer fills, on a flushing append, or
/// on [`LogManager::flush`].
pub struct LogFile {
    path: PathBuf,
    state: Mutex<LogState>,
}

impl LogFile {
    /// Opens or creates the log at `path`. A torn final frame left by a crash
    /// is cut off.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let len = file.metadata()?.len();
        if len < FILE_HEADER_SIZE {
            file.set_len(0)?;
            file.write_all(LOG_MAGIC)?;
            file.sync_data()?;
        } else {
            let mut magic = [0u8; FILE_HEADER_SIZE as usize];
            file.read_exact(&mut magic)?;
            if &magic != LOG_MAGIC {
                return Err(QuireError::LogCorrupted {
                    lsn: Lsn::ZERO,
                    reason: format!("{} is not a log file", path.as_ref().display()),
                });
            }
        }
        let file_len = len.max(FILE_HEADER_SIZE);

        let mut state = LogState {
            file,
            buffer: Vec::with_capacity(LOG_BUFFER_SIZE),
            buffer_start: file_len,
            durable_end: file_len,
            last_ckp: Lsn::ZERO,
            bytes_since_ckp: 0,
        };

        let valid_end = Self::scan(&mut state, file_len)?;
        if valid_end < file_len {
            tracing::warn!(
                path = %path.as_ref().display(),
                valid_end,
                file_len,
                "truncating torn log tail"
            );
            state.file.set_len(valid_end)?;
            state.file.sync_data()?;
            state.buffer_start = valid_end;
            state.durable_end = valid_end;
        }

        tracing::debug!(
            path = %path.as_ref().display(),
            end = valid_end,
            last_ckp = %state.last_ckp,
            "opened log"
        );

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            state: Mutex::new(state),
        })
    }

    /// Walks the frames on disk, recording the last checkpoint, and returns
    /// the end of the last intact frame.
    fn scan(state: &mut LogState, file_len: u64) -> Result<u64> {
        let mut offset = FILE_HEADER_SIZE;
        while offset + FRAME_OVERHEAD <= file_len {
            let frame = match state.read_frame(Lsn::new(offset)) {
                Ok(frame) => frame,
                Err(QuireError::LogRecordNotFound(_)) | Err(QuireError::LogCorrupted { .. }) => {
                    break
                }
                Err(e) => return Err(e),
            };
            let span = frame.span();
            if state.read_u32(offset + span - FRAME_TRAILER_SIZE)? as usize != frame.payload.len() {
                break;
            }
            if frame.flags & FLAG_CHECKPOINT != 0 {
                state.last_ckp = Lsn::new(offset);
                state.bytes_since_ckp = 0;
            } else {
                state.bytes_since_ckp += span;
            }
            offset += span;
        }
        Ok(offset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset below which the log is known to be durable.
    pub fn durable_lsn(&self) -> Lsn {
        Lsn::new(self.state.lock().durable_end)
    }
}

impl LogManager for LogFile {
    fn append(&self, record: &[u8], flags: PutFlags) -> Result<Lsn> {
        let mut state = self.state.lock();
        let lsn = Lsn::new(state.end());

        let frame_flags = if flags.checkpoint { FLAG_CHECKPOINT } else { 0 };
        let len = record.len() as u32;
        state.buffer.extend_from_slice(&len.to_le_bytes());
        state.buffer.extend_from_slice(&frame_flags.to_le_bytes());
        state
            .buffer
            .extend_from_slice(&frame_crc(frame_flags, record).to_le_bytes());
        state.buffer.extend_from_slice(record);
        state.buffer.extend_from_slice(&len.to_le_bytes());

        if flags.checkpoint {
            state.last_ckp = lsn;
            state.bytes_since_ckp = 0;
        } else {
            state.bytes_since_ckp += FRAME_OVERHEAD + record.len() as u64;
        }

        if flags.flush {
            state.force()?;
        } else if state.buffer.len() >= LOG_BUFFER_SIZE {
            state.write_out()?;
        }
        Ok(lsn)
    }

    fn get(&self, query: LogQuery) -> Result<(Lsn, Vec<u8>)> {
        let mut state = self.state.lock();
        let empty = state.end() <= FILE_HEADER_SIZE;

        let lsn = match query {
            LogQuery::Set(lsn) => lsn,
            LogQuery::First if empty => return Err(QuireError::NotFound),
            LogQuery::First => Lsn::new(FILE_HEADER_SIZE),
            LogQuery::Last if empty => return Err(QuireError::NotFound),
            LogQuery::Last => {
                let end = Lsn::new(state.end());
                state.prev_lsn(end)?
            }
            LogQuery::Next(lsn) => {
                let span = state.read_frame(lsn)?.span();
                let next = lsn.as_u64() + span;
                if next >= state.end() {
                    return Err(QuireError::NotFound);
                }
                Lsn::new(next)
            }
            LogQuery::Prev(lsn) => {
                state.read_frame(lsn)?;
                state.prev_lsn(lsn)?
            }
            LogQuery::Checkpoint if state.last_ckp.is_zero() => return Err(QuireError::NotFound),
            LogQuery::Checkpoint => state.last_ckp,
        };

        let frame = state.read_frame(lsn)?;
        Ok((lsn, frame.payload))
    }

    fn current_lsn(&self) -> Lsn {
        Lsn::new(self.state.lock().end())
    }

    fn flush(&self, lsn: Lsn) -> Result<()> {
        let mut state = self.state.lock();
        if !lsn.is_zero() && lsn.as_u64() < state.durable_end {
            return Ok(());
        }
        state.force()
    }

    fn bytes_since_checkpoint(&self) -> u64 {
        self.state.lock().bytes_since_ckp
    }
}

impl Drop for LogFile {
    fn drop(&mut self) {
        if let Err(e) = self.state.get_mut().force() {
            tracing::warn!(path = %self.path.display(), error = %e, "log flush on close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_log() {
        let dir = TempDir::new().unwrap();
        let log = LogFile::open(dir.path().join("log")).unwrap();
        assert_eq!(log.current_lsn(), Lsn::new(FILE_HEADER_SIZE));
        assert!(matches!(log.get(LogQuery::First), Err(QuireError::NotFound)));
        assert!(matches!(log.get(LogQuery::Last), Err(QuireError::NotFound)));
        assert!(matches!(log.get(LogQuery::Checkpoint), Err(QuireError::NotFound)));
    }

    #[test]
    fn test_append_and_walk() {
        let dir = TempDir::new().unwrap();
        let log = LogFile::open(dir.path().join("log")).unwrap();

        let a = log.append(b"alpha", PutFlags::NONE).unwrap();
        let b = log.append(b"beta", PutFlags::NONE).unwrap();
        let c = log.append(b"gamma", PutFlags::FLUSH).unwrap();
        assert!(a < b && b < c);

        assert_eq!(log.get(LogQuery::Set(b)).unwrap(), (b, b"beta".to_vec()));
        assert_eq!(log.get(LogQuery::First).unwrap().0, a);
        assert_eq!(log.get(LogQuery::Last).unwrap(), (c, b"gamma".to_vec()));
        assert_eq!(log.get(LogQuery::Next(a)).unwrap().0, b);
        assert_eq!(log.get(LogQuery::Prev(c)).unwrap().0, b);
        assert!(matches!(log.get(LogQuery::Next(c)), Err(QuireError::NotFound)));
        assert!(matches!(log.get(LogQuery::Prev(a)), Err(QuireError::NotFound)));
        assert!(matches!(
            log.get(LogQuery::Set(Lsn::new(a.as_u64() + 1))),
            Err(QuireError::LogRecordNotFound(_)) | Err(QuireError::LogCorrupted { .. })
        ));
    }

    #[test]
    fn test_checkpoint_tracking() {
        let dir = TempDir::new().unwrap();
        let log = LogFile::open(dir.path().join("log")).unwrap();

        log.append(b"work", PutFlags::NONE).unwrap();
        assert!(log.bytes_since_checkpoint() > 0);
        let ckp = log.append(b"ckp", PutFlags::CHECKPOINT).unwrap();
        assert_eq!(log.bytes_since_checkpoint(), 0);
        assert_eq!(log.get(LogQuery::Checkpoint).unwrap().0, ckp);
        assert!(log.durable_lsn() > ckp);
    }

    #[test]
    fn test_reopen_recovers_records_and_checkpoint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log");
        let (first, ckp, end) = {
            let log = LogFile::open(&path).unwrap();
            let first = log.append(b"one", PutFlags::NONE).unwrap();
            let ckp = log.append(b"two", PutFlags::CHECKPOINT).unwrap();
            log.append(b"three", PutFlags::NONE).unwrap();
            (first, ckp, log.current_lsn())
        };

        let log = LogFile::open(&path).unwrap();
        assert_eq!(log.current_lsn(), end);
        assert_eq!(log.get(LogQuery::First).unwrap(), (first, b"one".to_vec()));
        assert_eq!(log.get(LogQuery::Checkpoint).unwrap(), (ckp, b"two".to_vec()));
        assert_eq!(log.get(LogQuery::Last).unwrap().1, b"three".to_vec());
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log");
        let end = {
            let log = LogFile::open(&path).unwrap();
            log.append(b"kept", PutFlags::FLUSH).unwrap();
            log.current_lsn()
        };
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[9, 0, 0, 0, 0, 0]).unwrap();
        }

        let log = LogFile::open(&path).unwrap();
        assert_eq!(log.current_lsn(), end);
        assert_eq!(log.get(LogQuery::Last).unwrap().1, b"kept".to_vec());
    }
}
