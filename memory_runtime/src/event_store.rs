//! Durable backends for the event log — binary protobuf frames.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Rules:
//!   - Strict append only — no mutation, no deletion, no reordering
//!   - fsync after every write
//!   - Loading fails closed: torn headers, truncated frames, bad lengths,
//!     undecodable events and sequence gaps are all corruption
//!   - A failed write is rolled back to the last committed frame

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use memory_kernel::events::Event;
use prost::Message;
use tracing::{debug, error, warn};

use crate::error::LogError;
use crate::proto_bridge::{event_to_proto, proto_to_event};
use crate::proto_types::ProtoEvent;

/// Largest frame accepted on read or write.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Where committed events are made durable.
///
/// `persist` must not return `Ok` unless the event is durably recorded.
pub trait LogBackend: Send {
    /// Every previously persisted event, in order.
    fn load(&mut self) -> Result<Vec<Event>, LogError>;

    fn persist(&mut self, event: &Event) -> Result<(), LogError>;
}

/// Append-only event file.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Use the log at `path`, creating its parent directory.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all events from a file, validating frame integrity.
    fn read_all_from_file(path: &Path) -> Result<Vec<Event>, LogError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut events: Vec<Event> = Vec::new();
        let mut len_buf = [0u8; 4];

        loop {
            match read_header(&mut reader, &mut len_buf)? {
                0 => break,
                4 => {}
                n => {
                    return Err(LogError::Corrupted(format!(
                        "torn frame header ({} of 4 bytes) after seq {}",
                        n,
                        events.len()
                    )))
                }
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len == 0 || len > MAX_FRAME_LEN {
                return Err(LogError::Corrupted(format!(
                    "invalid frame length {} after seq {}",
                    len,
                    events.len()
                )));
            }

            let mut frame = vec![0u8; len];
            reader.read_exact(&mut frame).map_err(|e| {
                LogError::Corrupted(format!(
                    "truncated frame after seq {}: {}",
                    events.len(),
                    e
                ))
            })?;

            let proto = ProtoEvent::decode(frame.as_slice())
                .map_err(|e| LogError::Corrupted(format!("protobuf decode error: {}", e)))?;
            let event = proto_to_event(&proto)?;

            let expected = events.len() as u64 + 1;
            if event.seq.get() != expected {
                return Err(LogError::Corrupted(format!(
                    "sequence gap: expected {}, got {}",
                    expected, event.seq
                )));
            }
            events.push(event);
        }

        Ok(events)
    }
}

/// Fill `buf` from `reader`; returns how many bytes were read before EOF.
fn read_header(reader: &mut impl Read, buf: &mut [u8; 4]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl LogBackend for FileBackend {
    fn load(&mut self) -> Result<Vec<Event>, LogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let events = Self::read_all_from_file(&self.path)?;
        debug!(path = %self.path.display(), events = events.len(), "loaded event file");
        Ok(events)
    }

    /// Write one length-prefixed frame and fsync. On failure the file is
    /// cut back to its previous length so no partial frame survives.
    fn persist(&mut self, event: &Event) -> Result<(), LogError> {
        let buf = event_to_proto(event).encode_to_vec();
        if buf.is_empty() || buf.len() > MAX_FRAME_LEN {
            return Err(LogError::Storage(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("event seq={} encodes to {} bytes", event.seq, buf.len()),
            )));
        }
        let len = buf.len() as u32;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                error!(seq = %event.seq, error = %e, "failed to open event file");
                LogError::Storage(e)
            })?;
        let committed_len = file.metadata()?.len();

        let write = |file: &mut File| -> io::Result<()> {
            {
                let mut writer = BufWriter::new(&mut *file);
                writer.write_all(&len.to_le_bytes())?;
                writer.write_all(&buf)?;
                writer.flush()?;
            }
            file.sync_all()
        };

        write(&mut file).map_err(|e| {
            error!(seq = %event.seq, error = %e, "failed to persist event");
            if let Err(rollback) = file.set_len(committed_len).and_then(|()| file.sync_all()) {
                warn!(seq = %event.seq, error = %rollback, "could not roll back partial frame");
            }
            LogError::Storage(e)
        })
    }
}

/// Keeps nothing outside the log handle. For tests and scratch sessions.
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl LogBackend for MemoryBackend {
    fn load(&mut self) -> Result<Vec<Event>, LogError> {
        Ok(Vec::new())
    }

    fn persist(&mut self, _event: &Event) -> Result<(), LogError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_kernel::domain::Priority;
    use memory_kernel::events::{EventDraft, Seq};

    #[test]
    fn test_read_header_counts_partial_bytes() {
        let mut buf = [0u8; 4];
        assert_eq!(read_header(&mut &[0u8; 0][..], &mut buf).expect("read"), 0);
        assert_eq!(read_header(&mut &[7u8, 0][..], &mut buf).expect("read"), 2);
        assert_eq!(read_header(&mut &[9u8, 0, 0, 0, 1][..], &mut buf).expect("read"), 4);
        assert_eq!(u32::from_le_bytes(buf), 9);
    }

    #[test]
    fn test_failed_frame_leaves_file_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.log");
        let mut backend = FileBackend::open(&path).expect("open");
        let event = EventDraft::constraint_added(
            "never use eval",
            Priority::Required,
            None,
        )
        .into_event(Seq(1), 1);
        backend.persist(&event).expect("persist");
        let committed = std::fs::metadata(&path).expect("metadata").len();

        let oversized = EventDraft::constraint_added(
            &"x".repeat(MAX_FRAME_LEN + 1),
            Priority::Required,
            None,
        )
        .into_event(Seq(2), 2);
        assert!(matches!(backend.persist(&oversized), Err(LogError::Storage(_))));

        assert_eq!(std::fs::metadata(&path).expect("metadata").len(), committed);
        assert_eq!(backend.load().expect("load").len(), 1);
    }
}
