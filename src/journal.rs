use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::limits::MAX_JOURNAL_RECORD_BYTES;
use crate::model::BlockEvent;

/// Encode a single record to [len][bincode][crc32] format.
fn encode_record(writer: &mut impl Write, event: &BlockEvent) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Append-only journal of block mutations, the durability layer under the
/// reference store.
///
/// Format per record: `[u32: len][bincode: BlockEvent][u32: crc32]`
/// - `len` counts the bincode payload only, not the CRC.
/// - A truncated or corrupt tail (crash mid-append) is discarded on replay;
///   everything before it is kept.
pub struct Journal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Journal {
    /// Open (or create) the journal file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append one record durably. Tests only; the store batches via
    /// `append_buffered` + `flush_sync` for group commit.
    #[cfg(test)]
    pub fn append(&mut self, event: &BlockEvent) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Append one record to the BufWriter without flushing or syncing.
    /// Call `flush_sync()` after the batch to durably commit it.
    pub fn append_buffered(&mut self, event: &BlockEvent) -> io::Result<()> {
        encode_record(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush the BufWriter and fsync the underlying file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write a compacted record set to a temp file and fsync it.
    /// This is the slow I/O phase; call it outside the journal lock.
    pub fn write_compact_file(path: &Path, events: &[BlockEvent]) -> io::Result<()> {
        let tmp_path = path.with_extension("journal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_record(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Atomic swap: rename the temp file over the journal and reopen.
    /// Fast; safe to call while holding the journal lock.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("journal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Replace the journal with a minimal record set recreating current state.
    /// Both phases in one call. Used by tests.
    #[cfg(test)]
    pub fn compact(&mut self, events: &[BlockEvent]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Replay the journal from disk, returning all valid records in order.
    /// A missing file is an empty journal. Truncated, oversized, or
    /// CRC-corrupt trailing records end the replay without error.
    pub fn replay(path: &Path) -> io::Result<Vec<BlockEvent>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_JOURNAL_RECORD_BYTES {
                // Garbage length prefix; treat as a corrupt tail.
                break;
            }

            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }

            let mut crc_buf = [0u8; 4];
            match reader.read_exact(&mut crc_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }
            let stored_crc = u32::from_le_bytes(crc_buf);
            if stored_crc != crc32fast::hash(&payload) {
                break;
            }

            match bincode::deserialize::<BlockEvent>(&payload) {
                Ok(event) => events.push(event),
                Err(_) => break, // corrupt payload
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockId, SpaceId, TimeSpan};
    use chrono::{NaiveDate, Utc};

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("offhours_test_journal");
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn created(space: SpaceId, date: &str, start: u16, end: u16) -> BlockEvent {
        BlockEvent::Created {
            id: BlockId::generate(),
            space_id: space,
            date: d(date),
            span: TimeSpan::new(start, end),
            reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.journal");
        let _ = fs::remove_file(&path);

        let space = SpaceId::generate();
        let events = vec![
            created(space, "2025-06-10", 840, 900),
            created(space, "2025-06-11", 540, 600),
        ];

        {
            let mut journal = Journal::open(&path).unwrap();
            for e in &events {
                journal.append(e).unwrap();
            }
        }

        let replayed = Journal::replay(&path).unwrap();
        assert_eq!(replayed, events);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_handles_truncation() {
        let path = tmp_path("truncation.journal");
        let _ = fs::remove_file(&path);

        let event = created(SpaceId::generate(), "2025-06-10", 840, 900);
        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&event).unwrap();
        }

        // Append garbage to simulate a record cut off mid-write
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[7u8, 0, 0, 0, 1, 2]).unwrap(); // length says 7, only 2 bytes follow
        }

        let replayed = Journal::replay(&path).unwrap();
        assert_eq!(replayed, vec![event]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.journal");
        let _ = fs::remove_file(&path);
        assert!(Journal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_corrupt_crc() {
        let path = tmp_path("corrupt_crc.journal");
        let _ = fs::remove_file(&path);

        let event = BlockEvent::Deleted {
            id: BlockId::generate(),
            space_id: SpaceId::generate(),
            date: d("2025-06-10"),
        };

        // Manually write a record with a bad CRC
        {
            let payload = bincode::serialize(&event).unwrap();
            let len = payload.len() as u32;
            let bad_crc: u32 = 0xDEADBEEF;

            let mut f = File::create(&path).unwrap();
            f.write_all(&len.to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&bad_crc.to_le_bytes()).unwrap();
        }

        assert!(Journal::replay(&path).unwrap().is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_stops_on_garbage_length() {
        let path = tmp_path("garbage_length.journal");
        let _ = fs::remove_file(&path);

        let event = created(SpaceId::generate(), "2025-06-10", 600, 660);
        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&u32::MAX.to_le_bytes()).unwrap();
        }

        let replayed = Journal::replay(&path).unwrap();
        assert_eq!(replayed, vec![event]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_reduces_journal() {
        let path = tmp_path("compact_reduce.journal");
        let _ = fs::remove_file(&path);

        let space = SpaceId::generate();
        let keeper = created(space, "2025-06-10", 840, 900);

        // Churn: one block that stays, ten block/unblock pairs that cancel out
        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&keeper).unwrap();
            for _ in 0..10 {
                let id = BlockId::generate();
                journal
                    .append(&BlockEvent::Created {
                        id,
                        space_id: space,
                        date: d("2025-06-11"),
                        span: TimeSpan::new(540, 600),
                        reason: None,
                        created_at: Utc::now(),
                    })
                    .unwrap();
                journal
                    .append(&BlockEvent::Deleted { id, space_id: space, date: d("2025-06-11") })
                    .unwrap();
            }
        }

        let before = fs::metadata(&path).unwrap().len();
        assert!(before > 0);

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.compact(std::slice::from_ref(&keeper)).unwrap();
        }

        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted journal should be smaller: {after} < {before}");
        assert_eq!(Journal::replay(&path).unwrap(), vec![keeper]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_then_append() {
        let path = tmp_path("compact_append.journal");
        let _ = fs::remove_file(&path);

        let space = SpaceId::generate();
        let kept = created(space, "2025-06-10", 840, 900);
        let fresh = created(space, "2025-06-12", 600, 660);

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&kept).unwrap();
            journal.compact(std::slice::from_ref(&kept)).unwrap();
            assert_eq!(journal.appends_since_compact(), 0);
            journal.append(&fresh).unwrap();
            assert_eq!(journal.appends_since_compact(), 1);
        }

        let replayed = Journal::replay(&path).unwrap();
        assert_eq!(replayed, vec![kept, fresh]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn append_buffered_then_flush_sync() {
        let path = tmp_path("buffered_flush.journal");
        let _ = fs::remove_file(&path);

        let space = SpaceId::generate();
        let events: Vec<BlockEvent> =
            (0..5).map(|i| created(space, "2025-06-10", i * 60, i * 60 + 60)).collect();

        {
            let mut journal = Journal::open(&path).unwrap();
            for e in &events {
                journal.append_buffered(e).unwrap();
            }
            assert_eq!(journal.appends_since_compact(), 5);
            journal.flush_sync().unwrap();
        }

        assert_eq!(Journal::replay(&path).unwrap(), events);

        let _ = fs::remove_file(&path);
    }
}
