use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::limits::MAX_WAL_RECORD_BYTES;
use crate::model::Event;

/// Frame one event as `[len][bincode][crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_WAL_RECORD_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "event too large for WAL"));
    }
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Reads `buf.len()` bytes; `Ok(false)` on a clean or torn end of file.
fn read_frame_part(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only log of [`Event`]s backing the record store.
///
/// Each record is `[u32 le: len][bincode: Event][u32 le: crc32 of payload]`.
/// A torn or corrupt tail (crash during a write) ends replay at the last
/// intact record. Bytes written since the last successful [`Wal::flush_sync`]
/// can be dropped again with [`Wal::discard_unsynced`].
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length after the last successful sync.
    synced_len: u64,
    /// Bytes and events handed to the writer since then.
    unsynced_len: u64,
    unsynced_appends: u64,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let synced_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            synced_len,
            unsynced_len: 0,
            unsynced_appends: 0,
            appends_since_compact: 0,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(std::slice::from_ref(event))?;
        self.flush_sync()
    }

    /// Buffer the events of one operation. They are encoded up front, so an
    /// event that cannot be encoded leaves nothing of the operation behind.
    /// Nothing is durable until [`Wal::flush_sync`].
    pub fn append_buffered(&mut self, events: &[Event]) -> io::Result<()> {
        let mut frame = Vec::new();
        for event in events {
            encode_event(&mut frame, event)?;
        }
        self.writer.write_all(&frame)?;
        self.unsynced_len += frame.len() as u64;
        self.unsynced_appends += events.len() as u64;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.synced_len += self.unsynced_len;
        self.appends_since_compact += self.unsynced_appends;
        self.unsynced_len = 0;
        self.unsynced_appends = 0;
        Ok(())
    }

    /// Drop everything appended since the last successful sync, both the
    /// writer's buffer and any bytes that already reached the file.
    pub fn discard_unsynced(&mut self) -> io::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        file.set_len(self.synced_len)?;
        file.sync_all()?;
        // Replacing the writer drops its buffer without writing it out.
        let old = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let _ = old.into_parts();
        self.unsynced_len = 0;
        self.unsynced_appends = 0;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write `events` to the side file that [`Wal::swap_compact_file`] installs.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let file = File::create(Self::compact_path(path))?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the side file over the log and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.synced_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.unsynced_len = 0;
        self.unsynced_appends = 0;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Every intact event in the log, oldest first. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            if !read_frame_part(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_WAL_RECORD_BYTES {
                tracing::warn!("WAL {}: oversized record ({len} bytes), stopping replay", path.display());
                break;
            }

            let mut payload = vec![0u8; len];
            let mut crc_buf = [0u8; 4];
            if !read_frame_part(&mut reader, &mut payload)? || !read_frame_part(&mut reader, &mut crc_buf)? {
                tracing::warn!("WAL {}: torn record after {} events", path.display(), events.len());
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!("WAL {}: checksum mismatch after {} events", path.display(), events.len());
                break;
            }

            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Frequency, Preference};
    use chrono::{NaiveDate, Weekday};
    use ulid::Ulid;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("rota_test_wal");
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn schedule_created(id: Ulid) -> Event {
        Event::ScheduleCreated {
            id,
            name: "Kitchen".into(),
            slug: "kitchen".into(),
            disabled: false,
            cleaners_per_date: 2,
            frequency: Frequency::EvenWeeks,
            due_day: Weekday::Mon,
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let _ = fs::remove_file(&path);

        let schedule_id = Ulid::new();
        let events = vec![
            schedule_created(schedule_id),
            Event::CleanerCreated {
                id: Ulid::new(),
                name: "Ada".into(),
                preference: Preference::OneDuty,
            },
            Event::CleaningDayCreated {
                id: Ulid::new(),
                schedule_id,
                date: NaiveDate::from_ymd_opt(2010, 1, 11).unwrap(),
            },
        ];

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, events);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_handles_truncation() {
        let path = tmp_path("truncation.wal");
        let _ = fs::remove_file(&path);

        let event = schedule_created(Ulid::new());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }

        // Partial length prefix plus a few bytes, as after a crash mid-write
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0u8; 6]).unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, vec![event]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_stops_at_oversized_length() {
        let path = tmp_path("oversized.wal");
        let _ = fs::remove_file(&path);

        let event = schedule_created(Ulid::new());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&u32::MAX.to_le_bytes()).unwrap();
            f.write_all(&[1, 2, 3]).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![event]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.wal");
        let _ = fs::remove_file(&path);
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_stops_at_corrupt_crc() {
        let path = tmp_path("corrupt_crc.wal");
        let _ = fs::remove_file(&path);

        let event = Event::AssignmentDeleted { id: Ulid::new() };
        {
            let payload = bincode::serialize(&event).unwrap();
            let len = payload.len() as u32;
            let bad_crc: u32 = 0xDEADBEEF;

            let mut f = File::create(&path).unwrap();
            f.write_all(&len.to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&bad_crc.to_le_bytes()).unwrap();
        }

        assert!(Wal::replay(&path).unwrap().is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_then_append() {
        let path = tmp_path("compact_append.wal");
        let _ = fs::remove_file(&path);

        let schedule_id = Ulid::new();
        let compacted = vec![schedule_created(schedule_id)];
        let day = Event::CleaningDayCreated {
            id: Ulid::new(),
            schedule_id,
            date: NaiveDate::from_ymd_opt(2010, 1, 18).unwrap(),
        };

        {
            let mut wal = Wal::open(&path).unwrap();
            // Churn that compaction should drop
            for _ in 0..10 {
                let id = Ulid::new();
                wal.append(&Event::DutySwitchRequested {
                    id,
                    source_assignment_id: Ulid::new(),
                    selected_assignment_id: None,
                })
                .unwrap();
                wal.append(&Event::AssignmentDeleted { id }).unwrap();
            }
            let before = fs::metadata(&path).unwrap().len();

            wal.compact(&compacted).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
            let after = fs::metadata(&path).unwrap().len();
            assert!(after < before, "compacted WAL should be smaller: {after} < {before}");

            wal.append(&day).unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, vec![compacted[0].clone(), day]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn append_buffered_then_flush_sync() {
        let path = tmp_path("buffered_flush.wal");
        let _ = fs::remove_file(&path);

        let events: Vec<Event> = (0..5).map(|_| schedule_created(Ulid::new())).collect();
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append_buffered(&events[..2]).unwrap();
            wal.append_buffered(&events[2..]).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
            wal.flush_sync().unwrap();
            assert_eq!(wal.appends_since_compact(), 5);
        }

        assert_eq!(Wal::replay(&path).unwrap(), events);

        let _ = fs::remove_file(&path);
    }

    fn oversized_cleaner(id: Ulid) -> Event {
        Event::CleanerCreated {
            id,
            name: "x".repeat(MAX_WAL_RECORD_BYTES + 1),
            preference: Preference::NoPreference,
        }
    }

    #[test]
    fn unencodable_event_drops_whole_operation() {
        let path = tmp_path("unencodable_operation.wal");
        let _ = fs::remove_file(&path);

        let first = schedule_created(Ulid::new());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();

            let operation = vec![schedule_created(Ulid::new()), oversized_cleaner(Ulid::new())];
            assert!(wal.append_buffered(&operation).is_err());
            wal.flush_sync().unwrap();
            assert_eq!(wal.appends_since_compact(), 1);
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![first]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn discard_unsynced_rolls_back_to_last_sync() {
        let path = tmp_path("discard_unsynced.wal");
        let _ = fs::remove_file(&path);

        let kept = schedule_created(Ulid::new());
        let later = schedule_created(Ulid::new());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&kept).unwrap();

            let dropped: Vec<Event> = (0..3).map(|_| Event::AssignmentDeleted { id: Ulid::new() }).collect();
            wal.append_buffered(&dropped).unwrap();
            // Push the bytes to the file without syncing, as a failed sync would leave them
            wal.writer.flush().unwrap();
            wal.discard_unsynced().unwrap();
            assert_eq!(fs::metadata(&path).unwrap().len(), wal.synced_len);

            wal.append(&later).unwrap();
            assert_eq!(wal.appends_since_compact(), 2);
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![kept, later]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn reopen_tracks_existing_length() {
        let path = tmp_path("reopen_length.wal");
        let _ = fs::remove_file(&path);

        let first = schedule_created(Ulid::new());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append_buffered(&[Event::AssignmentDeleted { id: Ulid::new() }]).unwrap();
            wal.writer.flush().unwrap();
            wal.discard_unsynced().unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![first]);

        let _ = fs::remove_file(&path);
    }
}
