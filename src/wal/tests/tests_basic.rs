//! WAL append / replay round-trip tests.

#[cfg(test)]
mod tests {
    use crate::wal::{RecordType, Wal};
    use tempfile::TempDir;

    #[test]
    fn append_then_replay_preserves_order_and_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.wal");
        let wal = Wal::open(&path, 1).unwrap();

        wal.append(b"a", b"1", RecordType::Put).unwrap();
        wal.append(b"b", b"2", RecordType::Put).unwrap();
        wal.append(b"a", b"", RecordType::Tombstone).unwrap();

        let records: Vec<_> = wal.replay_iter().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].key, b"a");
        assert_eq!(records[0].value, b"1");
        assert_eq!(records[0].record_type, RecordType::Put);
        assert_eq!(records[2].key, b"a");
        assert_eq!(records[2].record_type, RecordType::Tombstone);
    }

    #[test]
    fn empty_wal_replays_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.wal");
        let wal = Wal::open(&path, 1).unwrap();
        assert!(wal.replay_iter().next().is_none());
    }

    #[test]
    fn reopen_existing_wal_preserves_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("3.wal");
        {
            let wal = Wal::open(&path, 3).unwrap();
            wal.append(b"k", b"v", RecordType::Put).unwrap();
        }
        let wal = Wal::open(&path, 3).unwrap();
        let records: Vec<_> = wal.replay_iter().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, b"k");
    }

    #[test]
    fn empty_value_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.wal");
        let wal = Wal::open(&path, 1).unwrap();
        wal.append(b"k", b"", RecordType::Put).unwrap();
        let records: Vec<_> = wal.replay_iter().map(|r| r.unwrap()).collect();
        assert_eq!(records[0].value, Vec::<u8>::new());
    }
}
