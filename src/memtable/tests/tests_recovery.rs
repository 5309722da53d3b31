//! `apply_without_wal` / `replay_own_wal` — the recovery replay door.

#[cfg(test)]
mod tests {
    use crate::memtable::{Memtable, ValueRecord};
    use tempfile::TempDir;

    #[test]
    fn replay_own_wal_reconstructs_state_after_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.wal");
        {
            let mt = Memtable::new(&path, 1).unwrap();
            mt.put(b"a", b"1").unwrap();
            mt.put(b"b", b"2").unwrap();
            mt.delete(b"a").unwrap();
        }

        let mt = Memtable::new(&path, 1).unwrap();
        assert!(mt.is_empty().unwrap());
        let replayed = mt.replay_own_wal().unwrap();
        assert_eq!(replayed, 3);
        assert_eq!(mt.get(b"a").unwrap(), Some(ValueRecord::Tombstone));
        assert_eq!(mt.get(b"b").unwrap(), Some(ValueRecord::Put(b"2".to_vec())));
    }

    #[test]
    fn apply_without_wal_does_not_append_to_wal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.wal");
        let mt = Memtable::new(&path, 1).unwrap();
        mt.apply_without_wal(b"k".to_vec(), ValueRecord::Put(b"v".to_vec()))
            .unwrap();
        assert_eq!(mt.get(b"k").unwrap(), Some(ValueRecord::Put(b"v".to_vec())));

        // Nothing should have been durably logged, so a second memtable
        // bound to the same file sees an empty WAL.
        let reopened = Memtable::new(&path, 1).unwrap();
        assert_eq!(reopened.replay_own_wal().unwrap(), 0);
    }
}
