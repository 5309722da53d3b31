//! `Db::scan` — ascending order, tombstone hiding, newest-version-wins
//! across the active memtable, L0, and L1.

#[cfg(test)]
mod tests {
    use crate::engine::{Db, DbConfig};
    use tempfile::TempDir;

    #[test]
    fn scan_returns_ascending_order_with_no_duplicates() {
        let dir = TempDir::new().unwrap();
        let db = Db::open(dir.path(), DbConfig::default()).unwrap();
        db.put(b"c", b"3").unwrap();
        db.put(b"a", b"1").unwrap();
        db.put(b"b", b"2").unwrap();

        let results: Vec<_> = db.scan(None).unwrap().collect();
        assert_eq!(
            results,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
                (b"c".to_vec(), b"3".to_vec()),
            ]
        );
    }

    #[test]
    fn scan_hides_tombstoned_keys() {
        let dir = TempDir::new().unwrap();
        let db = Db::open(dir.path(), DbConfig::default()).unwrap();
        db.put(b"a", b"1").unwrap();
        db.put(b"b", b"2").unwrap();
        db.delete(b"a").unwrap();

        let results: Vec<_> = db.scan(None).unwrap().collect();
        assert_eq!(results, vec![(b"b".to_vec(), b"2".to_vec())]);
    }

    #[test]
    fn scan_respects_start_key_bound() {
        let dir = TempDir::new().unwrap();
        let db = Db::open(dir.path(), DbConfig::default()).unwrap();
        for k in ["a", "b", "c", "d"] {
            db.put(k.as_bytes(), b"x").unwrap();
        }

        let results: Vec<_> = db.scan(Some(b"c")).unwrap().collect();
        assert_eq!(
            results,
            vec![(b"c".to_vec(), b"x".to_vec()), (b"d".to_vec(), b"x".to_vec())]
        );
    }

    #[test]
    fn scan_merges_active_memtable_over_flushed_ssts() {
        let dir = TempDir::new().unwrap();
        let config = DbConfig {
            flush_threshold: 2,
            l0_compaction_trigger: usize::MAX,
            ..DbConfig::default()
        };
        let db = Db::open(dir.path(), config).unwrap();

        db.put(b"a", b"old").unwrap();
        db.put(b"b", b"2").unwrap(); // flushes a,b to L0
        db.put(b"a", b"new").unwrap(); // active memtable now shadows L0's "a"

        let results: Vec<_> = db.scan(None).unwrap().collect();
        assert_eq!(
            results,
            vec![(b"a".to_vec(), b"new".to_vec()), (b"b".to_vec(), b"2".to_vec())]
        );
    }
}
