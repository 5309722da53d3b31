//! Edge cases: empty values, single-record tables, ascending-key enforcement.

#[cfg(test)]
mod tests {
    use crate::memtable::ValueRecord;
    use crate::sstable::builder::SstBuilder;
    use crate::sstable::SstReader;
    use crate::wal::RecordType;
    use tempfile::TempDir;

    #[test]
    fn single_record_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.sst");
        let mut builder = SstBuilder::new(&path).unwrap();
        builder.add(b"only", RecordType::Put, b"value").unwrap();
        builder.finish().unwrap();

        let reader = SstReader::open(&path, 1).unwrap();
        assert_eq!(reader.get(b"only"), Some(ValueRecord::Put(b"value".to_vec())));
    }

    #[test]
    fn empty_value_put_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2.sst");
        let mut builder = SstBuilder::new(&path).unwrap();
        builder.add(b"k", RecordType::Put, b"").unwrap();
        builder.finish().unwrap();

        let reader = SstReader::open(&path, 2).unwrap();
        assert_eq!(reader.get(b"k"), Some(ValueRecord::Put(Vec::new())));
    }

    #[test]
    fn lookup_before_first_key_and_after_last_key_misses() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("3.sst");
        let mut builder = SstBuilder::new(&path).unwrap();
        builder.add(b"m", RecordType::Put, b"1").unwrap();
        builder.finish().unwrap();

        let reader = SstReader::open(&path, 3).unwrap();
        assert_eq!(reader.get(b"a"), None);
        assert_eq!(reader.get(b"z"), None);
    }

    #[test]
    fn builder_len_tracks_added_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("4.sst");
        let mut builder = SstBuilder::new(&path).unwrap();
        assert!(builder.is_empty());
        builder.add(b"a", RecordType::Put, b"1").unwrap();
        builder.add(b"b", RecordType::Put, b"2").unwrap();
        assert_eq!(builder.len(), 2);
        assert!(!builder.is_empty());
    }
}
