//! The tombstone-surfacing `scan` interface.

#[cfg(test)]
mod tests {
    use crate::memtable::ValueRecord;
    use crate::sstable::builder::SstBuilder;
    use crate::sstable::SstReader;
    use crate::wal::RecordType;
    use tempfile::TempDir;

    fn build(path: &std::path::Path, entries: &[(&[u8], RecordType, &[u8])]) {
        let mut builder = SstBuilder::new(path).unwrap();
        for (k, t, v) in entries {
            builder.add(k, *t, v).unwrap();
        }
        builder.finish().unwrap();
    }

    #[test]
    fn scan_from_start_yields_everything_in_order_including_tombstones() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.sst");
        build(
            &path,
            &[
                (b"a", RecordType::Put, b"1"),
                (b"b", RecordType::Tombstone, b""),
                (b"c", RecordType::Put, b"3"),
            ],
        );

        let reader = SstReader::open(&path, 1).unwrap();
        let collected: Vec<_> = reader.scan(None).collect();
        assert_eq!(
            collected,
            vec![
                (b"a".to_vec(), ValueRecord::Put(b"1".to_vec())),
                (b"b".to_vec(), ValueRecord::Tombstone),
                (b"c".to_vec(), ValueRecord::Put(b"3".to_vec())),
            ]
        );
    }

    #[test]
    fn scan_from_key_skips_earlier_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2.sst");
        build(
            &path,
            &[
                (b"a", RecordType::Put, b"1"),
                (b"b", RecordType::Put, b"2"),
                (b"c", RecordType::Put, b"3"),
            ],
        );

        let reader = SstReader::open(&path, 2).unwrap();
        let collected: Vec<_> = reader.scan(Some(b"b")).collect();
        assert_eq!(
            collected,
            vec![
                (b"b".to_vec(), ValueRecord::Put(b"2".to_vec())),
                (b"c".to_vec(), ValueRecord::Put(b"3".to_vec())),
            ]
        );
    }

    #[test]
    fn scan_spans_multiple_data_blocks_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("3.sst");
        let big_value = vec![1u8; 512];
        let mut builder = SstBuilder::new(&path).unwrap();
        for i in 0..200u32 {
            let key = format!("key-{i:05}");
            builder.add(key.as_bytes(), RecordType::Put, &big_value).unwrap();
        }
        builder.finish().unwrap();

        let reader = SstReader::open(&path, 3).unwrap();
        let keys: Vec<_> = reader.scan(None).map(|(k, _)| k).collect();
        let expected: Vec<Vec<u8>> = (0..200u32).map(|i| format!("key-{i:05}").into_bytes()).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn scan_from_key_past_the_end_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("4.sst");
        build(&path, &[(b"a", RecordType::Put, b"1")]);

        let reader = SstReader::open(&path, 4).unwrap();
        assert_eq!(reader.scan(Some(b"z")).count(), 0);
    }
}
