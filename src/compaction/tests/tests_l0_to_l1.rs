//! L0 → L1 merge: newest-wins resolution and bottom-most tombstone drop.

#[cfg(test)]
mod tests {
    use crate::compaction::compact_l0_to_l1;
    use crate::manifest::Manifest;
    use crate::memtable::ValueRecord;
    use crate::sstable::builder::SstBuilder;
    use crate::sstable::SstReader;
    use crate::wal::RecordType;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn build_sst(dir: &std::path::Path, id: u64, entries: &[(&[u8], RecordType, &[u8])]) -> Arc<SstReader> {
        let path = dir.join(format!("{id}.sst"));
        let mut builder = SstBuilder::new(&path).unwrap();
        for (k, t, v) in entries {
            builder.add(k, *t, v).unwrap();
        }
        builder.finish().unwrap();
        Arc::new(SstReader::open(&path, id).unwrap())
    }

    #[test]
    fn newest_l0_sst_wins_for_duplicate_keys() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::open(dir.path()).unwrap();

        let older = build_sst(dir.path(), 10, &[(b"a", RecordType::Put, b"old")]);
        let newer = build_sst(dir.path(), 11, &[(b"a", RecordType::Put, b"new")]);
        let l0 = vec![older, newer];

        let result = compact_l0_to_l1(
            dir.path(),
            &manifest,
            &l0,
            &[],
            crate::sstable::DEFAULT_BITS_PER_KEY,
            crate::sstable::DATA_BLOCK_TARGET_SIZE,
        )
        .unwrap()
        .unwrap();
        assert_eq!(result.get(b"a"), Some(ValueRecord::Put(b"new".to_vec())));

        let state = manifest.state().unwrap();
        assert_eq!(state.sst_levels.get(&10), None);
        assert_eq!(state.sst_levels.get(&11), None);
        assert_eq!(state.sst_levels.get(&result.file_number()), Some(&1));
        assert!(!dir.path().join("10.sst").exists());
        assert!(!dir.path().join("11.sst").exists());
    }

    #[test]
    fn tombstone_with_no_l1_puts_is_dropped_entirely() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::open(dir.path()).unwrap();

        let l0_sst = build_sst(dir.path(), 20, &[(b"gone", RecordType::Tombstone, b"")]);
        let result = compact_l0_to_l1(
            dir.path(),
            &manifest,
            &[l0_sst],
            &[],
            crate::sstable::DEFAULT_BITS_PER_KEY,
            crate::sstable::DATA_BLOCK_TARGET_SIZE,
        )
        .unwrap();
        assert!(result.is_none(), "nothing should survive: no new L1 SST produced");

        // The aborted builder must not leak its `.tmp` file onto disk.
        let leftover_tmp = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .any(|e| e.path().extension().and_then(|s| s.to_str()) == Some("tmp"));
        assert!(!leftover_tmp, "compaction left a .sst.tmp file behind");
    }

    #[test]
    fn tombstone_visible_in_l1_is_retained() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::open(dir.path()).unwrap();

        let l1_sst = build_sst(dir.path(), 1, &[(b"k", RecordType::Put, b"v")]);
        let l0_sst = build_sst(dir.path(), 20, &[(b"k", RecordType::Tombstone, b"")]);

        let result = compact_l0_to_l1(
            dir.path(),
            &manifest,
            &[l0_sst],
            &[l1_sst],
            crate::sstable::DEFAULT_BITS_PER_KEY,
            crate::sstable::DATA_BLOCK_TARGET_SIZE,
        )
        .unwrap()
        .unwrap();
        assert_eq!(result.get(b"k"), Some(ValueRecord::Tombstone));
    }

    #[test]
    fn empty_l0_returns_none_and_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::open(dir.path()).unwrap();
        let result = compact_l0_to_l1(
            dir.path(),
            &manifest,
            &[],
            &[],
            crate::sstable::DEFAULT_BITS_PER_KEY,
            crate::sstable::DATA_BLOCK_TARGET_SIZE,
        )
        .unwrap();
        assert!(result.is_none());
    }
}
