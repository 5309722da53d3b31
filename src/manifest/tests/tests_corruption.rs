//! Truncated tails are tolerated; mid-record magic mismatches are not.

#[cfg(test)]
mod tests {
    use crate::manifest::Manifest;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn truncated_trailing_edit_is_discarded_without_erroring() {
        let dir = TempDir::new().unwrap();
        {
            let manifest = Manifest::open(dir.path()).unwrap();
            manifest.add_sst(1, 0).unwrap();
            manifest.add_sst(2, 0).unwrap();
        }

        let log_path = dir.path().join("MANIFEST.log");
        let full_len = std::fs::metadata(&log_path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&log_path).unwrap();
        file.set_len(full_len - 3).unwrap();
        drop(file);

        let reopened = Manifest::open(dir.path()).unwrap();
        let state = reopened.state().unwrap();
        // The first edit (add_sst 1) is intact; the truncated second edit
        // is silently dropped.
        assert_eq!(state.sst_levels.get(&1), Some(&0));
        assert_eq!(state.sst_levels.get(&2), None);
    }

    #[test]
    fn corrupted_magic_mid_record_is_a_hard_error() {
        let dir = TempDir::new().unwrap();
        {
            let manifest = Manifest::open(dir.path()).unwrap();
            manifest.add_sst(1, 0).unwrap();
        }

        let log_path = dir.path().join("MANIFEST.log");
        let mut file = OpenOptions::new().write(true).open(&log_path).unwrap();
        file.write_all(&[0xFFu8; 4]).unwrap();
        drop(file);

        assert!(Manifest::open(dir.path()).is_err());
    }

    #[test]
    fn empty_log_file_opens_cleanly() {
        let dir = TempDir::new().unwrap();
        std::fs::File::create(dir.path().join("MANIFEST.log")).unwrap();
        let manifest = Manifest::open(dir.path()).unwrap();
        assert_eq!(manifest.state().unwrap().next_file_number, 0);
    }
}
