//! Footer/magic validation on open.

#[cfg(test)]
mod tests {
    use crate::sstable::builder::SstBuilder;
    use crate::sstable::SstReader;
    use crate::wal::RecordType;
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};
    use tempfile::TempDir;

    #[test]
    fn truncated_file_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.sst");
        let mut builder = SstBuilder::new(&path).unwrap();
        builder.add(b"a", RecordType::Put, b"1").unwrap();
        builder.finish().unwrap();

        let full_len = std::fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full_len - 4).unwrap();
        drop(file);

        assert!(SstReader::open(&path, 1).is_err());
    }

    #[test]
    fn corrupted_magic_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2.sst");
        let mut builder = SstBuilder::new(&path).unwrap();
        builder.add(b"a", RecordType::Put, b"1").unwrap();
        builder.finish().unwrap();

        let full_len = std::fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(full_len - 8)).unwrap();
        file.write_all(&[0u8; 8]).unwrap();
        drop(file);

        assert!(SstReader::open(&path, 2).is_err());
    }

    #[test]
    fn empty_file_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("3.sst");
        std::fs::File::create(&path).unwrap();
        assert!(SstReader::open(&path, 3).is_err());
    }
}
