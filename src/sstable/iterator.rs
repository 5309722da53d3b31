//! Tombstone-surfacing scan over an [`SstReader`](super::SstReader).

use crate::memtable::ValueRecord;
use crate::wal::RecordType;

use super::block::BlockIterator;
use super::SstReader;

/// Iterates every record in an SST from a starting point to the end,
/// surfacing Put and Tombstone records alike.
///
/// Built once per [`SstReader::scan`](super::SstReader::scan) call; holds
/// the current data block's decoded records and advances block-by-block
/// as they're exhausted.
pub struct SstScan<'a> {
    reader: &'a SstReader,
    block_idx: usize,
    current: Vec<(Vec<u8>, RecordType, Vec<u8>)>,
    current_pos: usize,
    from: Option<Vec<u8>>,
    started: bool,
}

impl<'a> SstScan<'a> {
    pub(super) fn new(reader: &'a SstReader, start_block: usize, from: Option<Vec<u8>>) -> Self {
        Self {
            reader,
            block_idx: start_block,
            current: Vec::new(),
            current_pos: 0,
            from,
            started: false,
        }
    }

    fn load_block(&mut self, idx: usize) -> bool {
        match self.reader.block_bytes(idx) {
            Some(bytes) => {
                self.current = BlockIterator::new(bytes)
                    .map(|r| (r.key.to_vec(), r.record_type, r.value.to_vec()))
                    .collect();
                self.current_pos = 0;
                true
            }
            None => false,
        }
    }
}

impl Iterator for SstScan<'_> {
    type Item = (Vec<u8>, ValueRecord);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            if self.block_idx >= self.reader.block_count() || !self.load_block(self.block_idx) {
                return None;
            }
            if let Some(from) = self.from.take() {
                while self.current_pos < self.current.len() && self.current[self.current_pos].0 < from {
                    self.current_pos += 1;
                }
            }
        }

        loop {
            if self.current_pos < self.current.len() {
                let (key, record_type, value) = self.current[self.current_pos].clone();
                self.current_pos += 1;
                let record = match record_type {
                    RecordType::Put => ValueRecord::Put(value),
                    RecordType::Tombstone => ValueRecord::Tombstone,
                };
                return Some((key, record));
            }

            self.block_idx += 1;
            if self.block_idx >= self.reader.block_count() {
                return None;
            }
            if !self.load_block(self.block_idx) {
                return None;
            }
        }
    }
}
