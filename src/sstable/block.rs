//! Block codec: encode/decode a sequence of `(key, type, value)` records
//! within a single byte buffer.
//!
//! Shared by data blocks (one record per live entry) and the index block
//! (one record per data block, where the "value" is an encoded
//! [`BlockHandle`]). A new block begins whenever the current one reaches
//! the target size; the caller (the SST writer) owns that decision, not
//! this module.

use crate::wal::RecordType;

/// A `(offset, size)` pair locating a block inside an SST file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    pub const ENCODED_SIZE: usize = 16;

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::ENCODED_SIZE {
            return None;
        }
        let offset = u64::from_le_bytes(buf[0..8].try_into().ok()?);
        let size = u64::from_le_bytes(buf[8..16].try_into().ok()?);
        Some(Self { offset, size })
    }
}

/// Appends one record — `key_len | key | type | val_len | val` — in call
/// order. No sorting, no deduplication; the caller enforces key order.
pub fn append_record(buf: &mut Vec<u8>, key: &[u8], record_type: RecordType, value: &[u8]) {
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.push(record_type as u8);
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value);
}

/// The encoded size a record would occupy, without actually writing it —
/// used by the writer to decide when a block is full.
pub fn record_size(key_len: usize, value_len: usize) -> usize {
    4 + key_len + 1 + 4 + value_len
}

/// One decoded `(key, type, value)` record plus the byte offset just past
/// it, for sequential scanning.
pub struct DecodedRecord<'a> {
    pub key: &'a [u8],
    pub record_type: RecordType,
    pub value: &'a [u8],
    pub next_offset: usize,
}

/// Decodes one record starting at `buf[offset]`.
///
/// Returns `None` if the remaining bytes are too short to hold a full
/// record — callers use this to detect the end of a block.
pub fn decode_record(buf: &[u8], offset: usize) -> Option<DecodedRecord<'_>> {
    let mut pos = offset;
    let key_len = read_u32(buf, pos)? as usize;
    pos += 4;
    let key = buf.get(pos..pos + key_len)?;
    pos += key_len;
    let type_byte = *buf.get(pos)?;
    pos += 1;
    let record_type = match type_byte {
        1 => RecordType::Put,
        2 => RecordType::Tombstone,
        _ => return None,
    };
    let val_len = read_u32(buf, pos)? as usize;
    pos += 4;
    let value = buf.get(pos..pos + val_len)?;
    pos += val_len;

    Some(DecodedRecord {
        key,
        record_type,
        value,
        next_offset: pos,
    })
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Iterates every record in a block buffer from start to end.
pub struct BlockIterator<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> BlockIterator<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }
}

impl<'a> Iterator for BlockIterator<'a> {
    type Item = DecodedRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.buf.len() {
            return None;
        }
        let record = decode_record(self.buf, self.offset)?;
        self.offset = record.next_offset;
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_put_and_a_tombstone() {
        let mut buf = Vec::new();
        append_record(&mut buf, b"k1", RecordType::Put, b"v1");
        append_record(&mut buf, b"k2", RecordType::Tombstone, b"");

        let records: Vec<_> = BlockIterator::new(&buf).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, b"k1");
        assert_eq!(records[0].value, b"v1");
        assert_eq!(records[1].key, b"k2");
        assert_eq!(records[1].record_type, RecordType::Tombstone);
    }

    #[test]
    fn block_handle_round_trips() {
        let handle = BlockHandle {
            offset: 4096,
            size: 128,
        };
        let mut buf = Vec::new();
        handle.encode(&mut buf);
        let decoded = BlockHandle::decode(&buf).unwrap();
        assert_eq!(handle, decoded);
    }

    #[test]
    fn record_size_matches_actual_encoding() {
        let mut buf = Vec::new();
        append_record(&mut buf, b"abc", RecordType::Put, b"xyz12");
        assert_eq!(buf.len(), record_size(3, 5));
    }
}
