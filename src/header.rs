/*
The 100-byte file header. Offsets and fixed constants are grounded in
`chidb_Btree_open` (original_source/src/libchidb/btree.c): a handful of
fields must match fixed values on open or the file is rejected as corrupt,
including the schema cookie at offset 40 (chidb's `magic_num_5`); the rest
(change counter, schema format, user version...) are read/written but not
enforced.
*/

use std::convert::TryInto;

use crate::error::{Error, Result};
use crate::pager::{read_be16, read_be32, FILE_HEADER_SIZE};

pub const MAGIC: &[u8; 16] = b"SQLite format 3\0";
pub const DEFAULT_PAGE_SIZE: u16 = 1024;
pub const DEFAULT_PAGE_CACHE_SIZE: u32 = 20_000;

const PAGE_SIZE_OFFSET: usize = 16;
const FILE_FORMAT_WRITE_VERSION_OFFSET: usize = 18;
const FILE_FORMAT_READ_VERSION_OFFSET: usize = 19;
const RESERVED_SPACE_OFFSET: usize = 20;
const MAX_PAYLOAD_FRACTION_OFFSET: usize = 21;
const MIN_PAYLOAD_FRACTION_OFFSET: usize = 22;
const LEAF_PAYLOAD_FRACTION_OFFSET: usize = 23;
const FILE_CHANGE_COUNTER_OFFSET: usize = 24;
const SCHEMA_COOKIE_OFFSET: usize = 40;
const SCHEMA_FORMAT_OFFSET: usize = 44;
const PAGE_CACHE_SIZE_OFFSET: usize = 48;
const TEXT_ENCODING_OFFSET: usize = 56;
const USER_VERSION_OFFSET: usize = 60;

const FIXED_FILE_FORMAT_VERSION: u8 = 1;
const FIXED_RESERVED_SPACE: u8 = 0;
const FIXED_MAX_PAYLOAD_FRACTION: u8 = 0x40;
const FIXED_MIN_PAYLOAD_FRACTION: u8 = 0x20;
const FIXED_LEAF_PAYLOAD_FRACTION: u8 = 0x20;
const FIXED_SCHEMA_COOKIE: u32 = 1;
const DEFAULT_SCHEMA_FORMAT: u32 = 1;
const FIXED_TEXT_ENCODING: u32 = 1;

/// The file-wide header, read once on open and rewritten whenever a
/// counter-only field changes (the node-header region of page 1 is
/// rewritten separately, by the B-tree layer's `write_node`).
#[derive(Debug, Clone)]
pub struct DatabaseHeader {
    pub page_size: u16,
    pub file_change_counter: u32,
    pub schema_cookie: u32,
    pub user_version: u32,
}

impl DatabaseHeader {
    pub fn new(page_size: u16) -> Self {
        DatabaseHeader {
            page_size,
            file_change_counter: 0,
            schema_cookie: FIXED_SCHEMA_COOKIE,
            user_version: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[0..16].copy_from_slice(MAGIC);
        buf[PAGE_SIZE_OFFSET..PAGE_SIZE_OFFSET + 2].copy_from_slice(&self.page_size.to_be_bytes());
        buf[FILE_FORMAT_WRITE_VERSION_OFFSET] = FIXED_FILE_FORMAT_VERSION;
        buf[FILE_FORMAT_READ_VERSION_OFFSET] = FIXED_FILE_FORMAT_VERSION;
        buf[RESERVED_SPACE_OFFSET] = FIXED_RESERVED_SPACE;
        buf[MAX_PAYLOAD_FRACTION_OFFSET] = FIXED_MAX_PAYLOAD_FRACTION;
        buf[MIN_PAYLOAD_FRACTION_OFFSET] = FIXED_MIN_PAYLOAD_FRACTION;
        buf[LEAF_PAYLOAD_FRACTION_OFFSET] = FIXED_LEAF_PAYLOAD_FRACTION;
        buf[FILE_CHANGE_COUNTER_OFFSET..FILE_CHANGE_COUNTER_OFFSET + 4]
            .copy_from_slice(&self.file_change_counter.to_be_bytes());
        buf[SCHEMA_COOKIE_OFFSET..SCHEMA_COOKIE_OFFSET + 4]
            .copy_from_slice(&self.schema_cookie.to_be_bytes());
        buf[SCHEMA_FORMAT_OFFSET..SCHEMA_FORMAT_OFFSET + 4]
            .copy_from_slice(&DEFAULT_SCHEMA_FORMAT.to_be_bytes());
        buf[PAGE_CACHE_SIZE_OFFSET..PAGE_CACHE_SIZE_OFFSET + 4]
            .copy_from_slice(&DEFAULT_PAGE_CACHE_SIZE.to_be_bytes());
        buf[TEXT_ENCODING_OFFSET..TEXT_ENCODING_OFFSET + 4]
            .copy_from_slice(&FIXED_TEXT_ENCODING.to_be_bytes());
        buf[USER_VERSION_OFFSET..USER_VERSION_OFFSET + 4]
            .copy_from_slice(&self.user_version.to_be_bytes());
        buf
    }

    pub fn parse(buf: &[u8; FILE_HEADER_SIZE]) -> Result<Self> {
        if &buf[0..16] != MAGIC {
            return Err(Error::CorruptHeader("bad magic".into()));
        }
        let page_size = read_be16(buf, PAGE_SIZE_OFFSET)?;
        if page_size < 512 || (page_size as u32).count_ones() != 1 {
            return Err(Error::CorruptHeader(
                "page size must be a power of two >= 512".into(),
            ));
        }
        if buf[FILE_FORMAT_WRITE_VERSION_OFFSET] != FIXED_FILE_FORMAT_VERSION
            || buf[FILE_FORMAT_READ_VERSION_OFFSET] != FIXED_FILE_FORMAT_VERSION
        {
            return Err(Error::CorruptHeader("unsupported file format version".into()));
        }
        if buf[RESERVED_SPACE_OFFSET] != FIXED_RESERVED_SPACE {
            return Err(Error::CorruptHeader("unexpected reserved space".into()));
        }
        if buf[MAX_PAYLOAD_FRACTION_OFFSET] != FIXED_MAX_PAYLOAD_FRACTION
            || buf[MIN_PAYLOAD_FRACTION_OFFSET] != FIXED_MIN_PAYLOAD_FRACTION
            || buf[LEAF_PAYLOAD_FRACTION_OFFSET] != FIXED_LEAF_PAYLOAD_FRACTION
        {
            return Err(Error::CorruptHeader("unexpected payload fraction constants".into()));
        }
        let schema_cookie = read_be32(buf, SCHEMA_COOKIE_OFFSET)?;
        if schema_cookie != FIXED_SCHEMA_COOKIE {
            return Err(Error::CorruptHeader("unexpected schema cookie".into()));
        }
        // Schema format at offset 44 legitimately ranges 1-4; read but not enforced.
        let page_cache_size = read_be32(buf, PAGE_CACHE_SIZE_OFFSET)?;
        if page_cache_size != DEFAULT_PAGE_CACHE_SIZE {
            return Err(Error::CorruptHeader("unexpected page cache size".into()));
        }
        let text_encoding = read_be32(buf, TEXT_ENCODING_OFFSET)?;
        if text_encoding != FIXED_TEXT_ENCODING {
            return Err(Error::CorruptHeader("unsupported text encoding".into()));
        }

        Ok(DatabaseHeader {
            page_size,
            file_change_counter: read_be32(buf, FILE_CHANGE_COUNTER_OFFSET)?,
            schema_cookie,
            user_version: read_be32(buf, USER_VERSION_OFFSET)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_defaults() {
        let h = DatabaseHeader::new(DEFAULT_PAGE_SIZE);
        let bytes = h.to_bytes();
        let parsed = DatabaseHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(&bytes[0..16], MAGIC);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = DatabaseHeader::new(DEFAULT_PAGE_SIZE).to_bytes();
        bytes[0] = b'X';
        assert!(DatabaseHeader::parse(&bytes).is_err());
    }

    #[test]
    fn rejects_wrong_page_cache_size() {
        let mut bytes = DatabaseHeader::new(DEFAULT_PAGE_SIZE).to_bytes();
        bytes[PAGE_CACHE_SIZE_OFFSET..PAGE_CACHE_SIZE_OFFSET + 4].copy_from_slice(&0u32.to_be_bytes());
        assert!(matches!(
            DatabaseHeader::parse(&bytes),
            Err(Error::CorruptHeader(_))
        ));
    }

    #[test]
    fn schema_cookie_round_trips_to_fixed_value() {
        let h = DatabaseHeader::new(DEFAULT_PAGE_SIZE);
        let bytes = h.to_bytes();
        assert_eq!(
            u32::from_be_bytes(bytes[SCHEMA_COOKIE_OFFSET..SCHEMA_COOKIE_OFFSET + 4].try_into().unwrap()),
            FIXED_SCHEMA_COOKIE
        );
        let parsed = DatabaseHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.schema_cookie, FIXED_SCHEMA_COOKIE);
    }

    #[test]
    fn rejects_wrong_schema_cookie() {
        let mut bytes = DatabaseHeader::new(DEFAULT_PAGE_SIZE).to_bytes();
        bytes[SCHEMA_COOKIE_OFFSET..SCHEMA_COOKIE_OFFSET + 4].copy_from_slice(&0u32.to_be_bytes());
        assert!(matches!(
            DatabaseHeader::parse(&bytes),
            Err(Error::CorruptHeader(_))
        ));
    }
}
