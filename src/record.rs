/*
The row record format: a header (a varint giving the header's own byte
length, followed by one varint per column giving its serial type) followed
by the column bodies back to back, in column order. Used for table-leaf
row payloads; index keys and PKs stay fixed-width i32s and never go through
this codec.

No overflow pages: a node's cell-content area holds a cell's data in full,
unlike stock SQLite's spillage to overflow pages.
*/

use crate::error::{Error, Result};
use crate::sql_data_types::{SerialData, SerialType, VarInt};

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub serial_data: Vec<SerialData>,
}

impl Record {
    pub fn new(serial_data: Vec<SerialData>) -> Self {
        Record { serial_data }
    }

    pub fn from_be_bytes(bytes: &[u8]) -> Result<(Self, usize)> {
        let header_size_varint =
            VarInt::from_be_bytes(bytes).map_err(|e| Error::Parse(e.to_string()))?;
        let mut offset = header_size_varint.1 as usize;

        let mut serial_types = Vec::new();
        while offset < header_size_varint.0 as usize {
            let serial_type_varint =
                VarInt::from_be_bytes(&bytes[offset..]).map_err(|e| Error::Parse(e.to_string()))?;
            offset += serial_type_varint.1 as usize;
            serial_types.push(SerialType::from_varint(serial_type_varint)?);
        }

        let body = &bytes[offset..];
        let mut body_offset = 0;
        let mut serial_data = Vec::new();
        for serial_type in serial_types {
            let (data, bytes_read) = serial_type.serial_type_to_serial_data(&body[body_offset..])?;
            body_offset += bytes_read;
            serial_data.push(data);
        }

        Ok((Record { serial_data }, offset + body_offset))
    }

    pub fn to_be_bytes(&self) -> Vec<u8> {
        let type_codes: Vec<Vec<u8>> = self
            .serial_data
            .iter()
            .map(|d| VarInt::to_be_bytes(SerialType::code_for(d)))
            .collect();
        let bodies: Vec<Vec<u8>> = self.serial_data.iter().map(|d| d.to_be_bytes()).collect();

        let header_body_len: usize = type_codes.iter().map(|c| c.len()).sum();
        // header_size itself is a varint whose own length affects the total,
        // so grow the size-varint length until it's stable (mirrors how
        // SQLite's own writer settles this, typically one byte).
        let mut size_varint_len = 1;
        loop {
            let total = size_varint_len + header_body_len;
            let candidate = VarInt::to_be_bytes(total as i64);
            if candidate.len() == size_varint_len {
                let mut out = candidate;
                for code in &type_codes {
                    out.extend(code);
                }
                for body in &bodies {
                    out.extend(body);
                }
                return out;
            }
            size_varint_len = candidate.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_mixed_columns() {
        let record = Record::new(vec![
            SerialData::I32(42),
            SerialData::Text("hello".to_string()),
            SerialData::Null,
        ]);
        let bytes = record.to_be_bytes();
        let (parsed, consumed) = Record::from_be_bytes(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed.serial_data.len(), 3);
        match &parsed.serial_data[0] {
            SerialData::I32(v) => assert_eq!(*v, 42),
            _ => panic!("wrong variant"),
        }
        match &parsed.serial_data[1] {
            SerialData::Text(s) => assert_eq!(s, "hello"),
            _ => panic!("wrong variant"),
        }
        assert!(matches!(parsed.serial_data[2], SerialData::Null));
    }

    #[test]
    fn empty_record_round_trips() {
        let record = Record::new(vec![]);
        let bytes = record.to_be_bytes();
        let (parsed, consumed) = Record::from_be_bytes(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert!(parsed.serial_data.is_empty());
    }
}
