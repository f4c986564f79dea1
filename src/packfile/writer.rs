use deku::DekuContainerWrite;

use crate::{
    error::Error,
    packfile::{compress, ChunkHeader, PropertyRecord},
    tag::Tag,
};

#[derive(Default)]
pub struct PackWriter {
    buf: Vec<u8>,
}

impl PackWriter {
    pub fn new() -> Self {
        PackWriter::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_property(&mut self, tag: Tag, value: &str) -> Result<(), Error> {
        let record = PropertyRecord::new(tag.0, value.as_bytes());
        self.buf.extend(record.to_bytes()?);
        Ok(())
    }

    /// Writes `body` as a chunk, deflating it first when `compress_body` is set.
    pub fn put_chunk(&mut self, body: &[u8], compress_body: bool) -> Result<(), Error> {
        let stored = if compress_body {
            compress(body)
        } else {
            body.to_vec()
        };
        let data_size = body.len() as i32;
        let header = ChunkHeader {
            disk_size: stored.len() as u32,
            data_size: if compress_body { -data_size } else { data_size },
        };
        self.buf.extend(header.to_bytes()?);
        self.buf.extend(stored);
        Ok(())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packfile::reader::PackReader;

    #[test]
    fn test_chunk_layout() {
        let mut writer = PackWriter::new();
        writer.put_chunk(&[1, 2, 3], false).unwrap();
        assert_eq!(
            writer.into_inner(),
            vec![0, 0, 0, 3, 0, 0, 0, 3, 1, 2, 3]
        );
    }

    #[test]
    fn test_compressed_chunk_has_negative_size() {
        let body = vec![0x55u8; 1000];
        let mut writer = PackWriter::new();
        writer.put_chunk(&body, true).unwrap();
        let data = writer.into_inner();
        let data_size = i32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        assert_eq!(data_size, -1000);
        assert!(data.len() < 1000);

        let mut reader = PackReader::new(&data);
        assert_eq!(reader.read_chunk().unwrap(), body);
    }

    #[test]
    fn test_property_layout() {
        let mut writer = PackWriter::new();
        writer.put_property(Tag::NAME, "AB").unwrap();
        let mut expected = b"propNAME".to_vec();
        expected.extend_from_slice(&2u32.to_be_bytes());
        expected.extend_from_slice(b"AB");
        assert_eq!(writer.into_inner(), expected);
    }
}
