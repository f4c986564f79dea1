use deku::DekuContainerRead;

use crate::{
    error::Error,
    packfile::{decompress, ChunkHeader, PropertyRecord},
    tag::Tag,
};

/// Cursor over an unmasked, inflated payload.
pub struct PackReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PackReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        PackReader { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn ensure(&self, needed: usize) -> Result<(), Error> {
        if self.remaining() < needed {
            return Err(Error::Truncated {
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn peek_u32(&self) -> Option<u32> {
        let bytes = self.rest().get(..4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        let value = self.peek_u32().ok_or(Error::Truncated {
            needed: 4,
            available: self.remaining(),
        })?;
        self.pos += 4;
        Ok(value)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        self.ensure(len)?;
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Reads the next `prop` sub-record, or returns `None` if the stream is
    /// positioned at something else.
    pub fn read_property(&mut self) -> Result<Option<PropertyRecord>, Error> {
        if self.peek_u32() != Some(Tag::PROPERTY.0) {
            return Ok(None);
        }
        self.ensure(12)?;
        let length = u32::from_be_bytes([
            self.data[self.pos + 8],
            self.data[self.pos + 9],
            self.data[self.pos + 10],
            self.data[self.pos + 11],
        ]) as usize;
        self.ensure(12 + length)?;

        let ((rest, _), record) = PropertyRecord::from_bytes((self.rest(), 0))?;
        self.pos = self.data.len() - rest.len();
        Ok(Some(record))
    }

    /// Reads one chunk and returns its inflated contents.
    pub fn read_chunk(&mut self) -> Result<Vec<u8>, Error> {
        self.ensure(ChunkHeader::SIZE)?;
        let ((rest, _), header) = ChunkHeader::from_bytes((self.rest(), 0))?;
        self.pos = self.data.len() - rest.len();

        let body = self.read_bytes(header.disk_size as usize)?;
        if header.is_compressed() {
            decompress(body, header.inflated_size())
        } else if header.inflated_size() != body.len() {
            Err(Error::SizeMismatch {
                expected: header.inflated_size(),
                actual: body.len(),
            })
        } else {
            Ok(body.to_vec())
        }
    }
}
