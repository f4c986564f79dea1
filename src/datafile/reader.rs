use log::debug;

use crate::{
    codec::CodecRegistry,
    error::Error,
    object::{Archive, Body, DataObject},
    packfile::{reader::PackReader, unseal},
    property::Properties,
    tag::Tag,
};

/// Parses datafile images into archives, handing leaf bodies to the codec
/// registry and recursing into nested datafiles itself.
pub struct DatafileReader<'a> {
    registry: &'a CodecRegistry,
}

impl<'a> DatafileReader<'a> {
    pub fn new(registry: &'a CodecRegistry) -> Self {
        DatafileReader { registry }
    }

    /// Parses a whole file image: pack magic, masked payload, `ALL.` magic
    /// and the top-level sequence.
    pub fn parse(&self, image: &[u8], password: &[u8]) -> Result<Archive, Error> {
        let payload = unseal(image, password)?;
        let mut reader = PackReader::new(&payload);
        let magic = reader.read_u32()?;
        if magic != Tag::MAGIC.0 {
            return Err(Error::BadMagic(magic));
        }
        self.read_sequence(&mut reader)
    }

    fn read_sequence(&self, reader: &mut PackReader) -> Result<Archive, Error> {
        let count = reader.read_u32()?;
        let mut archive = Archive::new();
        for _ in 0..count {
            match self.read_object(reader)? {
                Some(object) => {
                    archive.push(object);
                }
                None => break,
            }
        }
        Ok(archive)
    }

    /// Reads one record. Returns `None` on an end-of-list tag.
    fn read_object(&self, reader: &mut PackReader) -> Result<Option<DataObject>, Error> {
        let mut properties = Properties::new();
        while let Some(record) = reader.read_property()? {
            let tag = Tag(record.tag);
            let value = String::from_utf8(record.value).map_err(|_| Error::InvalidProperty(tag))?;
            properties.set(tag, &value);
        }

        let tag = Tag(reader.read_u32()?);
        if tag == Tag::END {
            return Ok(None);
        }

        let chunk = reader.read_chunk()?;
        let body = if tag == Tag::FILE {
            let mut nested = PackReader::new(&chunk);
            Body::Archive(self.read_sequence(&mut nested)?)
        } else {
            self.registry.get(tag).decode(chunk)?
        };
        debug!("read {} object {:?}", tag, properties.get(Tag::NAME));

        Ok(Some(DataObject {
            tag,
            body,
            properties,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packfile::{seal, writer::PackWriter};

    fn image(build: impl FnOnce(&mut PackWriter)) -> Vec<u8> {
        let mut writer = PackWriter::new();
        writer.put_u32(Tag::MAGIC.0);
        build(&mut writer);
        seal(&writer.into_inner(), false, b"")
    }

    #[test]
    fn test_parse_nested() {
        let mut inner = PackWriter::new();
        inner.put_u32(1);
        inner.put_property(Tag::NAME, "LEAF").unwrap();
        inner.put_u32(Tag::DATA.0);
        inner.put_chunk(b"xyz", false).unwrap();
        let inner = inner.into_inner();

        let data = image(|w| {
            w.put_u32(1);
            w.put_property(Tag::NAME, "SUB").unwrap();
            w.put_u32(Tag::FILE.0);
            w.put_chunk(&inner, false).unwrap();
        });

        let registry = CodecRegistry::default();
        let archive = DatafileReader::new(&registry).parse(&data, b"").unwrap();
        assert_eq!(archive.len(), 1);
        let leaf = archive.find("SUB/LEAF").unwrap();
        assert_eq!(leaf.bytes(), Some(&b"xyz"[..]));
    }

    #[test]
    fn test_end_tag_stops_sequence() {
        let data = image(|w| {
            w.put_u32(3);
            w.put_u32(Tag::DATA.0);
            w.put_chunk(b"a", false).unwrap();
            w.put_u32(Tag::END.0);
        });
        let registry = CodecRegistry::default();
        let archive = DatafileReader::new(&registry).parse(&data, b"").unwrap();
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn test_bad_inner_magic() {
        let data = seal(b"NOPE\0\0\0\0", false, b"");
        let registry = CodecRegistry::default();
        assert!(matches!(
            DatafileReader::new(&registry).parse(&data, b""),
            Err(Error::BadMagic(_))
        ));
    }

    #[test]
    fn test_truncated_record() {
        let data = image(|w| {
            w.put_u32(2);
            w.put_u32(Tag::DATA.0);
            w.put_chunk(b"a", false).unwrap();
        });
        let registry = CodecRegistry::default();
        let err = DatafileReader::new(&registry).parse(&data, b"").unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_invalid_utf8_property() {
        let data = image(|w| {
            w.put_u32(1);
            w.put_bytes(b"propNAME");
            w.put_u32(2);
            w.put_bytes(&[0xFF, 0xFE]);
            w.put_u32(Tag::DATA.0);
            w.put_chunk(b"a", false).unwrap();
        });
        let registry = CodecRegistry::default();
        assert!(matches!(
            DatafileReader::new(&registry).parse(&data, b""),
            Err(Error::InvalidProperty(Tag::NAME))
        ));
    }
}
