use log::{debug, info};

use crate::{
    codec::CodecRegistry,
    datafile::SaveSettings,
    error::Error,
    object::{Archive, Body, DataObject},
    packfile::{seal, writer::PackWriter},
    property::Properties,
    tag::Tag,
};

const INFO_NAME: &str = "GrabberInfo";
const INFO_BODY: &[u8] = b"For internal use by the grabber\0";

/// Serializes archives under one set of resolved save settings.
pub struct DatafileWriter<'a> {
    registry: &'a CodecRegistry,
    settings: SaveSettings,
    fixed_props: &'a [Tag],
}

fn percent(stored: usize, original: usize) -> usize {
    if original == 0 {
        0
    } else {
        stored * 100 / original
    }
}

impl<'a> DatafileWriter<'a> {
    pub fn new(registry: &'a CodecRegistry, settings: SaveSettings, fixed_props: &'a [Tag]) -> Self {
        DatafileWriter {
            registry,
            settings,
            fixed_props,
        }
    }

    fn log(&self, message: String) {
        if self.settings.verbose {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }
    }

    /// Whether a property survives the current strip level.
    pub fn should_save_property(&self, tag: Tag) -> bool {
        match self.settings.strip {
            0 => true,
            _ if self.fixed_props.contains(&tag) => true,
            1 => !self.registry.is_builtin_property(tag),
            _ => false,
        }
    }

    /// Builds the complete file image. `info` becomes the trailing settings
    /// object when nothing is stripped.
    pub fn write(&self, archive: &Archive, info: &Properties, password: &[u8]) -> Result<Vec<u8>, Error> {
        let mut writer = PackWriter::new();
        writer.put_u32(Tag::MAGIC.0);

        let with_info = self.settings.strip == 0;
        writer.put_u32(archive.len() as u32 + with_info as u32);
        for object in archive.iter() {
            self.write_object(object, &mut writer)?;
        }

        if with_info {
            let mut info_object = DataObject::new(Tag::INFO, Body::Binary(INFO_BODY.to_vec()));
            info_object.properties = info.clone();
            info_object.set_property(Tag::NAME, INFO_NAME);
            self.write_properties(&info_object, &mut writer, true)?;
            writer.put_u32(Tag::INFO.0);
            writer.put_chunk(INFO_BODY, false)?;
        }

        let payload = writer.into_inner();
        let image = seal(&payload, self.settings.pack >= 2, password);
        if self.settings.pack >= 2 {
            self.log(format!(
                "{:<28}{:7} bytes into {:<7} ({}%)",
                "- GLOBAL COMPRESSION -",
                payload.len(),
                image.len(),
                percent(image.len(), payload.len())
            ));
        }
        Ok(image)
    }

    fn write_properties(&self, object: &DataObject, writer: &mut PackWriter, keep_all: bool) -> Result<(), Error> {
        let mut properties = object.properties.clone();
        properties.sort();
        for property in properties.iter() {
            if keep_all || self.should_save_property(property.tag) {
                writer.put_property(property.tag, &property.value)?;
            }
        }
        Ok(())
    }

    fn write_object(&self, object: &DataObject, writer: &mut PackWriter) -> Result<(), Error> {
        self.write_properties(object, writer, false)?;
        writer.put_u32(object.tag.0);

        match &object.body {
            Body::Archive(nested) => {
                self.log(object.name().to_string());
                let mut inner = PackWriter::new();
                inner.put_u32(nested.len() as u32);
                for child in nested.iter() {
                    self.write_object(child, &mut inner)?;
                }
                writer.put_chunk(&inner.into_inner(), false)?;
                self.log(format!("End of {}", object.name()));
            }
            Body::Binary(_) => {
                let body = self.registry.get(object.tag).encode(object)?;
                let compress = self.settings.pack == 1;
                let before = writer.len();
                writer.put_chunk(&body, compress)?;
                if compress {
                    let stored = writer.len() - before;
                    self.log(format!(
                        "{:<28}{:7} bytes into {:<7} ({}%)",
                        object.name(),
                        body.len(),
                        stored,
                        percent(stored, body.len())
                    ));
                } else {
                    self.log(object.name().to_string());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datafile::reader::DatafileReader;

    fn settings(pack: u8, strip: u8) -> SaveSettings {
        SaveSettings {
            pack,
            strip,
            sort: false,
            verbose: false,
            backup: false,
        }
    }

    fn sample() -> Archive {
        let mut inner = Archive::new();
        inner
            .insert("CHILD", Tag::DATA, Body::Binary(vec![9; 64]))
            .set_property(Tag::ORIG, "child.bin");
        let mut archive = Archive::new();
        let leaf = archive.insert("LEAF", Tag::DATA, Body::Binary(vec![1; 64]));
        leaf.set_property(Tag::ORIG, "leaf.bin");
        leaf.set_property(Tag::clean("AUTH"), "me");
        archive.insert("SUB", Tag::FILE, Body::Archive(inner));
        archive
    }

    #[test]
    fn test_strip_levels() {
        let registry = CodecRegistry::default();
        let info = Properties::new();
        let read = |image: Vec<u8>| DatafileReader::new(&registry).parse(&image, b"").unwrap();

        let full = read(DatafileWriter::new(&registry, settings(0, 0), &[]).write(&sample(), &info, b"").unwrap());
        assert_eq!(full.len(), 3);
        assert_eq!(full.objects[2].tag, Tag::INFO);
        assert_eq!(full.objects[2].name(), "GrabberInfo");
        assert_eq!(full.objects[2].bytes(), Some(INFO_BODY));

        let some = read(DatafileWriter::new(&registry, settings(0, 1), &[]).write(&sample(), &info, b"").unwrap());
        assert_eq!(some.len(), 2);
        assert_eq!(some.objects[0].name(), "LEAF");
        assert_eq!(some.objects[0].property(Tag::ORIG), "");
        assert_eq!(some.objects[0].property(Tag::clean("AUTH")), "me");

        let none = read(DatafileWriter::new(&registry, settings(0, 2), &[Tag::NAME]).write(&sample(), &info, b"").unwrap());
        assert_eq!(none.objects[0].properties.len(), 1);
        assert_eq!(none.find("SUB/CHILD").unwrap().properties.len(), 1);
    }

    #[test]
    fn test_file_chunks_never_compressed() {
        let registry = CodecRegistry::default();
        let image = DatafileWriter::new(&registry, settings(1, 2), &[])
            .write(&sample(), &Properties::new(), b"")
            .unwrap();
        let payload = crate::packfile::unseal(&image, b"").unwrap();

        // magic, count, then LEAF: type and a compressed chunk header
        let leaf_size = i32::from_be_bytes([payload[16], payload[17], payload[18], payload[19]]);
        assert_eq!(leaf_size, -64);
        let disk = u32::from_be_bytes([payload[12], payload[13], payload[14], payload[15]]) as usize;
        let sub = 20 + disk;
        assert_eq!(&payload[sub..sub + 4], b"FILE");
        let sub_size = i32::from_be_bytes([
            payload[sub + 8],
            payload[sub + 9],
            payload[sub + 10],
            payload[sub + 11],
        ]);
        assert!(sub_size > 0);

        let archive = DatafileReader::new(&registry).parse(&image, b"").unwrap();
        assert_eq!(archive.find("SUB/CHILD").unwrap().bytes(), Some(&[9u8; 64][..]));
    }
}
