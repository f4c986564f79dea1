//! Object type codecs.
//!
//! Each object type is handled by one [`Codec`]: it knows how to validate
//! the archive encoding, import the type from external files, export it
//! back out, and describe it for listings. Types without a registered codec
//! are carried as opaque bytes by the binary fallback.

use std::collections::HashMap;
use std::path::Path;

use crate::{
    datafile::Session,
    error::Error,
    object::{Body, DataObject},
    property::Properties,
    tag::Tag,
};

pub mod binary;
pub mod bitmap;
pub mod bmp;
pub mod datafile;
pub mod palette;

use palette::Palette;

/// What a codec is asked to import.
pub struct ImportRequest<'a> {
    pub path: &'a Path,
    pub tag: Tag,
    /// The properties the new object will carry. Image codecs read their
    /// crop region from here.
    pub properties: &'a Properties,
    pub color_depth: Option<i32>,
}

pub struct Imported {
    pub body: Body,
    /// The palette read from the source file, if it had one.
    pub palette: Option<Palette>,
}

pub trait Codec {
    fn tag(&self) -> Tag;

    /// Human-readable type name.
    fn name(&self) -> &str;

    /// A fresh default object body.
    fn construct(&self) -> Result<Body, Error>;

    /// Turns a chunk read from an archive into a body, rejecting malformed
    /// encodings.
    fn decode(&self, data: Vec<u8>) -> Result<Body, Error> {
        Ok(Body::Binary(data))
    }

    /// The chunk to store for `object`.
    fn encode(&self, object: &DataObject) -> Result<Vec<u8>, Error> {
        object
            .bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::MalformedObject(self.tag(), "not a binary object".into()))
    }

    fn describe(&self, object: &DataObject) -> String {
        format!("{} ({} bytes)", self.name(), object.size())
    }

    /// Lowercase file extensions this codec imports from.
    fn grab_extensions(&self) -> &[&'static str] {
        &[]
    }

    /// Lowercase file extensions this codec exports to. The first one is
    /// the default.
    fn export_extensions(&self) -> &[&'static str] {
        &[]
    }

    /// Properties the grabber maintains for this type.
    fn property_tags(&self) -> &[Tag] {
        &[]
    }

    fn grab(&self, _request: &ImportRequest, _session: &Session) -> Result<Option<Imported>, Error> {
        Ok(None)
    }

    fn export(&self, object: &DataObject, path: &Path, _session: &Session) -> Result<(), Error> {
        std::fs::write(path, self.encode(object)?)?;
        Ok(())
    }

    fn color_depth(&self, _object: &DataObject) -> Option<i32> {
        None
    }

    fn convert_depth(&self, body: Body, _depth: i32, _palette: &Palette) -> Result<Body, Error> {
        Ok(body)
    }
}

fn lists_extension(extensions: &[&str], ext: &str) -> bool {
    !ext.is_empty() && extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
}

/// Codecs keyed by tag. Lookups of unregistered tags fall back to the
/// binary codec, which is always present.
pub struct CodecRegistry {
    codecs: HashMap<Tag, Box<dyn Codec>>,
    order: Vec<Tag>,
    fallback: binary::BinaryCodec,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = CodecRegistry::empty();
        registry.register(Box::new(binary::BinaryCodec));
        registry.register(Box::new(datafile::DatafileCodec));
        registry.register(Box::new(bitmap::BitmapCodec::bitmap()));
        registry.register(Box::new(bitmap::RleCodec));
        registry.register(Box::new(bitmap::BitmapCodec::compiled_sprite()));
        registry.register(Box::new(bitmap::BitmapCodec::mode_x_sprite()));
        registry.register(Box::new(palette::PaletteCodec));
        registry
    }
}

impl CodecRegistry {
    /// A registry with nothing but the binary fallback.
    pub fn empty() -> Self {
        CodecRegistry {
            codecs: HashMap::new(),
            order: Vec::new(),
            fallback: binary::BinaryCodec,
        }
    }

    /// Adds a codec, replacing any previous one for the same tag. A
    /// replacement keeps its original position in the search order.
    pub fn register(&mut self, codec: Box<dyn Codec>) {
        let tag = codec.tag();
        if self.codecs.insert(tag, codec).is_none() {
            self.order.push(tag);
        }
    }

    pub fn is_registered(&self, tag: Tag) -> bool {
        self.codecs.contains_key(&tag)
    }

    pub fn get(&self, tag: Tag) -> &dyn Codec {
        match self.codecs.get(&tag) {
            Some(codec) => codec.as_ref(),
            None => &self.fallback,
        }
    }

    /// Registered codecs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Codec> {
        self.order
            .iter()
            .filter_map(|tag| self.codecs.get(tag))
            .map(|codec| codec.as_ref())
    }

    /// The type implied by a file extension: the first codec that grabs
    /// it, or `DATA`.
    pub fn type_for_extension(&self, ext: &str) -> Tag {
        self.iter()
            .find(|codec| lists_extension(codec.grab_extensions(), ext))
            .map(|codec| codec.tag())
            .unwrap_or(Tag::DATA)
    }

    /// The importer for `tag` given the source extension. A codec that
    /// doesn't list the extension isn't used; the binary importer is.
    pub fn importer(&self, tag: Tag, ext: &str) -> &dyn Codec {
        match self.codecs.get(&tag) {
            Some(codec) if lists_extension(codec.grab_extensions(), ext) => codec.as_ref(),
            _ => &self.fallback,
        }
    }

    pub fn lists_export_extension(&self, tag: Tag, ext: &str) -> bool {
        lists_extension(self.get(tag).export_extensions(), ext)
    }

    /// Tags the grabber maintains itself. Stripping removes these before
    /// any user-defined properties.
    pub fn is_builtin_property(&self, tag: Tag) -> bool {
        tag == Tag::ORIG
            || tag == Tag::DATE
            || self.iter().any(|codec| codec.property_tags().contains(&tag))
    }

    pub fn describe(&self, object: &DataObject) -> String {
        self.get(object.tag).describe(object)
    }
}
