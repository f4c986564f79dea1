use crate::{
    codec::{Codec, ImportRequest, Imported},
    datafile::Session,
    error::Error,
    object::{Body, DataObject},
    tag::Tag,
};

/// Raw bytes. Handles `DATA` and stands in for every type without a codec
/// of its own.
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn tag(&self) -> Tag {
        Tag::DATA
    }

    fn name(&self) -> &str {
        "Binary data"
    }

    fn construct(&self) -> Result<Body, Error> {
        Ok(Body::Binary(Vec::new()))
    }

    fn describe(&self, object: &DataObject) -> String {
        format!("binary data ({} bytes)", object.size())
    }

    fn grab(&self, request: &ImportRequest, _session: &Session) -> Result<Option<Imported>, Error> {
        if request.tag == Tag::FILE {
            return Ok(None);
        }
        let data = std::fs::read(request.path)?;
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(Imported {
            body: Body::Binary(data),
            palette: None,
        }))
    }
}
