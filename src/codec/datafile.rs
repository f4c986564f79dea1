use std::path::Path;

use crate::{
    codec::{Codec, ImportRequest, Imported},
    datafile::{load_nested, write_file, SaveOptions, Session},
    error::Error,
    object::{Archive, Body, DataObject},
    tag::Tag,
};

/// Nested datafiles. The engine reads and writes `FILE` bodies itself;
/// this codec covers construction, import and export.
pub struct DatafileCodec;

impl DatafileCodec {
    fn archive_of(object: &DataObject) -> Result<&Archive, Error> {
        object
            .archive()
            .ok_or_else(|| Error::MalformedObject(Tag::FILE, "not a nested datafile".into()))
    }
}

impl Codec for DatafileCodec {
    fn tag(&self) -> Tag {
        Tag::FILE
    }

    fn name(&self) -> &str {
        "Datafile"
    }

    fn construct(&self) -> Result<Body, Error> {
        Ok(Body::Archive(Archive::new()))
    }

    fn describe(&self, object: &DataObject) -> String {
        match object.archive() {
            Some(archive) => format!("datafile ({} objects)", archive.len()),
            None => "datafile (invalid)".to_string(),
        }
    }

    fn grab_extensions(&self) -> &[&'static str] {
        &["dat"]
    }

    fn export_extensions(&self) -> &[&'static str] {
        &["dat"]
    }

    fn grab(&self, request: &ImportRequest, session: &Session) -> Result<Option<Imported>, Error> {
        let archive = load_nested(request.path, session)?;
        Ok(Some(Imported {
            body: Body::Archive(archive),
            palette: None,
        }))
    }

    /// Saves the nested archive as a standalone datafile, using the
    /// session's settings record but never keeping a backup.
    fn export(&self, object: &DataObject, path: &Path, session: &Session) -> Result<(), Error> {
        let options = SaveOptions {
            backup: Some(false),
            ..SaveOptions::default()
        };
        let settings = options.settings(&session.info);

        let mut archive = Self::archive_of(object)?.clone();
        if settings.sort {
            archive.sort();
        }
        archive.sort_properties();
        write_file(&archive, path, settings, &[], session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{datafile::load, property::Properties};

    #[test]
    fn test_export_then_grab() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inner.dat");
        let session = Session::default();

        let mut inner = Archive::new();
        inner.insert("ZED", Tag::DATA, Body::Binary(vec![1, 2]));
        inner.insert("ALPHA", Tag::DATA, Body::Binary(vec![3]));
        let mut object = DataObject::new(Tag::FILE, Body::Archive(inner));
        object.set_property(Tag::NAME, "INNER");

        DatafileCodec.export(&object, &path, &session).unwrap();

        let props = Properties::new();
        let request = ImportRequest {
            path: &path,
            tag: Tag::FILE,
            properties: &props,
            color_depth: None,
        };
        let imported = DatafileCodec.grab(&request, &session).unwrap().unwrap();
        let Body::Archive(archive) = imported.body else {
            panic!("expected a nested archive");
        };
        let names: Vec<&str> = archive.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["ALPHA", "ZED"]);

        let mut other = Session::default();
        assert_eq!(load(&path, &mut other).unwrap(), archive);
    }

    #[test]
    fn test_describe() {
        let mut archive = Archive::new();
        archive.insert("A", Tag::DATA, Body::Binary(vec![]));
        let object = DataObject::new(Tag::FILE, Body::Archive(archive));
        assert_eq!(DatafileCodec.describe(&object), "datafile (1 objects)");
    }
}
