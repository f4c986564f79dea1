//! Importing objects from external files and exporting them back out.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::{
    codec::{binary::BinaryCodec, palette::Rgb, Codec, CodecRegistry, ImportRequest},
    datafile::Session,
    error::Error,
    object::{Archive, DataObject},
    property::Properties,
    tag::Tag,
    timestamp,
    util::{extension, file_mtime, file_name_part, pretty_name, relative_path},
};

#[derive(Debug, Clone)]
pub struct GrabParams<'a> {
    /// The datafile the object is going into. Relative origins are
    /// expressed against its directory.
    pub datafile: &'a Path,
    pub filename: &'a Path,
    pub name: &'a str,
    /// Forces the object type instead of inferring it from the extension.
    pub tag: Option<Tag>,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub color_depth: Option<i32>,
    pub relative: bool,
}

impl<'a> GrabParams<'a> {
    pub fn new(datafile: &'a Path, filename: &'a Path, name: &'a str) -> Self {
        GrabParams {
            datafile,
            filename,
            name,
            tag: None,
            x: -1,
            y: -1,
            w: -1,
            h: -1,
            color_depth: None,
            relative: false,
        }
    }
}

const IMAGE_TAGS: [Tag; 4] = [Tag::BITMAP, Tag::RLE_SPRITE, Tag::C_SPRITE, Tag::XC_SPRITE];

/// Imports a new object with fresh properties.
pub fn grab(params: &GrabParams, session: &mut Session) -> Result<DataObject, Error> {
    grab_with(params, None, session)
}

/// Imports an object and appends it to `archive`.
pub fn grab_new<'a>(
    archive: &'a mut Archive,
    params: &GrabParams,
    session: &mut Session,
) -> Result<&'a mut DataObject, Error> {
    let object = grab(params, session)?;
    Ok(archive.push(object))
}

/// Re-imports over `object`, discarding its properties. On failure the
/// object is left as it was.
pub fn grab_replace(object: &mut DataObject, params: &GrabParams, session: &mut Session) -> Result<(), Error> {
    *object = grab(params, session)?;
    Ok(())
}

/// Re-imports `object` from `filename`, keeping its type and properties
/// (apart from `DATE`) and its colour depth.
pub fn grab_update(
    object: &mut DataObject,
    datafile: &Path,
    filename: &Path,
    session: &mut Session,
) -> Result<(), Error> {
    let params = GrabParams {
        tag: Some(object.tag),
        ..GrabParams::new(datafile, filename, object.name())
    };
    let mut fresh = grab_with(&params, Some(&object.properties), session)?;

    if IMAGE_TAGS.contains(&object.tag) {
        let codec = session.registry.get(object.tag);
        if let (Some(old_depth), Some(new_depth)) = (codec.color_depth(object), codec.color_depth(&fresh)) {
            if old_depth != new_depth {
                if old_depth == 8 {
                    warn!("Warning: lossy conversion from truecolor to 256 colors!");
                }
                if object.tag != Tag::BITMAP {
                    session.last_read_palette.colors[0] = Rgb::MASK;
                }
                fresh.body = codec.convert_depth(fresh.body, old_depth, &session.last_read_palette)?;
            }
        }
    }

    *object = fresh;
    Ok(())
}

fn fresh_properties(params: &GrabParams, codec: &dyn Codec) -> Properties {
    let mut properties = Properties::new();
    properties.set(Tag::NAME, params.name);
    let origin = if params.relative {
        relative_path(params.datafile, params.filename)
    } else {
        params.filename.to_path_buf()
    };
    properties.set(Tag::ORIG, &origin.to_string_lossy());

    for &tag in codec.property_tags() {
        let value = match tag {
            Tag::XPOS => params.x,
            Tag::YPOS => params.y,
            Tag::XSIZ => params.w,
            Tag::YSIZ => params.h,
            _ => continue,
        };
        properties.set(tag, &value.to_string());
    }
    properties
}

fn grab_with(params: &GrabParams, existing: Option<&Properties>, session: &mut Session) -> Result<DataObject, Error> {
    let ext = extension(params.filename);
    let tag = params
        .tag
        .unwrap_or_else(|| session.registry.type_for_extension(&ext));
    let grab_error = || Error::GrabError {
        path: params.filename.to_path_buf(),
        tag,
    };

    let importer = session.registry.importer(tag, &ext);
    let mut properties = match existing {
        Some(properties) => properties.clone(),
        None => fresh_properties(params, importer),
    };

    let mtime = file_mtime(params.filename).map_err(|err| {
        error!("Error reading {} as type {}: {}", params.filename.display(), tag, err);
        grab_error()
    })?;
    let date = std::time::UNIX_EPOCH + std::time::Duration::from_secs(mtime.max(0) as u64);
    properties.set(Tag::DATE, &timestamp::format(date));

    let request = ImportRequest {
        path: params.filename,
        tag,
        properties: &properties,
        color_depth: params.color_depth,
    };
    let imported = match importer.grab(&request, session) {
        Ok(Some(imported)) => imported,
        Ok(None) => {
            error!("Error reading {} as type {}", params.filename.display(), tag);
            return Err(grab_error());
        }
        Err(err) => {
            error!("Error reading {} as type {}: {}", params.filename.display(), tag, err);
            return Err(grab_error());
        }
    };

    if let Some(palette) = imported.palette {
        session.last_read_palette = palette;
    }
    debug!("grabbed {} as {}", params.filename.display(), tag);

    Ok(DataObject {
        tag,
        body: imported.body,
        properties,
    })
}

/// Works out where `export` writes `object`. The destination defaults to
/// the object's origin; a destination naming a directory gets the origin's
/// file name, or failing that the object name. The type's default export
/// extension is applied unless the destination has an extension already.
pub fn export_name(object: &DataObject, dest: Option<&Path>, registry: &CodecRegistry) -> PathBuf {
    let origin = object.property(Tag::ORIG);
    let mut name = match dest {
        Some(dest) => dest.to_string_lossy().into_owned(),
        None => origin.to_string(),
    };

    if file_name_part(&name).is_empty() {
        if origin.is_empty() {
            name.push_str(object.name());
        } else {
            name.push_str(file_name_part(origin));
        }
    }

    match registry.get(object.tag).export_extensions().first() {
        Some(ext) => {
            let force = dest.map_or(true, |d| d.extension().is_none());
            pretty_name(&name, ext, force)
        }
        None => PathBuf::from(name),
    }
}

/// Exports `object` to its [`export_name`] and returns the path written.
pub fn export(object: &DataObject, dest: Option<&Path>, session: &Session) -> Result<PathBuf, Error> {
    let path = export_name(object, dest, &session.registry);
    info!("Exporting {} -> {}", object.name(), path.display());
    export_to(object, &path, session)?;
    Ok(path)
}

/// Writes `object` to exactly `path`. The type's exporter is used if it
/// handles the extension, otherwise the raw bytes are written. A partial
/// file is removed on failure.
pub fn export_to(object: &DataObject, path: &Path, session: &Session) -> Result<(), Error> {
    let result = if session.registry.lists_export_extension(object.tag, &extension(path)) {
        session.registry.get(object.tag).export(object, path, session)
    } else {
        BinaryCodec.export(object, path, session)
    };

    result.map_err(|source| {
        error!("Error writing {}", path.display());
        let _ = fs::remove_file(path);
        Error::ExportError {
            path: path.to_path_buf(),
            source: Box::new(source),
        }
    })
}
