//! Loading and saving whole datafiles.
//!
//! The on-disk settings record (the `info` object) never shows up in an
//! [`Archive`] handed to callers: [`load`] moves its properties into
//! [`Session::info`] and [`save`] writes them back out.

use std::fs;
use std::path::Path;

use log::{error, info};

use crate::{
    codec::{palette::Palette, CodecRegistry},
    error::Error,
    object::Archive,
    property::{parse_leading_int, Properties},
    tag::Tag,
    util::pretty_name,
};

pub mod reader;
pub mod writer;

use reader::DatafileReader;
use writer::DatafileWriter;

/// Everything the engine needs besides the archive itself.
pub struct Session {
    pub registry: CodecRegistry,
    /// Archive-wide settings read from the last loaded datafile.
    pub info: Properties,
    pub password: Option<String>,
    /// Palette used when reducing to 8 bits and exporting 8-bit images.
    pub palette: Palette,
    /// Palette of the most recently imported image.
    pub last_read_palette: Palette,
}

impl Default for Session {
    fn default() -> Self {
        Session::new(CodecRegistry::default())
    }
}

impl Session {
    pub fn new(registry: CodecRegistry) -> Self {
        Session {
            registry,
            info: Properties::new(),
            password: None,
            palette: Palette::default(),
            last_read_palette: Palette::default(),
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn password(&self) -> &[u8] {
        self.password.as_deref().map(str::as_bytes).unwrap_or_default()
    }
}

/// Save options as given by the caller. `None` defers to the settings
/// record, and explicit pack and sort values are stored there.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
    pub pack: Option<u8>,
    pub strip: Option<u8>,
    pub sort: Option<bool>,
    pub verbose: bool,
    pub backup: Option<bool>,
}

/// Fully resolved save options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveSettings {
    pub pack: u8,
    pub strip: u8,
    pub sort: bool,
    pub verbose: bool,
    pub backup: bool,
}

impl SaveOptions {
    /// Stores the explicitly given pack level and sort flag in `info`.
    pub fn record(&self, info: &mut Properties) {
        if let Some(pack) = self.pack {
            info.set(Tag::PACK, &pack.to_string());
        }
        if let Some(sort) = self.sort {
            info.set(Tag::SORT, if sort { "y" } else { "n" });
        }
    }

    pub fn settings(&self, info: &Properties) -> SaveSettings {
        let pack = self.pack.unwrap_or_else(|| {
            parse_leading_int(info.get(Tag::PACK))
                .map(|p| p.clamp(0, 2) as u8)
                .unwrap_or(0)
        });
        let sort = self.sort.unwrap_or_else(|| match info.get(Tag::SORT).chars().next() {
            Some(c) => c.eq_ignore_ascii_case(&'y'),
            None => true,
        });
        let backup = self.backup.unwrap_or_else(|| {
            info.get(Tag::BACK)
                .chars()
                .next()
                .is_some_and(|c| c.eq_ignore_ascii_case(&'y'))
        });
        SaveSettings {
            pack,
            strip: self.strip.unwrap_or(0),
            sort,
            verbose: self.verbose,
            backup,
        }
    }
}

/// Loads `path`, appending `.dat` if it has no extension. A missing file
/// gives an empty archive. Names missing from the file are recovered from
/// the matching `.h` header or generated.
pub fn load(path: &Path, session: &mut Session) -> Result<Archive, Error> {
    let pretty = pretty_name(path, "dat", false);
    session.info = Properties::new();

    let mut archive = if pretty.exists() {
        info!("Reading {}", pretty.display());
        let image = fs::read(&pretty)?;
        let mut archive = load_from_bytes(&image, session.password(), &session.registry)
            .inspect_err(|_| error!("Error reading {}", pretty.display()))?;
        name_objects(&mut archive, &pretty_name(path, "h", true));
        archive
    } else {
        info!("{} not found: creating new datafile", pretty.display());
        Archive::new()
    };

    extract_info(&mut archive, Some(&mut session.info));
    Ok(archive)
}

/// Parses a file image without any of the naming or settings handling
/// [`load`] does.
pub fn load_from_bytes(image: &[u8], password: &[u8], registry: &CodecRegistry) -> Result<Archive, Error> {
    DatafileReader::new(registry).parse(image, password)
}

/// Loads a datafile as the body of a nested `FILE` object. Its settings
/// record is dropped.
pub(crate) fn load_nested(path: &Path, session: &Session) -> Result<Archive, Error> {
    let image = fs::read(path)?;
    let mut archive = load_from_bytes(&image, session.password(), &session.registry)?;
    name_objects(&mut archive, &pretty_name(path, "h", true));
    extract_info(&mut archive, None);
    Ok(archive)
}

fn name_objects(archive: &mut Archive, header: &Path) {
    load_header_names(archive, header);
    archive.generate_names(0);
}

/// Names unnamed top-level objects from `#define NAME index` lines.
fn load_header_names(archive: &mut Archive, header: &Path) {
    let Ok(text) = fs::read_to_string(header) else {
        return;
    };
    for line in text.lines() {
        let Some(rest) = line.strip_prefix("#define ") else {
            continue;
        };
        let (name, value) = rest.split_once(' ').unwrap_or((rest, ""));
        let digits: String = value
            .trim_start_matches(' ')
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        let index = digits.parse::<usize>().unwrap_or(0);
        if let Some(object) = archive.get_mut(index) {
            if object.name().is_empty() {
                object.set_property(Tag::NAME, name);
            }
        }
    }
}

/// Removes top-level settings objects, merging their properties into
/// `info` if given.
fn extract_info(archive: &mut Archive, mut info: Option<&mut Properties>) {
    archive.objects.retain(|object| {
        if object.tag != Tag::INFO {
            return true;
        }
        if let Some(info) = info.as_deref_mut() {
            for property in object.properties.iter() {
                info.set(property.tag, &property.value);
            }
        }
        false
    });
}

/// Saves `archive` to `path` (`.dat` appended if there is no extension).
/// Sorting, when enabled, reorders the archive in place. The previous file
/// is kept as `.bak` only if backups are enabled.
pub fn save(
    archive: &mut Archive,
    path: &Path,
    options: &SaveOptions,
    fixed_props: &[Tag],
    session: &mut Session,
) -> Result<(), Error> {
    options.record(&mut session.info);
    let settings = options.settings(&session.info);
    if settings.sort {
        archive.sort();
    }
    archive.sort_properties();

    info!("Writing {}", pretty_name(path, "dat", false).display());
    write_file(archive, path, settings, fixed_props, session)
}

/// Serializes `archive` with the session's settings record and password.
pub fn save_to_bytes(
    archive: &Archive,
    settings: SaveSettings,
    fixed_props: &[Tag],
    session: &Session,
) -> Result<Vec<u8>, Error> {
    DatafileWriter::new(&session.registry, settings, fixed_props).write(
        archive,
        &session.info,
        session.password(),
    )
}

pub(crate) fn write_file(
    archive: &Archive,
    path: &Path,
    settings: SaveSettings,
    fixed_props: &[Tag],
    session: &Session,
) -> Result<(), Error> {
    let pretty = pretty_name(path, "dat", false);
    let backup = pretty_name(path, "bak", true);
    let image = save_to_bytes(archive, settings, fixed_props, session)?;

    if backup.exists() {
        fs::remove_file(&backup)?;
    }
    if pretty.exists() {
        fs::rename(&pretty, &backup)?;
    }

    if let Err(err) = fs::write(&pretty, &image) {
        error!("Error writing {}", pretty.display());
        let _ = fs::remove_file(&pretty);
        return Err(err.into());
    }

    if !settings.backup && backup.exists() {
        fs::remove_file(&backup)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Body;

    #[test]
    fn test_save_options_fall_back_to_info() {
        let mut info = Properties::new();
        let settings = SaveOptions::default().settings(&info);
        assert_eq!((settings.pack, settings.strip, settings.sort, settings.backup), (0, 0, true, false));

        let explicit = SaveOptions {
            pack: Some(2),
            sort: Some(false),
            ..SaveOptions::default()
        };
        explicit.record(&mut info);
        assert_eq!(info.get(Tag::PACK), "2");
        assert_eq!(info.get(Tag::SORT), "n");

        let settings = SaveOptions::default().settings(&info);
        assert_eq!(settings.pack, 2);
        assert!(!settings.sort);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::default();
        session.info.set(Tag::PACK, "1");
        let archive = load(&dir.path().join("nothing"), &mut session).unwrap();
        assert!(archive.is_empty());
        assert!(session.info.is_empty());
    }

    #[test]
    fn test_save_and_load_moves_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.dat");
        let mut session = Session::default();
        session.info.set(Tag::HPRE, "GAME");

        let mut archive = Archive::new();
        archive.insert("B", Tag::DATA, Body::Binary(vec![2]));
        archive.insert("A", Tag::DATA, Body::Binary(vec![1]));
        save(&mut archive, &path, &SaveOptions::default(), &[], &mut session).unwrap();
        assert_eq!(archive.objects[0].name(), "A");

        let mut fresh = Session::default();
        let loaded = load(&path, &mut fresh).unwrap();
        assert_eq!(loaded, archive);
        assert_eq!(fresh.info.get(Tag::HPRE), "GAME");
        assert_eq!(fresh.info.get(Tag::NAME), "GrabberInfo");
        assert!(!dir.path().join("game.bak").exists());
    }

    #[test]
    fn test_backup_kept_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game");
        let mut session = Session::default();
        let mut archive = Archive::new();
        archive.insert("A", Tag::DATA, Body::Binary(vec![1]));
        let options = SaveOptions {
            backup: Some(true),
            ..SaveOptions::default()
        };
        save(&mut archive, &path, &options, &[], &mut session).unwrap();
        save(&mut archive, &path, &options, &[], &mut session).unwrap();
        assert!(dir.path().join("game.dat").exists());
        assert!(dir.path().join("game.bak").exists());
    }

    #[test]
    fn test_header_names_fill_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pics.dat");
        let mut session = Session::default();

        let mut archive = Archive::new();
        archive.insert("FIRST", Tag::DATA, Body::Binary(vec![1]));
        archive.insert("SECOND", Tag::DATA, Body::Binary(vec![2]));
        archive.insert("THIRD", Tag::PALETTE, Body::Binary(Palette::default().encode()));
        let options = SaveOptions {
            strip: Some(2),
            sort: Some(false),
            ..SaveOptions::default()
        };
        save(&mut archive, &path, &options, &[], &mut session).unwrap();
        fs::write(
            dir.path().join("pics.h"),
            "/* header */\n#define FIRST                  0        /* DATA */\n#define SECOND 1\n",
        )
        .unwrap();

        let loaded = load(&path, &mut session).unwrap();
        let names: Vec<&str> = loaded.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["FIRST", "SECOND", "000_PAL"]);
    }
}
