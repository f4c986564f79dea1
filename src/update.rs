//! Refreshing objects whose source files have changed.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::{
    datafile::Session,
    error::Error,
    grab::grab_update,
    object::{Archive, DataObject},
    select::Selector,
    tag::Tag,
    timestamp,
    util::{absolute_path, file_mtime},
};

/// Re-grabs `object` from its `ORIG` file if that file is newer than the
/// object's `DATE`, or unconditionally when `force` is set. Returns whether
/// the object was re-grabbed. Objects without an origin, or whose origin
/// no longer exists, are skipped.
pub fn update_object(
    object: &mut DataObject,
    datafile: &Path,
    force: bool,
    verbose: bool,
    session: &mut Session,
) -> Result<bool, Error> {
    let origin = object.property(Tag::ORIG).to_string();
    if origin.is_empty() {
        info!("{} has no origin data - skipping", object.name());
        return Ok(false);
    }

    let filename: PathBuf = absolute_path(datafile, Path::new(&origin));
    if !filename.exists() {
        warn!("{}: {} not found - skipping", object.name(), origin);
        return Ok(false);
    }

    if !force {
        if let Some(date) = timestamp::parse(object.property(Tag::DATE)) {
            if timestamp::is_up_to_date(file_mtime(&filename)?, date) {
                if verbose {
                    info!("{}: {} has not changed - skipping", object.name(), origin);
                } else {
                    debug!("{}: {} has not changed - skipping", object.name(), origin);
                }
                return Ok(false);
            }
        }
    }

    info!("Updating {} -> {}", origin, object.name());
    grab_update(object, datafile, &filename, session)?;
    Ok(true)
}

/// Updates every object in `archive` that `selector` picks, descending into
/// nested datafiles. Objects are addressed by their `parent/child` path.
/// Nested datafiles themselves are never re-grabbed. Stops at the first
/// failure; objects updated before it keep their new contents.
pub fn update(
    archive: &mut Archive,
    datafile: &Path,
    force: bool,
    verbose: bool,
    selector: &mut Selector,
    session: &mut Session,
) -> Result<bool, Error> {
    update_level(archive, "", datafile, force, verbose, selector, session)
}

fn update_level(
    archive: &mut Archive,
    parent: &str,
    datafile: &Path,
    force: bool,
    verbose: bool,
    selector: &mut Selector,
    session: &mut Session,
) -> Result<bool, Error> {
    let mut changed = false;
    for object in archive.iter_mut() {
        let path = format!("{}{}", parent, object.name());
        if let Some(nested) = object.archive_mut() {
            let prefix = format!("{}/", path);
            changed |= update_level(nested, &prefix, datafile, force, verbose, selector, session)?;
        } else if selector.selects(&path) {
            changed |= update_object(object, datafile, force, verbose, session).map_err(|source| {
                Error::UpdateError {
                    name: path.clone(),
                    source: Box::new(source),
                }
            })?;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{grab::grab_new, grab::GrabParams, object::Body};
    use std::fs;
    use std::time::{Duration, SystemTime};

    fn set_mtime(path: &Path, time: SystemTime) {
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn test_skips_without_origin() {
        let mut session = Session::default();
        let mut object = DataObject::new(Tag::DATA, Body::Binary(vec![1]));
        object.set_property(Tag::NAME, "LOOSE");
        assert!(!update_object(&mut object, Path::new("game.dat"), true, false, &mut session).unwrap());
        assert_eq!(object.bytes(), Some(&[1u8][..]));
    }

    #[test]
    fn test_skips_missing_origin() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::default();
        let mut object = DataObject::new(Tag::DATA, Body::Binary(vec![1]));
        object.set_property(Tag::ORIG, "gone.bin");
        let datafile = dir.path().join("game.dat");
        assert!(!update_object(&mut object, &datafile, true, false, &mut session).unwrap());
    }

    #[test]
    fn test_regrabs_only_when_newer() {
        let dir = tempfile::tempdir().unwrap();
        let datafile = dir.path().join("game.dat");
        let source = dir.path().join("level.bin");
        fs::write(&source, b"v1").unwrap();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_599_999_960);
        set_mtime(&source, base);

        let mut session = Session::default();
        let mut archive = Archive::new();
        let params = GrabParams {
            relative: true,
            ..GrabParams::new(&datafile, &source, "LEVEL")
        };
        grab_new(&mut archive, &params, &mut session).unwrap();
        let mut selector = Selector::default();

        fs::write(&source, b"v2").unwrap();
        set_mtime(&source, base + Duration::from_secs(30));
        assert!(!update(&mut archive, &datafile, false, false, &mut selector, &mut session).unwrap());
        assert_eq!(archive.objects[0].bytes(), Some(&b"v1"[..]));

        set_mtime(&source, base + Duration::from_secs(120));
        assert!(update(&mut archive, &datafile, false, false, &mut selector, &mut session).unwrap());
        assert_eq!(archive.objects[0].bytes(), Some(&b"v2"[..]));
        assert_eq!(archive.objects[0].property(Tag::ORIG), "level.bin");
        assert_eq!(archive.objects[0].name(), "LEVEL");

        assert!(update(&mut archive, &datafile, true, false, &mut selector, &mut session).unwrap());
    }

    #[test]
    fn test_nested_paths_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let datafile = dir.path().join("game.dat");
        let source = dir.path().join("empty.bin");
        fs::write(&source, b"").unwrap();

        let mut inner = Archive::new();
        inner
            .insert("BROKEN", Tag::DATA, Body::Binary(vec![9]))
            .set_property(Tag::ORIG, "empty.bin");
        let mut archive = Archive::new();
        archive.insert("SUB", Tag::FILE, Body::Archive(inner));

        let mut session = Session::default();
        let mut skip = Selector::new(vec!["OTHER".into()]);
        assert!(!update(&mut archive, &datafile, true, false, &mut skip, &mut session).unwrap());

        let mut selector = Selector::new(vec!["SUB/*".into()]);
        let err = update(&mut archive, &datafile, true, false, &mut selector, &mut session).unwrap_err();
        match err {
            Error::UpdateError { name, source } => {
                assert_eq!(name, "SUB/BROKEN");
                assert!(matches!(*source, Error::GrabError { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(selector.unused().count(), 0);
    }
}
