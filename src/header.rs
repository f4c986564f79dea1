//! C header output: one `#define` per object giving its index.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{debug, error, info};

use crate::{datafile::Session, error::Error, object::Archive, tag::Tag, util::pretty_name};

const NAME_COLUMN: usize = 32;

/// Banner lines preceding the definitions. They are ignored when deciding
/// whether an existing header is out of date.
const BANNER_LINES: usize = 4;

/// `asctime` layout, without the trailing newline.
pub(crate) const BANNER_DATE: &str = "%a %b %e %H:%M:%S %Y";

pub(crate) fn producer() -> String {
    format!("dat v{}, {}", env!("CARGO_PKG_VERSION"), std::env::consts::OS)
}

/// Renders the definitions for `archive`. Objects inside nested datafiles
/// are prefixed with their parent's name, and every prefixed level ends
/// with a `COUNT` definition.
pub fn render(archive: &Archive, prefix: &str) -> String {
    let mut out = String::new();
    render_level(&mut out, archive, prefix);
    out
}

fn render_level(out: &mut String, archive: &Archive, prefix: &str) {
    let width = NAME_COLUMN.saturating_sub(prefix.len());
    out.push('\n');

    for (index, object) in archive.iter().enumerate() {
        let _ = writeln!(
            out,
            "#define {}{:<width$} {:<8} /* {} */",
            prefix,
            object.name(),
            index,
            object.tag,
        );
        if let Some(nested) = object.archive() {
            let sub_prefix = format!("{}{}_", prefix, object.name());
            render_level(out, nested, &sub_prefix);
        }
    }

    if !prefix.is_empty() {
        let _ = writeln!(out, "#define {}{:<width$} {}", prefix, "COUNT", archive.len());
    }
    out.push('\n');
}

/// Writes the header for `archive` to `header` (`.h` appended if it has
/// no extension). The prefix defaults to the datafile's `HPRE` setting.
/// Returns false, leaving the file alone, if an existing header differs
/// only in its banner.
pub fn write(
    archive: &Archive,
    datafile: &Path,
    header: &Path,
    prefix: Option<&str>,
    session: &Session,
) -> Result<bool, Error> {
    let mut prefix = prefix.unwrap_or_else(|| session.info.get(Tag::HPRE)).to_string();
    if !prefix.is_empty() && !prefix.ends_with('_') {
        prefix.push('_');
    }

    let path: PathBuf = pretty_name(header, "h", false);
    info!("Writing ID's into {}", path.display());

    let body = render(archive, &prefix);
    let text = format!(
        "/* Allegro datafile object indexes, produced by {} */\n\
         /* Datafile: {} */\n\
         /* Date: {} */\n\
         /* Do not hand edit! */\n{}",
        producer(),
        datafile.display(),
        Local::now().format(BANNER_DATE),
        body,
    );

    if let Ok(existing) = fs::read_to_string(&path) {
        if skip_banner(&existing) == skip_banner(&text) {
            debug!("{} has not changed: no update", path.display());
            return Ok(false);
        }
        debug!("{} has changed: updating", path.display());
    }

    fs::write(&path, text).inspect_err(|_| error!("Error writing {}", path.display()))?;
    Ok(true)
}

fn skip_banner(text: &str) -> &str {
    let mut rest = text;
    for _ in 0..BANNER_LINES {
        match rest.find('\n') {
            Some(end) => rest = &rest[end + 1..],
            None => return "",
        }
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Body;

    fn sample() -> Archive {
        let mut inner = Archive::new();
        inner.insert("TUNE", Tag::MIDI, Body::Binary(vec![]));
        let mut archive = Archive::new();
        archive.insert("HERO", Tag::BITMAP, Body::Binary(vec![]));
        archive.insert("MUSIC", Tag::FILE, Body::Archive(inner));
        archive
    }

    #[test]
    fn test_render_unprefixed() {
        let text = render(&sample(), "");
        let expected = format!(
            "\n#define {:<32} {:<8} /* BMP  */\n#define {:<32} {:<8} /* FILE */\n\n#define MUSIC_{:<26} {:<8} /* MIDI */\n#define MUSIC_{:<26} 1\n\n\n",
            "HERO", 0, "MUSIC", 1, "TUNE", 0, "COUNT"
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_render_prefixed_count() {
        let mut archive = Archive::new();
        archive.insert("A", Tag::DATA, Body::Binary(vec![]));
        let text = render(&archive, "GAME_");
        assert!(text.contains("#define GAME_A"));
        assert!(text.ends_with(&format!("#define GAME_{:<27} 1\n\n", "COUNT")));
    }

    #[test]
    fn test_write_is_conditional() {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("game.h");
        let datafile = dir.path().join("game.dat");
        let mut session = Session::default();
        session.info.set(Tag::HPRE, "GAME");

        let archive = sample();
        assert!(write(&archive, &datafile, &header, None, &session).unwrap());
        let first = fs::read_to_string(&header).unwrap();
        assert!(first.contains("#define GAME_HERO"));
        assert!(first.lines().nth(3).unwrap().contains("Do not hand edit!"));

        assert!(!write(&archive, &datafile, &header, None, &session).unwrap());

        let mut bigger = sample();
        bigger.insert("EXTRA", Tag::DATA, Body::Binary(vec![]));
        assert!(write(&bigger, &datafile, &header, Some("GAME_"), &session).unwrap());
        assert!(fs::read_to_string(&header).unwrap().contains("GAME_EXTRA"));
    }
}
