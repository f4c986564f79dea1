//! Makefile dependency rules listing the files a datafile was built from.

use std::fs;
use std::path::Path;

use chrono::Local;
use log::{error, info};

use crate::{
    error::Error,
    header::{producer, BANNER_DATE},
    object::Archive,
    tag::Tag,
    util::{pretty_name, slashes},
};

const WRAP_COLUMN: usize = 56;

/// Every distinct `ORIG` value in `archive`, depth-first, in order of
/// first appearance.
pub fn origins(archive: &Archive) -> Vec<String> {
    let mut out = Vec::new();
    collect(archive, &mut out);
    out
}

fn collect(archive: &Archive, out: &mut Vec<String>) {
    for object in archive.iter() {
        let origin = object.property(Tag::ORIG);
        if !origin.is_empty() && !out.iter().any(|seen| seen == origin) {
            out.push(origin.to_string());
        }
        if let Some(nested) = object.archive() {
            collect(nested, out);
        }
    }
}

/// The rule itself, without the banner.
pub fn render(archive: &Archive, datafile: &Path, header: Option<&Path>, password: Option<&str>) -> String {
    let target = pretty_name(datafile, "dat", false);
    let target = target.display();

    let mut out = match header {
        Some(header) => format!("{} {} :", target, header.display()),
        None => format!("{} :", target),
    };

    // Forces the first dependency onto its own line.
    let mut column = 0xFF;
    for origin in origins(archive) {
        if column + origin.len() > WRAP_COLUMN {
            out.push_str(" \\\n\t\t");
            column = 0;
        } else {
            out.push(' ');
            column += 1;
        }

        let origin = slashes(&origin);
        if origin.contains(' ') {
            out.push('"');
            out.push_str(&origin);
            out.push('"');
            column += 2;
        } else {
            out.push_str(&origin);
        }
        column += origin.len();
    }

    out.push_str(&format!(" \\\n\n\tdat -u {}", target));
    if let Some(header) = header {
        out.push_str(&format!(" -h {}", header.display()));
    }
    if let Some(password) = password {
        out.push_str(&format!(" -007 {}", password));
    }
    out.push('\n');
    out
}

pub fn write(
    archive: &Archive,
    datafile: &Path,
    depfile: &Path,
    header: Option<&Path>,
    password: Option<&str>,
) -> Result<(), Error> {
    info!("Writing makefile dependencies into {}", depfile.display());
    let text = format!(
        "# Allegro datafile make dependencies, produced by {}\n\
         # Datafile: {}\n\
         # Date: {}\n\
         # Do not hand edit!\n\n{}",
        producer(),
        pretty_name(datafile, "dat", false).display(),
        Local::now().format(BANNER_DATE),
        render(archive, datafile, header, password),
    );
    fs::write(depfile, text).inspect_err(|_| error!("Error writing {}", depfile.display()))?;
    Ok(())
}
