use std::path::{Component, Path, PathBuf};

use crate::{error::Error, timestamp};

/// Gives `name` the extension `ext` if it has none, or unconditionally
/// when `force` is set.
pub fn pretty_name<P: AsRef<Path>>(name: P, ext: &str, force: bool) -> PathBuf {
    let mut path = name.as_ref().to_path_buf();
    if force || path.extension().is_none() {
        path.set_extension(ext);
    }
    path
}

/// Lowercased extension of `path`, or `""`.
pub fn extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// The part of `path` after its last separator.
pub fn file_name_part(path: &str) -> &str {
    match path.rfind(['/', '\\', ':']) {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Resolves an origin path stored relative to the datafile's directory.
pub fn absolute_path(datafile: &Path, origin: &Path) -> PathBuf {
    if origin.is_absolute() {
        return origin.to_path_buf();
    }
    match datafile.parent() {
        Some(dir) => dir.join(origin),
        None => origin.to_path_buf(),
    }
}

/// Expresses `filename` relative to the directory holding `datafile`,
/// climbing out with `..` where needed. Paths that share no root are
/// returned unchanged.
pub fn relative_path(datafile: &Path, filename: &Path) -> PathBuf {
    let dir: Vec<Component> = datafile
        .parent()
        .map(|p| p.components().filter(|c| *c != Component::CurDir).collect())
        .unwrap_or_default();
    let target: Vec<Component> = filename
        .components()
        .filter(|c| *c != Component::CurDir)
        .collect();

    if datafile.is_absolute() != filename.is_absolute() {
        return filename.to_path_buf();
    }

    let common = dir
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();
    if filename.is_absolute() && common == 0 {
        return filename.to_path_buf();
    }

    let mut out = PathBuf::new();
    for _ in common..dir.len() {
        out.push("..");
    }
    for component in &target[common..] {
        out.push(component.as_os_str());
    }
    out
}

/// Modification time of `path` in Unix seconds.
pub fn file_mtime(path: &Path) -> Result<i64, Error> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(timestamp::unix_seconds(modified))
}

/// Forward slashes only, for paths written into makefiles and properties.
pub fn slashes(path: &str) -> String {
    path.replace('\\', "/")
}
