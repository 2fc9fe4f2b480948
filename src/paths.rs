//! Logical path helpers.
//!
//! A logical path is a forward-slash separated path relative to the content root, with no
//! leading slash and no `.`/`..` segments, e.g. `chapter-01/questions/big-o.yml`. Everything
//! past the compiler addresses content by logical path only.
use std::{
    borrow::Cow,
    path::{Component, Path},
};

use crate::error::ContentError;

/// Utility function to replace separators and convert to unicode (via to_string_lossy) on os path.
///
/// Root and prefix components are dropped, so the result never starts with `/`.
pub fn os_path_to_string<P: AsRef<Path>>(os_path_ref: P) -> String {
    let res = os_path_ref
        .as_ref()
        .components()
        .filter_map(|c| match c {
            Component::RootDir | Component::Prefix(_) | Component::CurDir => None,
            _ => Some(c.as_os_str().to_string_lossy()),
        })
        .collect::<Vec<Cow<'_, str>>>()
        .join("/");
    tracing::trace!(
        "os_path_to_string: turned {:?} into {}",
        os_path_ref.as_ref(),
        res
    );
    res
}

/// Derive the logical path of `file` beneath `root`.
pub fn logical_path(root: &Path, file: &Path) -> Result<String, ContentError> {
    let relative = file.strip_prefix(root)?;
    let logical = os_path_to_string(relative);
    if logical.is_empty() {
        return Err(ContentError::NotFound(format!(
            "{file:?} does not name a file beneath {root:?}"
        )));
    }
    Ok(logical)
}

/// Collapse `.` and `..` segments and normalize separators. Returns `None` when the path climbs
/// above the content root.
pub fn normalize(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s => segments.push(s),
        }
    }
    Some(segments.join("/"))
}

/// Directory portion of a logical path; empty for top level files.
pub fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|idx| &path[..idx]).unwrap_or("")
}

pub fn file_name(path: &str) -> &str {
    path.rfind('/').map(|idx| &path[idx + 1..]).unwrap_or(path)
}

/// File name without its final extension. Dot-files keep their full name.
pub fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Final extension of a logical path, without the dot.
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}

/// Resolve `reference` against the directory containing `anchor`.
///
/// References with a leading `/` are taken relative to the content root instead.
pub fn resolve_sibling(anchor: &str, reference: &str) -> Option<String> {
    let joined = if reference.starts_with('/') {
        reference.to_string()
    } else {
        let dir = parent_dir(anchor);
        if dir.is_empty() {
            reference.to_string()
        } else {
            format!("{dir}/{reference}")
        }
    };
    normalize(&joined).filter(|p| !p.is_empty())
}
