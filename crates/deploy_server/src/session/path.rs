//! Virtual path handling.
//!
//! Clients see a tree rooted at `/`. Every virtual path is normalised before
//! it touches the filesystem, and `..` at the root stays at the root.

use std::path::{Path, PathBuf};

/// Resolves `requested` against `cwd` into a normalised absolute virtual path.
///
/// Both `/` and `\` separate components. An empty request resolves to `cwd`.
pub fn normalize(cwd: &str, requested: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    let absolute = requested.starts_with('/') || requested.starts_with('\\');
    if !absolute {
        push_components(&mut parts, cwd);
    }
    push_components(&mut parts, requested);

    if parts.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for part in parts {
        out.push('/');
        out.push_str(part);
    }
    out
}

fn push_components<'a>(parts: &mut Vec<&'a str>, path: &'a str) {
    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
}

/// Maps a normalised virtual path onto the physical tree under `root`.
pub fn to_physical(root: &Path, virtual_path: &str) -> PathBuf {
    let relative = virtual_path.trim_start_matches('/');
    if relative.is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

/// Final component of a virtual path, `None` for the root.
pub fn file_name(virtual_path: &str) -> Option<&str> {
    virtual_path.rsplit('/').next().filter(|name| !name.is_empty())
}
