use crate::error::{Error, Result};
use std::path::{Component, Path};

/// Derive the store key for `path`: its location relative to `base_dir`,
/// with `/` separators.
///
/// The key must stay under `base_dir`: absolute results and `..`
/// components are rejected. Without a base directory the path itself
/// (minus any leading `/`) is the key.
pub fn relative_key(path: &Path, base_dir: Option<&Path>) -> Result<String> {
    let rel = match base_dir {
        Some(base) => pathdiff::diff_paths(path, base).ok_or_else(|| {
            Error::InvalidPath(format!("{:?} is not relative to {:?}", path, base))
        })?,
        None => path.to_path_buf(),
    };
    let mut parts: Vec<String> = Vec::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir => {
                return Err(Error::InvalidPath(format!("{:?} escapes the base directory", path)))
            }
            Component::Prefix(_) => {
                return Err(Error::InvalidPath(format!("prefix not allowed: {:?}", path)))
            }
        }
    }
    if parts.is_empty() {
        return Err(Error::InvalidPath(format!("empty key for {:?}", path)));
    }
    Ok(parts.join("/"))
}
