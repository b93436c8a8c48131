//! Canonical on-disk AT table.
//!
//! One entry per line, `<token> <fully.qualified.Class>[ <member>]`, sorted by
//! class then member. `#` starts a comment.

use crate::at::codec;
use crate::at::errors::{AtError, AtIoError};
use crate::at::set::{AccessTransformSet, MemberKey};
use std::fs;
use std::path::Path;

/// Render a set as table text.
pub fn to_table_string(set: &AccessTransformSet) -> String {
    let mut out = String::new();
    for (class, transforms) in set.classes() {
        for (member, at) in transforms.entries() {
            out.push_str(&codec::format(at));
            out.push(' ');
            out.push_str(class);
            if let Some(member) = member {
                out.push(' ');
                out.push_str(&member.to_string());
            }
            out.push('\n');
        }
    }
    out
}

/// Parse table text. Fails on the first malformed or conflicting line.
pub fn from_table_str(input: &str) -> Result<AccessTransformSet, AtError> {
    let mut set = AccessTransformSet::new();
    for (idx, raw) in input.split('\n').enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(AtError::MalformedLine {
                line: idx + 1,
                text: raw.to_string(),
            });
        }
        let at = codec::parse(parts[0])?;
        let member = parts.get(2).map(|m| MemberKey::parse(m));
        set.merge(parts[1], member, at)?;
    }
    Ok(set)
}

pub fn read_table(path: &Path) -> Result<AccessTransformSet, AtIoError> {
    let text = fs::read_to_string(path).map_err(|source| AtIoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_table_str(&text).map_err(|source| AtIoError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_table(path: &Path, set: &AccessTransformSet) -> Result<(), AtIoError> {
    let io = |source| AtIoError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io)?;
    }
    fs::write(path, to_table_string(set)).map_err(io)
}
