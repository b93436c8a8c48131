//! Gathering access transforms from patch headers and inline source markers.

use crate::at::codec::{self, AccessTransform};
use crate::at::errors::{AtError, AtIoError};
use crate::at::set::{AccessTransformSet, MemberKey};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Prefix of a directive line in a patch header.
pub const HEADER_PREFIX: &str = "AT: ";
/// Any line starting with this ends the header block.
pub const SEPARATOR_PREFIX: &str = "====";
/// Separator written after rebuilt headers.
pub const HEADER_SEPARATOR: &str =
    "===================================================================";
/// Marker for one-shot directives written as source comments.
pub const INLINE_MARKER: &str = "// Paper-AT: ";

/// A single `<token> [<member>]` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub at: AccessTransform,
    /// `None` targets the class declaration itself
    pub member: Option<MemberKey>,
}

/// A directive that could not be used, with its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectIssue {
    pub path: PathBuf,
    pub line: usize,
    pub error: AtError,
}

/// Result of a collection run: the merged set plus every rejected directive.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub set: AccessTransformSet,
    pub issues: Vec<CollectIssue>,
}

pub fn parse_directive(text: &str) -> Result<Directive, AtError> {
    let mut parts = text.split_whitespace();
    let token = parts.next().unwrap_or("");
    let at = codec::parse(token)?;
    if at.is_empty() {
        return Err(AtError::MalformedToken {
            token: token.to_string(),
        });
    }
    Ok(Directive {
        at,
        member: parts.next().map(MemberKey::parse),
    })
}

/// Dotted class name for a source or patch path relative to its root.
///
/// `net/minecraft/Foo.java.patch` and `net/minecraft/Foo.java` both map to
/// `net.minecraft.Foo`.
pub fn class_name_for(relative: &Path) -> String {
    let mut segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if let Some(last) = segments.last_mut() {
        let name = last.strip_suffix(".patch").unwrap_or(last);
        let stem = match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        };
        *last = stem.to_string();
    }
    segments.join(".")
}

/// Split patch text into its AT header block and the diff body.
///
/// The header only exists when a separator line appears before the first
/// `--- ` line; otherwise the whole text is body.
pub fn split_header(text: &str) -> (&str, &str) {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.starts_with("--- ") || line.starts_with("@@") {
            break;
        }
        offset += line.len();
        if line.starts_with(SEPARATOR_PREFIX) {
            return text.split_at(offset);
        }
    }
    ("", text)
}

/// Directives from the header of one patch, with 1-based line numbers.
pub fn parse_header(text: &str) -> Vec<(usize, Result<Directive, AtError>)> {
    let mut directives = Vec::new();
    for (idx, line) in text.split('\n').enumerate() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(SEPARATOR_PREFIX) || line.starts_with("--- ") || line.starts_with("@@")
        {
            break;
        }
        if let Some(rest) = line.strip_prefix(HEADER_PREFIX) {
            directives.push((idx + 1, parse_directive(rest)));
        }
    }
    directives
}

/// Collect header directives from every `.patch` file under `patch_root`.
pub fn collect_from_patches(patch_root: &Path) -> Result<Collection, AtIoError> {
    let mut collection = Collection::default();
    if !patch_root.exists() {
        return Ok(collection);
    }

    let mut patches = Vec::new();
    for entry in WalkDir::new(patch_root) {
        let entry = entry.map_err(|source| AtIoError::Walk {
            path: patch_root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && entry.path().to_string_lossy().ends_with(".patch") {
            patches.push(entry.into_path());
        }
    }
    patches.sort();

    for patch in patches {
        let text = fs::read_to_string(&patch).map_err(|source| AtIoError::Io {
            path: patch.clone(),
            source,
        })?;
        let relative = patch.strip_prefix(patch_root).unwrap_or(&patch);
        let class = class_name_for(relative);
        for (line, directive) in parse_header(&text) {
            let outcome =
                directive.and_then(|d| collection.set.merge(&class, d.member, d.at));
            if let Err(error) = outcome {
                warn!(patch = %patch.display(), line, %error, "skipping access transform");
                collection.issues.push(CollectIssue {
                    path: patch.clone(),
                    line,
                    error,
                });
            }
        }
    }

    debug!(entries = collection.set.len(), "collected access transforms from patch headers");
    Ok(collection)
}

/// Source text with inline markers removed, plus the rejected directives.
#[derive(Debug, Clone, Default)]
pub struct InlineExtraction {
    pub text: String,
    pub found: usize,
    pub issues: Vec<(usize, AtError)>,
}

/// Strip every inline marker from `source`, merging its directive into `set`
/// under `class`.
///
/// A line that holds nothing but the marker comment is dropped; otherwise the
/// code before the marker is kept with trailing whitespace trimmed.
pub fn extract_inline(source: &str, class: &str, set: &mut AccessTransformSet) -> InlineExtraction {
    let mut out = InlineExtraction::default();
    let mut kept: Vec<String> = Vec::new();

    for (idx, line) in source.split('\n').enumerate() {
        let Some(pos) = line.find(INLINE_MARKER) else {
            kept.push(line.to_string());
            continue;
        };
        out.found += 1;

        let directive = &line[pos + INLINE_MARKER.len()..];
        if let Err(error) =
            parse_directive(directive).and_then(|d| set.merge(class, d.member, d.at))
        {
            out.issues.push((idx + 1, error));
        }

        let prefix = line[..pos].trim_end();
        if !prefix.is_empty() {
            let eol = if line.ends_with('\r') { "\r" } else { "" };
            kept.push(format!("{prefix}{eol}"));
        }
    }

    out.text = kept.join("\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::at::codec::parse;

    #[test]
    fn class_names_from_paths() {
        assert_eq!(
            class_name_for(Path::new("net/minecraft/Foo.java.patch")),
            "net.minecraft.Foo"
        );
        assert_eq!(class_name_for(Path::new("net/minecraft/Foo.java")), "net.minecraft.Foo");
        assert_eq!(class_name_for(Path::new("Bar.patch")), "Bar");
    }

    #[test]
    fn split_header_only_when_separator_precedes_diff() {
        let text = format!("AT: public m()V\n{HEADER_SEPARATOR}\n--- a/A.java\n+++ b/A.java\n");
        let (header, body) = split_header(&text);
        assert!(header.starts_with("AT: public"));
        assert!(body.starts_with("--- a/A.java"));

        let plain = "--- a/A.java\n+++ b/A.java\n@@ -1 +1 @@\n-====\n+x\n";
        assert_eq!(split_header(plain), ("", plain));
    }

    #[test]
    fn header_parsing_continues_after_malformed_token() {
        let text = format!("AT: pub m()V\nAT: public-f count\n{HEADER_SEPARATOR}\nAT: public ignored\n");
        let parsed = parse_header(&text);
        assert_eq!(parsed.len(), 2);
        assert!(matches!(parsed[0], (1, Err(AtError::MalformedToken { .. }))));
        let (line, ok) = &parsed[1];
        assert_eq!(*line, 2);
        assert_eq!(
            ok.as_ref().unwrap(),
            &Directive {
                at: parse("public-f").unwrap(),
                member: Some(MemberKey::Field("count".into()))
            }
        );
    }

    #[test]
    fn collects_from_patch_tree() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("net/minecraft");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            nested.join("Foo.java.patch"),
            format!("AT: public m()V\nAT: pub x\nAT: protected\n{HEADER_SEPARATOR}\n--- a/x\n+++ b/x\n"),
        )
        .unwrap();
        fs::write(nested.join("Bar.java.patch"), "--- a/x\n+++ b/x\n").unwrap();
        fs::write(nested.join("notes.txt"), "AT: public q").unwrap();

        let collection = collect_from_patches(dir.path()).unwrap();
        assert_eq!(collection.set.len(), 2);
        assert_eq!(
            collection
                .set
                .get("net.minecraft.Foo", Some(&MemberKey::parse("m()V"))),
            Some(&parse("public").unwrap())
        );
        assert_eq!(
            collection.set.get("net.minecraft.Foo", None),
            Some(&parse("protected").unwrap())
        );
        assert_eq!(collection.issues.len(), 1);
        assert_eq!(collection.issues[0].line, 2);
    }

    #[test]
    fn inline_extraction_strips_every_marker() {
        let source = "class A {\n    public void m() {} // Paper-AT: public m()V\n    // Paper-AT: pub x\n    int x;\r\n    // Paper-AT: public-f y\r\n}\n";
        let mut set = AccessTransformSet::new();
        let out = extract_inline(source, "A", &mut set);

        assert_eq!(out.found, 3);
        assert!(!out.text.contains("Paper-AT"));
        assert_eq!(out.text, "class A {\n    public void m() {}\n    int x;\r\n}\n");
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].0, 3);
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.get("A", Some(&MemberKey::parse("y"))),
            Some(&parse("public-f").unwrap())
        );
    }
}
