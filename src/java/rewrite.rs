//! Syntax-aware application of access transforms to Java sources.
//!
//! Each transform is resolved to one declaration, then compiled into byte
//! span [`Edit`]s over its modifier list. Sources that fail to parse cleanly
//! are still rewritten on a best-effort basis; tree-sitter recovers around
//! errors and only the affected declarations go missing.

use crate::at::{AccessTransform, AccessTransformSet, Finality, MemberKey, MethodDescriptor, Visibility};
use crate::edit::{self, Edit};
use crate::java::errors::{RewriteError, RewriteIssue};
use crate::java::locator::{find_field, find_methods, find_types, TypeMatch};
use crate::java::parser::{children, error_count, named_children, parse_java, text};
use crate::java::resolve::TypeResolver;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tree_sitter::Node;

/// Outcome of rewriting one source file. Nothing is written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRewrite {
    /// Path relative to the tree root
    pub path: PathBuf,
    pub original: String,
    pub rewritten: String,
    /// Declarations whose modifiers were changed
    pub applied: usize,
    pub issues: Vec<RewriteIssue>,
}

impl FileRewrite {
    pub fn changed(&self) -> bool {
        self.original != self.rewritten
    }
}

/// Summary of an in-place rewrite over a whole tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeRewrite {
    pub files_changed: usize,
    pub applied: usize,
    pub issues: Vec<RewriteIssue>,
}

/// Relative path of the compilation unit declaring `class` (`a.b.C$D` -> `a/b/C.java`).
pub fn source_path_for_class(class: &str) -> PathBuf {
    let outer = class.split('$').next().unwrap_or(class);
    PathBuf::from(format!("{}.java", outer.replace('.', "/")))
}

#[derive(Debug, Clone, Default)]
pub struct StructuralRewriter {
    classpath: Vec<PathBuf>,
}

impl StructuralRewriter {
    /// `classpath` lists extra source roots consulted when resolving
    /// parameter types; the tree being rewritten is always consulted first.
    pub fn new(classpath: Vec<PathBuf>) -> Self {
        Self { classpath }
    }

    /// Rewrite each of `files` (relative to `root`) that declares a class in `ats`.
    ///
    /// Files declaring none of the transformed classes produce no result.
    pub fn rewrite_files(
        &self,
        root: &Path,
        files: &[PathBuf],
        ats: &AccessTransformSet,
    ) -> Result<Vec<FileRewrite>, RewriteError> {
        let by_file = group_by_file(ats);
        let mut results = Vec::new();
        for relative in files {
            let Some(classes) = by_file.get(relative) else {
                continue;
            };
            let path = root.join(relative);
            let source = fs::read_to_string(&path).map_err(|source| RewriteError::Io {
                path: path.clone(),
                source,
            })?;
            results.push(self.rewrite_classes(root, relative, &source, ats, classes)?);
        }
        Ok(results)
    }

    /// Rewrite `source` (the file at `relative` under `root`) for every class in `ats`
    /// that it declares.
    pub fn rewrite_source(
        &self,
        root: &Path,
        relative: &Path,
        source: &str,
        ats: &AccessTransformSet,
    ) -> Result<FileRewrite, RewriteError> {
        let classes = group_by_file(ats).remove(relative).unwrap_or_default();
        self.rewrite_classes(root, relative, source, ats, &classes)
    }

    /// Apply every transform in `ats` to the tree at `root`, in place.
    pub fn rewrite_tree(&self, root: &Path, ats: &AccessTransformSet) -> Result<TreeRewrite, RewriteError> {
        let mut summary = TreeRewrite::default();
        for (relative, classes) in group_by_file(ats) {
            let path = root.join(&relative);
            if !path.is_file() {
                for class in &classes {
                    summary.issues.push(RewriteIssue::TargetMemberNotFound {
                        path: relative.clone(),
                        class: class.clone(),
                        target: "class".to_string(),
                    });
                }
                continue;
            }

            let source = fs::read_to_string(&path).map_err(|source| RewriteError::Io {
                path: path.clone(),
                source,
            })?;
            let result = self.rewrite_classes(root, &relative, &source, ats, &classes)?;
            if result.changed() {
                edit::atomic_write(&path, result.rewritten.as_bytes())?;
                summary.files_changed += 1;
            }
            summary.applied += result.applied;
            summary.issues.extend(result.issues);
        }
        Ok(summary)
    }

    fn rewrite_classes(
        &self,
        root: &Path,
        relative: &Path,
        source: &str,
        ats: &AccessTransformSet,
        classes: &[String],
    ) -> Result<FileRewrite, RewriteError> {
        let tree = parse_java(source).map_err(|source| RewriteError::Syntax {
            path: relative.to_path_buf(),
            source,
        })?;
        let program = tree.root_node();
        let errors = error_count(program);
        if errors > 0 {
            tracing::warn!(path = %relative.display(), errors, "source has syntax errors, rewriting best-effort");
        }

        let mut roots = vec![root.to_path_buf()];
        roots.extend(self.classpath.iter().cloned());
        let resolver = TypeResolver::from_program(program, source, &roots);

        let mut issues = Vec::new();
        // declaration id -> (node, merged transform, target label)
        let mut targets: BTreeMap<usize, (Node<'_>, AccessTransform, String, String)> = BTreeMap::new();

        for class in classes {
            let Some(transforms) = ats.get_class(class) else {
                continue;
            };
            let simple = class.rsplit('.').next().unwrap_or(class);
            let nesting: Vec<&str> = simple.split('$').collect();
            let types = find_types(program, source, &nesting);

            let owner = match types.as_slice() {
                [] => {
                    for (member, _) in transforms.entries() {
                        issues.push(RewriteIssue::TargetMemberNotFound {
                            path: relative.to_path_buf(),
                            class: class.clone(),
                            target: target_label(member),
                        });
                    }
                    continue;
                }
                [owner] => owner,
                many => {
                    return Err(RewriteError::UnexpectedResultSetShape {
                        path: relative.to_path_buf(),
                        expected: 1,
                        found: many.len(),
                    })
                }
            };

            for (member, at) in transforms.entries() {
                let label = target_label(member);
                let node = match member {
                    None => Some(owner.node),
                    Some(key) => match self.locate_member(owner, source, key, &resolver) {
                        Ok(node) => node,
                        Err(reason) => {
                            issues.push(RewriteIssue::InvalidTarget {
                                path: relative.to_path_buf(),
                                class: class.clone(),
                                target: label,
                                reason,
                            });
                            continue;
                        }
                    },
                };
                let Some(node) = node else {
                    issues.push(RewriteIssue::TargetMemberNotFound {
                        path: relative.to_path_buf(),
                        class: class.clone(),
                        target: label,
                    });
                    continue;
                };

                match targets.get_mut(&node.id()) {
                    Some((_, existing, _, _)) => match existing.merge(at) {
                        Some(merged) => *existing = merged,
                        None => issues.push(RewriteIssue::InvalidTarget {
                            path: relative.to_path_buf(),
                            class: class.clone(),
                            target: label,
                            reason: format!("conflicts with {existing} on the same declaration"),
                        }),
                    },
                    None => {
                        targets.insert(node.id(), (node, *at, class.clone(), label));
                    }
                }
            }
        }

        let file = root.join(relative);
        let mut edits = Vec::new();
        let mut applied = 0;
        for (node, at, class, label) in targets.into_values() {
            let plan = plan_modifiers(node, source, at, &file);
            if plan.edits.is_empty() {
                issues.push(RewriteIssue::RedundantTransform {
                    path: relative.to_path_buf(),
                    class,
                    target: label,
                    state: plan.current,
                });
                continue;
            }
            applied += 1;
            edits.extend(plan.edits);
        }

        let rewritten = edit::splice(source, &edits)?;
        tracing::debug!(path = %relative.display(), applied, issues = issues.len(), "rewrote modifiers");

        Ok(FileRewrite {
            path: relative.to_path_buf(),
            original: source.to_string(),
            rewritten,
            applied,
            issues,
        })
    }

    fn locate_member<'t>(
        &self,
        owner: &TypeMatch<'t>,
        source: &str,
        key: &MemberKey,
        resolver: &TypeResolver,
    ) -> Result<Option<Node<'t>>, String> {
        match key {
            MemberKey::Field(name) => Ok(find_field(owner.node, source, name)),
            MemberKey::Method { name, descriptor } => {
                let descriptor = MethodDescriptor::parse(descriptor).map_err(|e| e.to_string())?;
                Ok(find_methods(owner, source, name, &descriptor, resolver)
                    .into_iter()
                    .next())
            }
        }
    }
}

fn group_by_file(ats: &AccessTransformSet) -> BTreeMap<PathBuf, Vec<String>> {
    let mut by_file: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    for (class, _) in ats.classes() {
        by_file
            .entry(source_path_for_class(class))
            .or_default()
            .push(class.to_string());
    }
    by_file
}

fn target_label(member: Option<&MemberKey>) -> String {
    member.map_or_else(|| "class".to_string(), |m| m.to_string())
}

struct ModifierPlan {
    edits: Vec<Edit>,
    /// Human-readable modifier state before the rewrite
    current: String,
}

fn plan_modifiers(decl: Node<'_>, source: &str, at: AccessTransform, file: &Path) -> ModifierPlan {
    let modifiers = named_children(decl)
        .into_iter()
        .find(|n| n.kind() == "modifiers");
    let keywords: Vec<Node<'_>> = modifiers
        .map(|m| children(m).into_iter().filter(|c| !c.is_named()).collect())
        .unwrap_or_default();

    let visibility_node = keywords
        .iter()
        .copied()
        .find(|k| matches!(k.kind(), "public" | "protected" | "private"));
    let current_visibility = visibility_node
        .and_then(|k| Visibility::from_keyword(k.kind()))
        .unwrap_or(Visibility::None);
    let final_node = keywords.iter().copied().find(|k| k.kind() == "final");

    // insertion point for `final`: right after the modifier list
    let after_modifiers = modifiers
        .and_then(|m| m.next_sibling())
        .map_or(decl.start_byte(), |n| n.start_byte());
    // insertion point for a new visibility keyword: before the first keyword
    let before_keywords = keywords
        .first()
        .map_or(after_modifiers, |k| k.start_byte());

    let mut inserts: BTreeMap<usize, String> = BTreeMap::new();
    let mut edits = Vec::new();

    if at.visibility != Visibility::None && at.visibility != current_visibility {
        let keyword = at.visibility.keyword();
        match visibility_node {
            Some(node) => edits.push(Edit::new(
                file,
                node.start_byte(),
                node.end_byte(),
                keyword,
                text(node, source),
            )),
            None => inserts
                .entry(before_keywords)
                .or_default()
                .push_str(&format!("{keyword} ")),
        }
    }

    match (at.finality, final_node) {
        (Finality::Add, None) => inserts
            .entry(after_modifiers)
            .or_default()
            .push_str("final "),
        (Finality::Remove, Some(node)) => {
            let trailing = source[node.end_byte()..]
                .bytes()
                .take_while(|b| *b == b' ' || *b == b'\t')
                .count();
            let end = node.end_byte() + trailing;
            edits.push(Edit::new(file, node.start_byte(), end, "", &source[node.start_byte()..end]));
        }
        _ => {}
    }

    edits.extend(
        inserts
            .into_iter()
            .map(|(offset, inserted)| Edit::insert(file, offset, inserted)),
    );

    let current = match (current_visibility, final_node.is_some()) {
        (Visibility::None, true) => "package-private final".to_string(),
        (Visibility::None, false) => "package-private".to_string(),
        (v, true) => format!("{} final", v.keyword()),
        (v, false) => v.keyword().to_string(),
    };
    ModifierPlan { edits, current }
}
