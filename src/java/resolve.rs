//! Best-effort resolution of simple type names in one compilation unit.
//!
//! Resolution order: single-type imports, the file's own package, wildcard
//! imports, then `java.lang`. Package and wildcard lookups only succeed when
//! the type's source file exists under one of the source roots (the tree
//! being rewritten plus any configured classpath roots).

use crate::java::parser::{children, named_children, text};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tree_sitter::Node;

const JAVA_LANG: &[&str] = &[
    "Object", "String", "Class", "Integer", "Long", "Short", "Byte", "Character", "Boolean",
    "Float", "Double", "Number", "Void", "Enum", "Record", "Iterable", "Comparable",
    "Runnable", "Thread", "Throwable", "Exception", "RuntimeException", "Error",
    "CharSequence", "StringBuilder", "Math", "System", "Override", "Deprecated",
];

#[derive(Debug, Clone, Default)]
pub struct TypeResolver {
    package: Option<String>,
    single_imports: HashMap<String, String>,
    wildcard_imports: Vec<String>,
    roots: Vec<PathBuf>,
}

impl TypeResolver {
    /// Build a resolver from the `program` node of a parsed file.
    pub fn from_program(program: Node<'_>, source: &str, roots: &[PathBuf]) -> Self {
        let mut resolver = TypeResolver {
            roots: roots.to_vec(),
            ..Default::default()
        };

        for item in named_children(program) {
            match item.kind() {
                "package_declaration" => {
                    resolver.package = named_children(item)
                        .into_iter()
                        .find(|n| matches!(n.kind(), "identifier" | "scoped_identifier"))
                        .map(|n| strip_ws(text(n, source)));
                }
                "import_declaration" => resolver.add_import(item, source),
                _ => {}
            }
        }
        resolver
    }

    fn add_import(&mut self, import: Node<'_>, source: &str) {
        let parts = children(import);
        if parts.iter().any(|n| n.kind() == "static") {
            return;
        }
        let Some(name) = parts
            .iter()
            .find(|n| matches!(n.kind(), "identifier" | "scoped_identifier"))
            .map(|n| strip_ws(text(*n, source)))
        else {
            return;
        };
        if parts.iter().any(|n| n.kind() == "asterisk") {
            self.wildcard_imports.push(name);
        } else if let Some(simple) = name.rsplit('.').next() {
            self.single_imports.insert(simple.to_string(), name.clone());
        }
    }

    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    /// Dotted name for `simple`, or `None` when it cannot be determined.
    pub fn resolve(&self, simple: &str) -> Option<String> {
        if let Some(fqn) = self.single_imports.get(simple) {
            return Some(fqn.clone());
        }
        let package_candidate = match &self.package {
            Some(pkg) => format!("{pkg}.{simple}"),
            None => simple.to_string(),
        };
        if self.exists(&package_candidate) {
            return Some(package_candidate);
        }
        for wildcard in &self.wildcard_imports {
            let candidate = format!("{wildcard}.{simple}");
            if self.exists(&candidate) {
                return Some(candidate);
            }
        }
        if JAVA_LANG.contains(&simple) {
            return Some(format!("java.lang.{simple}"));
        }
        None
    }

    fn exists(&self, dotted: &str) -> bool {
        let relative: PathBuf = format!("{}.java", dotted.replace('.', "/")).into();
        self.roots.iter().any(|root| is_file(&root.join(&relative)))
    }
}

fn is_file(path: &Path) -> bool {
    path.is_file()
}

fn strip_ws(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::java::JavaParser;
    use std::fs;

    const SOURCE: &str = r#"
package net.example;

import java.util.List;
import java.util.function.*;
import static java.util.Objects.requireNonNull;

class A {}
"#;

    #[test]
    fn resolves_imports_package_and_java_lang() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("net/example")).unwrap();
        fs::write(dir.path().join("net/example/Sibling.java"), "class Sibling {}").unwrap();
        fs::create_dir_all(dir.path().join("java/util/function")).unwrap();
        fs::write(dir.path().join("java/util/function/Supplier.java"), "").unwrap();

        let mut parser = JavaParser::new().unwrap();
        let tree = parser.parse(SOURCE).unwrap();
        let resolver =
            TypeResolver::from_program(tree.root_node(), SOURCE, &[dir.path().to_path_buf()]);

        assert_eq!(resolver.package(), Some("net.example"));
        assert_eq!(resolver.resolve("List").as_deref(), Some("java.util.List"));
        assert_eq!(resolver.resolve("Sibling").as_deref(), Some("net.example.Sibling"));
        assert_eq!(
            resolver.resolve("Supplier").as_deref(),
            Some("java.util.function.Supplier")
        );
        assert_eq!(resolver.resolve("String").as_deref(), Some("java.lang.String"));
        assert_eq!(resolver.resolve("Unknown"), None);
        assert_eq!(resolver.resolve("requireNonNull"), None);
    }
}
