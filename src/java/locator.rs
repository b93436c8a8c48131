//! Find the declarations an access transform targets.
//!
//! Classes are matched by their nesting path (`Outer$Inner`), fields by
//! declarator name, and methods by name plus a structural comparison of the
//! parameter and return types against a JVM descriptor.

use crate::at::{JvmType, MethodDescriptor};
use crate::java::parser::{named_children, text};
use crate::java::resolve::TypeResolver;
use tree_sitter::Node;

pub(crate) const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

/// A located type declaration plus the type variables in scope inside it.
#[derive(Debug, Clone)]
pub(crate) struct TypeMatch<'t> {
    pub node: Node<'t>,
    pub type_vars: Vec<String>,
}

/// All type declarations in `program` matching the `$`-separated nesting path.
pub(crate) fn find_types<'t>(program: Node<'t>, source: &str, nesting: &[&str]) -> Vec<TypeMatch<'t>> {
    let Some((first, rest)) = nesting.split_first() else {
        return Vec::new();
    };

    let mut current: Vec<TypeMatch<'t>> = named_children(program)
        .into_iter()
        .filter(|n| is_type_named(*n, source, first))
        .map(|node| TypeMatch {
            node,
            type_vars: type_parameter_names(node, source),
        })
        .collect();

    for segment in rest {
        current = current
            .into_iter()
            .flat_map(|outer| {
                body_members(outer.node)
                    .into_iter()
                    .filter(|n| is_type_named(*n, source, segment))
                    .map(move |node| {
                        let mut type_vars = outer.type_vars.clone();
                        type_vars.extend(type_parameter_names(node, source));
                        TypeMatch { node, type_vars }
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
    }
    current
}

fn is_type_named(node: Node<'_>, source: &str, name: &str) -> bool {
    TYPE_DECLARATIONS.contains(&node.kind())
        && node
            .child_by_field_name("name")
            .is_some_and(|n| text(n, source) == name)
}

/// Member declarations of a type body, flattening enum body declarations.
pub(crate) fn body_members<'t>(decl: Node<'t>) -> Vec<Node<'t>> {
    let Some(body) = decl.child_by_field_name("body") else {
        return Vec::new();
    };
    let mut members = Vec::new();
    for child in named_children(body) {
        if child.kind() == "enum_body_declarations" {
            members.extend(named_children(child));
        } else {
            members.push(child);
        }
    }
    members
}

fn type_parameter_names(decl: Node<'_>, source: &str) -> Vec<String> {
    let params = decl
        .child_by_field_name("type_parameters")
        .or_else(|| named_children(decl).into_iter().find(|n| n.kind() == "type_parameters"));
    let Some(params) = params else {
        return Vec::new();
    };
    named_children(params)
        .into_iter()
        .filter(|p| p.kind() == "type_parameter")
        .filter_map(|p| {
            named_children(p)
                .into_iter()
                .find(|n| matches!(n.kind(), "type_identifier" | "identifier"))
                .map(|n| text(n, source).to_string())
        })
        .collect()
}

/// The field (or interface constant) declaring `name`.
pub(crate) fn find_field<'t>(decl: Node<'t>, source: &str, name: &str) -> Option<Node<'t>> {
    body_members(decl).into_iter().find(|member| {
        if !matches!(member.kind(), "field_declaration" | "constant_declaration") {
            return false;
        }
        let mut cursor = member.walk();
        let found = member
            .children_by_field_name("declarator", &mut cursor)
            .filter_map(|d| d.child_by_field_name("name"))
            .any(|n| text(n, source) == name);
        found
    })
}

/// Methods (or constructors for `<init>`) matching `name` and `descriptor`.
pub(crate) fn find_methods<'t>(
    owner: &TypeMatch<'t>,
    source: &str,
    name: &str,
    descriptor: &MethodDescriptor,
    resolver: &TypeResolver,
) -> Vec<Node<'t>> {
    let constructor = name == "<init>";
    body_members(owner.node)
        .into_iter()
        .filter(|member| {
            let kind_ok = if constructor {
                member.kind() == "constructor_declaration"
            } else {
                member.kind() == "method_declaration"
                    && member
                        .child_by_field_name("name")
                        .is_some_and(|n| text(n, source) == name)
            };
            if !kind_ok {
                return false;
            }

            let mut type_vars = owner.type_vars.clone();
            type_vars.extend(type_parameter_names(*member, source));
            let matcher = TypeMatcher {
                source,
                resolver,
                type_vars: &type_vars,
            };
            matcher.signature_matches(*member, descriptor, !constructor)
        })
        .collect()
}

struct TypeMatcher<'a> {
    source: &'a str,
    resolver: &'a TypeResolver,
    type_vars: &'a [String],
}

impl TypeMatcher<'_> {
    fn signature_matches(&self, method: Node<'_>, descriptor: &MethodDescriptor, check_return: bool) -> bool {
        let params: Vec<(Node<'_>, usize)> = method
            .child_by_field_name("parameters")
            .map(|p| {
                named_children(p)
                    .into_iter()
                    .filter_map(|param| self.parameter_type(param))
                    .collect()
            })
            .unwrap_or_default();

        if params.len() != descriptor.params.len() {
            return false;
        }
        let params_match = params
            .iter()
            .zip(&descriptor.params)
            .all(|((node, dims), expected)| self.type_matches(*node, *dims, expected));
        if !params_match {
            return false;
        }

        if !check_return {
            return true;
        }
        let Some(ret) = method.child_by_field_name("type") else {
            return false;
        };
        let extra = method
            .child_by_field_name("dimensions")
            .map(|d| count_dims(d, self.source))
            .unwrap_or(0);
        self.type_matches(ret, extra, &descriptor.ret)
    }

    /// Type node of a parameter plus array dimensions declared outside it.
    fn parameter_type<'t>(&self, param: Node<'t>) -> Option<(Node<'t>, usize)> {
        match param.kind() {
            "formal_parameter" => {
                let ty = param.child_by_field_name("type")?;
                let dims = param
                    .child_by_field_name("dimensions")
                    .map(|d| count_dims(d, self.source))
                    .unwrap_or(0);
                Some((ty, dims))
            }
            "spread_parameter" => named_children(param)
                .into_iter()
                .find(|n| {
                    !matches!(
                        n.kind(),
                        "modifiers" | "variable_declarator" | "annotation" | "marker_annotation"
                    )
                })
                .map(|ty| (ty, 1)),
            _ => None,
        }
    }

    fn type_matches(&self, node: Node<'_>, extra_dims: usize, expected: &JvmType) -> bool {
        let (dims, base) = self.peel(node);
        let (expected_dims, expected_base) = expected.peel_arrays();
        if dims + extra_dims != expected_dims {
            return false;
        }

        match (base.kind(), expected_base) {
            ("void_type", JvmType::Void) => true,
            ("integral_type" | "floating_point_type" | "boolean_type", JvmType::Primitive(kw)) => {
                text(base, self.source).trim() == *kw
            }
            ("type_identifier" | "scoped_type_identifier" | "generic_type", JvmType::Object(_)) => {
                self.object_matches(&erased_name(base, self.source), expected_base)
            }
            _ => false,
        }
    }

    /// Strip annotations and array dimensions from a type node.
    fn peel<'t>(&self, mut node: Node<'t>) -> (usize, Node<'t>) {
        let mut dims = 0;
        loop {
            match node.kind() {
                "array_type" => {
                    dims += node
                        .child_by_field_name("dimensions")
                        .map(|d| count_dims(d, self.source))
                        .unwrap_or(1);
                    match node.child_by_field_name("element") {
                        Some(element) => node = element,
                        None => return (dims, node),
                    }
                }
                "annotated_type" => match named_children(node).into_iter().last() {
                    Some(inner) => node = inner,
                    None => return (dims, node),
                },
                _ => return (dims, node),
            }
        }
    }

    fn object_matches(&self, written: &str, expected: &JvmType) -> bool {
        let (Some(dotted), Some(simple)) = (expected.dotted_name(), expected.simple_name()) else {
            return false;
        };

        // erasure of an unbounded type variable
        if self.type_vars.iter().any(|v| v == written) {
            return true;
        }

        if written.contains('.') {
            return dotted == written || dotted.ends_with(&format!(".{written}"));
        }

        match self.resolver.resolve(written) {
            Some(resolved) => resolved == dotted,
            None => written == simple,
        }
    }
}

fn count_dims(dimensions: Node<'_>, source: &str) -> usize {
    text(dimensions, source).matches('[').count()
}

/// Dotted type name with annotations and type arguments removed.
fn erased_name(node: Node<'_>, source: &str) -> String {
    match node.kind() {
        "generic_type" => named_children(node)
            .into_iter()
            .find(|n| matches!(n.kind(), "type_identifier" | "scoped_type_identifier"))
            .map(|n| erased_name(n, source))
            .unwrap_or_default(),
        "scoped_type_identifier" => named_children(node)
            .into_iter()
            .filter(|n| {
                matches!(
                    n.kind(),
                    "type_identifier" | "scoped_type_identifier" | "generic_type"
                )
            })
            .map(|n| erased_name(n, source))
            .collect::<Vec<_>>()
            .join("."),
        _ => text(node, source).trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::java::JavaParser;

    const SOURCE: &str = r#"
package p;

import java.util.List;
import java.util.Map;

public class Outer<T> {
    private int count, total;
    static final String NAME = "x";

    Outer(int a) {}
    Outer(String s, int... rest) {}

    void run() {}
    int run(int a) { return a; }
    List<String> names(Map.Entry<String, T> e, long[] ids, T value) { return null; }
    String[] split(byte b[]) { return null; }

    static class Inner {
        protected void go() {}
    }

    enum Kind {
        A, B;
        void tag() {}
    }
}
"#;

    fn with_outer<R>(f: impl FnOnce(&TypeMatch<'_>, &TypeResolver) -> R) -> R {
        let mut parser = JavaParser::new().unwrap();
        let tree = parser.parse(SOURCE).unwrap();
        let root = tree.root_node();
        let resolver = TypeResolver::from_program(root, SOURCE, &[]);
        let types = find_types(root, SOURCE, &["Outer"]);
        assert_eq!(types.len(), 1);
        f(&types[0], &resolver)
    }

    fn count(owner: &TypeMatch<'_>, resolver: &TypeResolver, name: &str, desc: &str) -> usize {
        let desc = MethodDescriptor::parse(desc).unwrap();
        find_methods(owner, SOURCE, name, &desc, resolver).len()
    }

    #[test]
    fn finds_nested_types() {
        let mut parser = JavaParser::new().unwrap();
        let tree = parser.parse(SOURCE).unwrap();
        let root = tree.root_node();
        assert_eq!(find_types(root, SOURCE, &["Outer", "Inner"]).len(), 1);
        assert_eq!(find_types(root, SOURCE, &["Outer", "Kind"]).len(), 1);
        assert!(find_types(root, SOURCE, &["Outer", "Missing"]).is_empty());
        assert!(find_types(root, SOURCE, &["Inner"]).is_empty());

        let outer = &find_types(root, SOURCE, &["Outer", "Inner"])[0];
        assert_eq!(outer.type_vars, vec!["T".to_string()]);
    }

    #[test]
    fn finds_fields_in_multi_declarators() {
        with_outer(|owner, _| {
            assert!(find_field(owner.node, SOURCE, "total").is_some());
            assert!(find_field(owner.node, SOURCE, "NAME").is_some());
            assert!(find_field(owner.node, SOURCE, "missing").is_none());
        });
    }

    #[test]
    fn matches_overloads_by_descriptor() {
        with_outer(|owner, resolver| {
            assert_eq!(count(owner, resolver, "run", "()V"), 1);
            assert_eq!(count(owner, resolver, "run", "(I)I"), 1);
            assert_eq!(count(owner, resolver, "run", "(J)I"), 0);
            assert_eq!(count(owner, resolver, "run", "(I)V"), 0);
        });
    }

    #[test]
    fn matches_generics_arrays_and_type_variables() {
        with_outer(|owner, resolver| {
            assert_eq!(
                count(
                    owner,
                    resolver,
                    "names",
                    "(Ljava/util/Map$Entry;[JLjava/lang/Object;)Ljava/util/List;"
                ),
                1
            );
            assert_eq!(
                count(owner, resolver, "split", "([B)[Ljava/lang/String;"),
                1
            );
            assert_eq!(
                count(owner, resolver, "split", "(B)[Ljava/lang/String;"),
                0
            );
        });
    }

    #[test]
    fn matches_constructors_and_varargs() {
        with_outer(|owner, resolver| {
            assert_eq!(count(owner, resolver, "<init>", "(I)V"), 1);
            assert_eq!(count(owner, resolver, "<init>", "(Ljava/lang/String;[I)V"), 1);
            assert_eq!(count(owner, resolver, "<init>", "()V"), 0);
        });
    }

    #[test]
    fn finds_methods_in_enum_bodies() {
        let mut parser = JavaParser::new().unwrap();
        let tree = parser.parse(SOURCE).unwrap();
        let root = tree.root_node();
        let resolver = TypeResolver::from_program(root, SOURCE, &[]);
        let kind = &find_types(root, SOURCE, &["Outer", "Kind"])[0];
        let desc = MethodDescriptor::parse("()V").unwrap();
        assert_eq!(find_methods(kind, SOURCE, "tag", &desc, &resolver).len(), 1);
    }
}
