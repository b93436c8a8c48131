use crate::java::errors::JavaSyntaxError;
use ast_grep_language::{LanguageExt, SupportLang};
use std::cell::RefCell;
use tree_sitter::{Node, Parser, Tree};

thread_local! {
    // one parser per thread, created on the first file that needs it
    static SHARED: RefCell<Option<JavaParser>> = const { RefCell::new(None) };
}

/// Tree-sitter parser wrapper for Java source code.
pub struct JavaParser {
    parser: Parser,
}

impl JavaParser {
    pub fn new() -> Result<Self, JavaSyntaxError> {
        let mut parser = Parser::new();
        // Java grammar bundled with ast-grep-language
        let ts_lang = SupportLang::Java.get_ts_language();
        parser
            .set_language(&ts_lang)
            .map_err(|_| JavaSyntaxError::LanguageSet)?;
        Ok(Self { parser })
    }

    /// Parse source code into a tree-sitter Tree.
    pub fn parse(&mut self, source: &str) -> Result<Tree, JavaSyntaxError> {
        self.parser
            .parse(source, None)
            .ok_or(JavaSyntaxError::ParseFailed)
    }
}

/// Parse `source` with this thread's shared parser.
///
/// Rewriting a patch set parses every touched file; the grammar is loaded
/// once per thread instead of once per file.
pub fn parse_java(source: &str) -> Result<Tree, JavaSyntaxError> {
    SHARED.with(|slot| {
        let mut slot = slot.borrow_mut();
        let parser = match slot.take() {
            Some(parser) => parser,
            None => JavaParser::new()?,
        };
        slot.insert(parser).parse(source)
    })
}

/// All direct children of `node`, named and anonymous.
pub(crate) fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

/// Direct named children of `node`.
pub(crate) fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

pub(crate) fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

/// Count of ERROR/MISSING nodes below `node`.
pub(crate) fn error_count(node: Node<'_>) -> usize {
    let own = usize::from(node.is_error() || node.is_missing());
    own + children(node).into_iter().map(error_count).sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_java() {
        let mut parser = JavaParser::new().unwrap();
        let tree = parser.parse("class A { void m() {} }").unwrap();
        assert_eq!(tree.root_node().kind(), "program");
        assert_eq!(error_count(tree.root_node()), 0);
    }

    #[test]
    fn parse_invalid_java() {
        let mut parser = JavaParser::new().unwrap();
        let tree = parser.parse("class A { void m( {} }").unwrap();
        assert!(error_count(tree.root_node()) > 0);
    }

    #[test]
    fn shared_parser_is_reused_across_files() {
        let first = parse_java("class A {}").unwrap();
        let second = parse_java("interface B { void m(); }").unwrap();
        assert_eq!(first.root_node().kind(), "program");
        assert_eq!(second.root_node().child(0).unwrap().kind(), "interface_declaration");
        assert!(SHARED.with(|slot| slot.borrow().is_some()));
    }
}
