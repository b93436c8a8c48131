//! Java source handling: parsing, declaration lookup and modifier rewriting.

pub mod errors;
pub(crate) mod locator;
pub mod parser;
pub mod resolve;
pub mod rewrite;

pub use errors::{JavaSyntaxError, RewriteError, RewriteIssue};
pub use parser::{parse_java, JavaParser};
pub use resolve::TypeResolver;
pub use rewrite::{source_path_for_class, FileRewrite, StructuralRewriter, TreeRewrite};
