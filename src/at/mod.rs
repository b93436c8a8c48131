//! Access transforms: visibility/finality overrides for classes and members.
//!
//! Transforms live in two places: as `// Paper-AT: ` comments written by
//! developers into the working tree, and as `AT: ` header lines on rebuilt
//! patch files. Both feed an [`AccessTransformSet`], which can be persisted
//! as a flat table.

pub mod codec;
pub mod collect;
pub mod descriptor;
pub mod errors;
pub mod set;
pub mod table;

pub use codec::{AccessTransform, Finality, Visibility};
pub use collect::{
    class_name_for, collect_from_patches, extract_inline, parse_header, split_header,
    CollectIssue, Collection, Directive, InlineExtraction, HEADER_PREFIX, HEADER_SEPARATOR,
    INLINE_MARKER,
};
pub use descriptor::{JvmType, MethodDescriptor};
pub use errors::{AtError, AtIoError};
pub use set::{AccessTransformSet, ClassTransforms, MemberKey};
pub use table::{from_table_str, read_table, to_table_string, write_table};
