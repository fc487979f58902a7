// ABOUTME: Git integration for resolving the local source tree handed to the sandbox

pub mod source_tree;

pub use source_tree::{validate_branch_name, SourceTree, SourceTreeError};
