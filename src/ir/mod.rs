//! Shell IR
//!
//! The normalized tree every front end lowers into, with the factory,
//! validation, traversal and printing helpers around it.

pub mod builders;
pub mod printer;
pub mod types;
pub mod validate;
pub mod visit;

pub use builders::IR;
pub use printer::{print_tree, to_shell};
pub use types::*;
pub use validate::{is_valid_name, validate_command, IrError};
pub use visit::Visitor;
