/// Indentation-based document parser
mod parse;
pub use parse::{parse, parse_file, Error, ErrorKind};

/// Parsed document nodes
mod value;
pub use value::{Mapping, Value};

pub mod shell;
