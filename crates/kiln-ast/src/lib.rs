//! Kiln front end: lexer, parser and AST.
//!
//! ## Usage
//!
//! ```
//! let file = kiln_ast::parse("export fn one() u32 { return 1; }").unwrap();
//! assert_eq!(file.items.len(), 1);
//! assert!(file.items[0].is_exported());
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::File;
pub use error::ParseError;
pub use lexer::Lexer;
pub use parser::{Parser, parse};
pub use token::{Token, TokenKind};
