//! Fragment syntax: tokenizer, parser and the parsed tree types.
//!
//! A fragment is one independently authored configuration source. Parsing is
//! a pure function from text to a forest of [`FragmentNode`]s; it knows
//! nothing about other fragments.
mod lexer;
mod node;
mod parser;

pub use lexer::{Token, TokenKind, tokenize};
pub use node::{FragmentNode, Position, PropertyEntry, Scalar, Value, find_class, name_key};
pub use parser::parse_fragment;
