//! Expression parsing: tokens, operators, and infix → RPN conversion.

pub mod parser;
pub mod token;

pub use parser::{ParseOptions, parse, parse_with};
pub use token::{Operator, Token};
