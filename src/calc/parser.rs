//! Infix → RPN conversion with validation.
//!
//! Three stages: a character scan into lexemes, shunting-yard conversion to
//! RPN, and a dry-run stack evaluation that checks the RPN is well-formed.

use tracing::debug;

use super::token::{Operator, Token};
use crate::error::ParseError;

/// Parser behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Reject a division whose divisor is a literal zero. Computed zero
    /// divisors are never rejected here; they surface at runtime.
    pub reject_zero_divisor: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            reject_zero_divisor: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    /// Raw digits-and-dots run; may still fail to parse as a number.
    Number(String),
    Operator(Operator),
    LeftParen,
    RightParen,
}

/// Parse `text` into an RPN token stream with default options.
pub fn parse(text: &str) -> Result<Vec<Token>, ParseError> {
    parse_with(text, ParseOptions::default())
}

/// Parse `text` into an RPN token stream.
pub fn parse_with(text: &str, options: ParseOptions) -> Result<Vec<Token>, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyExpression);
    }

    let lexemes = tokenize(text)?;
    let rpn = to_rpn(lexemes)?;
    validate(&rpn, options)?;

    debug!(tokens = rpn.len(), "Parsed expression");
    Ok(rpn)
}

fn tokenize(text: &str) -> Result<Vec<Lexeme>, ParseError> {
    let mut lexemes = Vec::new();
    let mut number = String::new();

    for ch in text.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            number.push(ch);
            continue;
        }

        flush_number(&mut number, &mut lexemes)?;

        if ch.is_whitespace() {
            continue;
        }

        let lexeme = match ch {
            '(' => Lexeme::LeftParen,
            ')' => Lexeme::RightParen,
            other => Lexeme::Operator(
                Operator::from_symbol(other).ok_or(ParseError::InvalidCharacter)?,
            ),
        };
        lexemes.push(lexeme);
    }

    flush_number(&mut number, &mut lexemes)?;
    Ok(lexemes)
}

fn flush_number(number: &mut String, lexemes: &mut Vec<Lexeme>) -> Result<(), ParseError> {
    if number.is_empty() {
        return Ok(());
    }
    if number.matches('.').count() > 1 {
        return Err(ParseError::InvalidNumber);
    }
    lexemes.push(Lexeme::Number(std::mem::take(number)));
    Ok(())
}

/// Shunting-yard. Operator-stack entries are `None` for `(`.
fn to_rpn(lexemes: Vec<Lexeme>) -> Result<Vec<Token>, ParseError> {
    let mut output = Vec::with_capacity(lexemes.len());
    let mut stack: Vec<Option<Operator>> = Vec::new();

    for lexeme in lexemes {
        match lexeme {
            Lexeme::Number(raw) => match raw.parse::<f64>() {
                Ok(value) => output.push(Token::Number(value)),
                // A lone "." is neither operand nor operator.
                Err(_) => return Err(ParseError::UnknownOperator),
            },
            Lexeme::LeftParen => stack.push(None),
            Lexeme::RightParen => loop {
                match stack.pop() {
                    Some(Some(op)) => output.push(Token::Operator(op)),
                    Some(None) => break,
                    None => return Err(ParseError::MismatchedParentheses),
                }
            },
            Lexeme::Operator(op) => {
                while let Some(Some(top)) = stack.last() {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    output.push(Token::Operator(*top));
                    stack.pop();
                }
                stack.push(Some(op));
            }
        }
    }

    while let Some(entry) = stack.pop() {
        match entry {
            Some(op) => output.push(Token::Operator(op)),
            None => return Err(ParseError::MismatchedParentheses),
        }
    }

    Ok(output)
}

/// Dry-run evaluation. Stack entries carry whether the value is a literal.
fn validate(rpn: &[Token], options: ParseOptions) -> Result<(), ParseError> {
    let mut stack: Vec<(f64, bool)> = Vec::with_capacity(rpn.len());

    for token in rpn {
        match token {
            Token::Number(value) => stack.push((*value, true)),
            Token::Operator(op) => {
                let (Some((rhs, rhs_literal)), Some((lhs, _))) = (stack.pop(), stack.pop()) else {
                    return Err(ParseError::NotEnoughOperands);
                };
                if *op == Operator::Div
                    && options.reject_zero_divisor
                    && rhs_literal
                    && rhs == 0.0
                {
                    return Err(ParseError::DivisionByZero);
                }
                stack.push((op.apply(lhs, rhs), false));
            }
            Token::Placeholder(_) => return Err(ParseError::InvalidExpression),
        }
    }

    if stack.len() != 1 {
        return Err(ParseError::InvalidExpression);
    }
    Ok(())
}
