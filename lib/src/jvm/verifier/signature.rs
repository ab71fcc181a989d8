use super::VerifierErrorKind;
use crate::jvm::{BinaryName, ParseDescriptor, RefType, RenderDescriptor};
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

/// One entry on either side of a stack effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `int` (or any type which is widened to `int`)
    Int,
    Float,

    /// Both slots of a `long`
    Long,

    /// Both slots of a `double`
    Double,

    /// Any reference, including `null`
    AnyReference,
    Null,

    /// Any single slot, regardless of its type
    AnySlot,

    /// Reference of a specific type (only its kind is checked when popped)
    Reference(RefType<BinaryName>),

    /// Copy of the n-th popped value (counting from 1 for the deepest one)
    Copy(u8),

    /// Component type of the first popped array
    Component,
}

impl Token {
    fn parse_from(source: &mut Peekable<Chars>, in_pushes: bool) -> Result<Token, String> {
        let c = *source.peek().ok_or("unexpected end")?;
        let token = match c {
            'I' | 'B' | 'C' | 'S' | 'Z' => Token::Int,
            'F' => Token::Float,
            'J' => Token::Long,
            'D' => Token::Double,
            'A' => Token::AnyReference,
            'N' => Token::Null,
            '*' if !in_pushes => Token::AnySlot,
            '1'..='9' if in_pushes => Token::Copy(c as u8 - b'0'),
            'E' if in_pushes => Token::Component,
            'L' | '[' => {
                return RefType::parse_from(source)
                    .map(Token::Reference)
                    .map_err(|err| err.to_string())
            }
            _ => return Err(format!("unexpected '{}'", c)),
        };
        source.next();
        Ok(token)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int => f.write_str("I"),
            Token::Float => f.write_str("F"),
            Token::Long => f.write_str("J"),
            Token::Double => f.write_str("D"),
            Token::AnyReference => f.write_str("A"),
            Token::Null => f.write_str("N"),
            Token::AnySlot => f.write_str("*"),
            Token::Reference(ref_type) => f.write_str(&ref_type.render()),
            Token::Copy(n) => write!(f, "{}", n),
            Token::Component => f.write_str("E"),
        }
    }
}

/// Parsed stack effect: values popped and pushed, both listed deepest first
///
/// The empty string is the effect of instructions which leave the stack alone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    pub pops: Vec<Token>,
    pub pushes: Vec<Token>,
}

impl Signature {
    pub fn parse(source: &str) -> Result<Signature, VerifierErrorKind> {
        let malformed =
            |msg: String| VerifierErrorKind::MalformedSignature(format!("{:?}: {}", source, msg));
        if source.is_empty() {
            return Ok(Signature::default());
        }

        let mut chars = source.chars().peekable();
        let mut pops = vec![];
        loop {
            match chars.peek() {
                None => return Err(malformed("missing '>'".to_owned())),
                Some('>') => {
                    chars.next();
                    break;
                }
                Some(_) => pops.push(Token::parse_from(&mut chars, false).map_err(malformed)?),
            }
        }

        let mut pushes = vec![];
        while chars.peek().is_some() {
            let token = Token::parse_from(&mut chars, true).map_err(malformed)?;
            match token {
                Token::Copy(n) if n as usize > pops.len() => {
                    return Err(malformed(format!("there is no popped value {}", n)))
                }
                Token::Component if pops.is_empty() => {
                    return Err(malformed("there is no popped array".to_owned()))
                }
                _ => pushes.push(token),
            }
        }

        Ok(Signature { pops, pushes })
    }
}
