//! Argument shapes of callable functions.
//!
//! ABI type strings (`felt`, `felt*`, `(felt, felt)`, `Uint256`, ...) are parsed
//! into a [`TypeDescriptor`] tree which drives value generation.

use std::fmt;

use crate::abi::AbiMember;

/// Closed set of argument shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    /// A single field element.
    Felt,
    /// Pointer-style array: lowered as a length followed by that many pointees.
    Pointer(Box<TypeDescriptor>),
    /// Fixed tuple, members in declared order.
    Tuple(Vec<TypeDescriptor>),
    /// Named struct, resolved against the program's struct table.
    Struct(String),
}

impl TypeDescriptor {
    /// Parse an ABI type string.
    pub fn parse(input: &str) -> Result<Self, TypeParseError> {
        let mut parser = Parser {
            input,
            chars: input.char_indices().peekable(),
        };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if let Some((pos, c)) = parser.chars.peek().copied() {
            return Err(parser.error(format!("unexpected '{c}' at offset {pos}")));
        }
        Ok(ty)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Felt => write!(f, "felt"),
            TypeDescriptor::Pointer(inner) => write!(f, "{inner}*"),
            TypeDescriptor::Tuple(members) => {
                write!(f, "(")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{m}")?;
                }
                write!(f, ")")
            }
            TypeDescriptor::Struct(name) => write!(f, "{name}"),
        }
    }
}

/// Error produced for malformed or unsupported type strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParseError {
    pub input: String,
    pub reason: String,
}

impl fmt::Display for TypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot parse type '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for TypeParseError {}

struct Parser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl Parser<'_> {
    fn error(&self, reason: impl Into<String>) -> TypeParseError {
        TypeParseError {
            input: self.input.to_string(),
            reason: reason.into(),
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn parse_type(&mut self) -> Result<TypeDescriptor, TypeParseError> {
        self.skip_ws();
        let mut ty = match self.chars.peek() {
            Some((_, '(')) => self.parse_tuple()?,
            Some(_) => {
                let ident = self.parse_ident()?;
                match ident.as_str() {
                    "felt" => TypeDescriptor::Felt,
                    "codeoffset" => return Err(self.error("codeoffset is not a calldata type")),
                    path => {
                        // Structs are referenced by the last segment of their scope.
                        let name = path.rsplit('.').next().unwrap_or(path);
                        TypeDescriptor::Struct(name.to_string())
                    }
                }
            }
            None => return Err(self.error("unexpected end of input")),
        };
        loop {
            self.skip_ws();
            match self.chars.peek() {
                Some((_, '*')) => {
                    self.chars.next();
                    ty = TypeDescriptor::Pointer(Box::new(ty));
                }
                _ => return Ok(ty),
            }
        }
    }

    fn parse_ident(&mut self) -> Result<String, TypeParseError> {
        let mut ident = String::new();
        while let Some((_, c)) = self.chars.peek().copied() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                ident.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if ident.is_empty() {
            return Err(self.error("expected a type name"));
        }
        Ok(ident)
    }

    fn parse_tuple(&mut self) -> Result<TypeDescriptor, TypeParseError> {
        self.chars.next();
        let mut members = Vec::new();
        self.skip_ws();
        if matches!(self.chars.peek(), Some((_, ')'))) {
            self.chars.next();
            return Ok(TypeDescriptor::Tuple(members));
        }
        loop {
            members.push(self.parse_tuple_member()?);
            self.skip_ws();
            match self.chars.next() {
                Some((_, ',')) => continue,
                Some((_, ')')) => return Ok(TypeDescriptor::Tuple(members)),
                Some((pos, c)) => {
                    return Err(self.error(format!("unexpected '{c}' at offset {pos}")))
                }
                None => return Err(self.error("unterminated tuple")),
            }
        }
    }

    /// A tuple member, optionally named: `felt` or `x: felt`.
    fn parse_tuple_member(&mut self) -> Result<TypeDescriptor, TypeParseError> {
        self.skip_ws();
        let checkpoint = self.chars.clone();
        if !matches!(self.chars.peek(), Some((_, '('))) {
            let _name = self.parse_ident()?;
            self.skip_ws();
            if matches!(self.chars.peek(), Some((_, ':'))) {
                self.chars.next();
                return self.parse_type();
            }
            self.chars = checkpoint;
        }
        self.parse_type()
    }
}

/// Lower the ABI `inputs` of a function into argument shapes.
///
/// Cairo ABIs declare an array argument as two inputs, `x_len: felt` followed
/// by `x: T*`. The pair becomes a single [`TypeDescriptor::Pointer`] whose
/// generated length is emitted in place of `x_len`.
pub fn parse_arguments(inputs: &[AbiMember]) -> Result<Vec<TypeDescriptor>, TypeParseError> {
    let mut names: Vec<&str> = Vec::with_capacity(inputs.len());
    let mut types: Vec<TypeDescriptor> = Vec::with_capacity(inputs.len());

    for input in inputs {
        let ty = TypeDescriptor::parse(&input.ty)?;
        if matches!(ty, TypeDescriptor::Pointer(_)) {
            let expected = format!("{}_len", input.name);
            let size_name = names.pop();
            let size_ty = types.pop();
            if size_name != Some(expected.as_str()) || size_ty != Some(TypeDescriptor::Felt) {
                return Err(TypeParseError {
                    input: input.ty.clone(),
                    reason: format!(
                        "array argument '{}' must be preceded by '{}: felt'",
                        input.name, expected
                    ),
                });
            }
        }
        names.push(&input.name);
        types.push(ty);
    }

    Ok(types)
}
