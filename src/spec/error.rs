//! Parse-time diagnostics. Every error carries the 1-based source line it
//! was raised on and renders as a single diagnostic line.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecError {
    pub line: usize,
    pub kind: SpecErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecErrorKind {
    UnknownDirective(String),
    BadNumber(String),
    WrongBitCount { expected: usize, found: usize },
    UndeclaredFlag(String),
    DuplicateFlag(String),
    MissingBits,
    DirectiveAfterRule(String),
    ZeroWidth,
    StrayFragment,
    MissingAction,
    TrailingText(String),
}

impl SpecError {
    pub fn new(line: usize, kind: SpecErrorKind) -> Self {
        Self { line, kind }
    }
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: ", self.line)?;
        match &self.kind {
            SpecErrorKind::UnknownDirective(name) => write!(f, "unknown directive '%{name}'"),
            SpecErrorKind::BadNumber(text) => write!(f, "bad number '{text}'"),
            SpecErrorKind::WrongBitCount { expected, found } => {
                write!(f, "pattern has {found} bits, specification declares {expected}")
            }
            SpecErrorKind::UndeclaredFlag(name) => write!(f, "undeclared flag '{name}'"),
            SpecErrorKind::DuplicateFlag(name) => write!(f, "flag '{name}' already declared"),
            SpecErrorKind::MissingBits => write!(f, "pattern rule before a %bits directive"),
            SpecErrorKind::DirectiveAfterRule(name) => {
                write!(f, "directive '%{name}' after the first pattern rule")
            }
            SpecErrorKind::ZeroWidth => write!(f, "%bits 0 makes no sense"),
            SpecErrorKind::StrayFragment => {
                write!(f, "code fragment with no rule or directive to attach to")
            }
            SpecErrorKind::MissingAction => write!(f, "pattern rule has no code fragment"),
            SpecErrorKind::TrailingText(text) => write!(f, "unexpected trailing text '{text}'"),
        }
    }
}

impl std::error::Error for SpecError {}
