//! Signature mini-language
//!
//! Call shapes are declared inline as short strings, one letter per type:
//!
//! ```text
//! i(ppip)    int32 f(void *, void *, int32, void *)
//! v(II|I)    void  f(uint32, uint32, ...) called with one extra uint32
//! d(d)       double f(double)
//! ```
//!
//! Letters: `b`/`B` 8-bit, `s`/`S` 16-bit, `i`/`I` 32-bit, `l`/`L` 64-bit
//! (lowercase signed, uppercase unsigned), `f` float, `d` double, `p`/`v`
//! signed pointer-width, `P`/`V` unsigned pointer-width. `v` is accepted as a
//! return type for `void`; the register is still read, the value ignored.

use std::fmt;

use thiserror::Error;

use crate::abi::WordSize;
use crate::proto::Prototype;
use crate::types::UnaType;

/// Stage of the signature parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    /// Expecting the return type letter
    Return,
    /// Return type read, expecting `(`
    ArgsReady,
    /// Inside the argument list
    Args,
    /// `)` consumed; nothing else may follow
    End,
}

impl fmt::Display for ParseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParseStage::Return => "RETURN",
            ParseStage::ArgsReady => "AREADY",
            ParseStage::Args => "ARGS",
            ParseStage::End => "END",
        })
    }
}

/// Errors from signature parsing and prototype construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// A character appeared in a stage that does not accept it
    #[error("signature \"{signature}\": '{found}' is not allowed in {stage} stage")]
    UnexpectedChar {
        /// Full signature text
        signature: String,
        /// Offending character
        found: char,
        /// Stage the parser was in
        stage: ParseStage,
    },

    /// More than one variadic marker
    #[error("signature \"{signature}\": '|' can only be used once")]
    DuplicateVariadic {
        /// Full signature text
        signature: String,
    },

    /// Input ended before the closing parenthesis
    #[error("signature \"{signature}\": incomplete, ended in {stage} stage")]
    Incomplete {
        /// Full signature text
        signature: String,
        /// Stage the parser was in
        stage: ParseStage,
    },

    /// Letter outside the vocabulary
    #[error("unknown type specifier '{0}'")]
    UnknownType(char),

    /// Variadic split index past the end of the argument list
    #[error("variadic index {index} out of range for {count} arguments")]
    VariadicOutOfRange {
        /// Requested split index
        index: usize,
        /// Number of arguments
        count: usize,
    },
}

/// Type information for the running process: which integer descriptor a
/// pointer-sized letter resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysTypeInfo {
    /// Signed pointer-width integer
    pub pointer_i: UnaType,
    /// Unsigned pointer-width integer
    pub pointer_u: UnaType,
}

impl SysTypeInfo {
    /// 32-bit process.
    pub const SI32: SysTypeInfo = SysTypeInfo {
        pointer_i: UnaType::I32,
        pointer_u: UnaType::U32,
    };

    /// 64-bit process.
    pub const SI64: SysTypeInfo = SysTypeInfo {
        pointer_i: UnaType::I64,
        pointer_u: UnaType::U64,
    };

    /// Type info for the given word size.
    pub const fn for_word_size(word: WordSize) -> SysTypeInfo {
        match word {
            WordSize::W32 => Self::SI32,
            WordSize::W64 => Self::SI64,
        }
    }

    /// Decodes one signature letter.
    pub fn char_type(&self, c: char) -> Result<UnaType, SignatureError> {
        Ok(match c {
            'b' => UnaType::I8,
            'B' => UnaType::U8,
            's' => UnaType::I16,
            'S' => UnaType::U16,
            'i' => UnaType::I32,
            'I' => UnaType::U32,
            'l' => UnaType::I64,
            'L' => UnaType::U64,
            'f' => UnaType::F32,
            'd' => UnaType::F64,
            'p' | 'v' => self.pointer_i,
            'P' | 'V' => self.pointer_u,
            other => return Err(SignatureError::UnknownType(other)),
        })
    }

    /// Parses a textual signature into a prototype.
    pub fn parse(&self, signature: &str) -> Result<Prototype, SignatureError> {
        let mut stage = ParseStage::Return;
        let mut ret = None;
        let mut args = Vec::new();
        let mut variadic = None;

        let unexpected = |found: char, stage: ParseStage| SignatureError::UnexpectedChar {
            signature: signature.to_string(),
            found,
            stage,
        };

        for c in signature.chars() {
            match (c, stage) {
                ('(', ParseStage::ArgsReady) => stage = ParseStage::Args,
                (')', ParseStage::Args) => stage = ParseStage::End,
                ('|', ParseStage::Args) => {
                    if variadic.is_some() {
                        return Err(SignatureError::DuplicateVariadic {
                            signature: signature.to_string(),
                        });
                    }
                    variadic = Some(args.len());
                }
                ('(' | ')' | '|', _) => return Err(unexpected(c, stage)),
                (_, ParseStage::Return) => {
                    ret = Some(self.char_type(c)?);
                    stage = ParseStage::ArgsReady;
                }
                (_, ParseStage::Args) => args.push(self.char_type(c)?),
                (_, ParseStage::ArgsReady | ParseStage::End) => {
                    return Err(unexpected(c, stage));
                }
            }
        }

        match (stage, ret) {
            (ParseStage::End, Some(ret)) => Prototype::new(ret, args, variadic),
            _ => Err(SignatureError::Incomplete {
                signature: signature.to_string(),
                stage,
            }),
        }
    }
}
