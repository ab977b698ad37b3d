//! Function prototypes
//!
//! A `Prototype` is a C function signature with any variadic part already
//! specialized: `printf("%d %f", i, d)` is described by the concrete argument
//! list `p|id`, not by `p|`.

use std::fmt;

use crate::sig::SignatureError;
use crate::types::UnaType;

/// Parsed function signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prototype {
    ret: UnaType,
    args: Vec<UnaType>,
    variadic: Option<usize>,
}

impl Prototype {
    /// Builds a prototype. `variadic` is the index of the first variadic
    /// argument and may equal `args.len()` (no variadic arguments passed).
    pub fn new(
        ret: UnaType,
        args: Vec<UnaType>,
        variadic: Option<usize>,
    ) -> Result<Self, SignatureError> {
        if let Some(index) = variadic {
            if index > args.len() {
                return Err(SignatureError::VariadicOutOfRange {
                    index,
                    count: args.len(),
                });
            }
        }
        Ok(Prototype {
            ret,
            args,
            variadic,
        })
    }

    /// Non-variadic prototype.
    pub fn fixed(ret: UnaType, args: &[UnaType]) -> Self {
        Prototype {
            ret,
            args: args.to_vec(),
            variadic: None,
        }
    }

    /// Return type
    #[inline]
    pub fn ret(&self) -> UnaType {
        self.ret
    }

    /// Argument types in declaration order
    #[inline]
    pub fn args(&self) -> &[UnaType] {
        &self.args
    }

    /// Number of arguments
    #[inline]
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Index of the first variadic argument, if the function is variadic
    #[inline]
    pub fn variadic_index(&self) -> Option<usize> {
        self.variadic
    }

    /// Whether argument `i` falls in the variadic part
    pub fn is_variadic_arg(&self, i: usize) -> bool {
        matches!(self.variadic, Some(v) if i >= v)
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use fmt::Write;
        f.write_char(self.ret.proto_char())?;
        f.write_char('(')?;
        for (i, arg) in self.args.iter().enumerate() {
            if self.variadic == Some(i) {
                f.write_char('|')?;
            }
            f.write_char(arg.proto_char())?;
        }
        if self.variadic == Some(self.args.len()) {
            f.write_char('|')?;
        }
        f.write_char(')')
    }
}
