//! Compiled invokers
//!
//! An [`Invoker`] is the output of [`crate::abi::AbiAllocator::compile`]:
//! a list of word moves from logical argument slots into the physical call
//! image, plus the few facts the trampoline needs (convention, return class,
//! stack depth). Invokers are immutable and freely shared across threads.

use std::fmt;

use thiserror::Error;

use crate::abi::CallingConvention;
use crate::func::CodePtr;
use crate::trampoline::{self, ReturnClass};
use crate::types::UnaType;

// ============================================================================
// Slot layout
// ============================================================================

/// Number of logical argument slots a call can carry.
pub const LOGICAL_SLOTS: usize = 16;

/// First physical slot of the A file (GP registers, then stack words).
pub const BASE_A: usize = 0;
/// Size of the A file.
pub const SIZE_A: usize = 16;
/// First physical slot of the F file (FP registers).
pub const BASE_F: usize = BASE_A + SIZE_A;
/// Size of the F file.
pub const SIZE_F: usize = 8;
/// Total number of physical slots.
pub const PHYSICAL_SLOTS: usize = BASE_F + SIZE_F;

/// One word move: `dest |= ((src >> shift_down) & mask) << shift_up`.
///
/// Commands are only built by the allocator, so `source` is always below
/// [`LOGICAL_SLOTS`], `dest` below [`PHYSICAL_SLOTS`] and both shifts below 64.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command {
    pub(crate) mask: u64,
    pub(crate) source: u8,
    pub(crate) shift_down: u8,
    pub(crate) shift_up: u8,
    pub(crate) dest: u8,
}

impl Command {
    pub(crate) const fn new(
        source: u8,
        shift_down: u8,
        mask: u64,
        shift_up: u8,
        dest: usize,
    ) -> Self {
        debug_assert!((source as usize) < LOGICAL_SLOTS && dest < PHYSICAL_SLOTS);
        debug_assert!(shift_down < 64 && shift_up < 64);
        Command {
            mask,
            source,
            shift_down,
            shift_up,
            dest: dest as u8,
        }
    }

    /// Logical argument index
    pub fn source(&self) -> usize {
        self.source as usize
    }

    /// Right shift applied to the source
    pub fn shift_down(&self) -> u32 {
        self.shift_down as u32
    }

    /// Mask applied after the down shift
    pub fn mask(&self) -> u64 {
        self.mask
    }

    /// Left shift applied before or-ing into the destination
    pub fn shift_up(&self) -> u32 {
        self.shift_up as u32
    }

    /// Physical slot
    pub fn dest(&self) -> usize {
        self.dest as usize
    }

    /// Copies the whole 64-bit source slot.
    pub(crate) const fn whole(source: u8, dest: usize) -> Self {
        Command::new(source, 0, u64::MAX, 0, dest)
    }

    /// Applies the move to a call image.
    #[inline]
    pub fn apply(&self, logical: &[u64; LOGICAL_SLOTS], image: &mut CallImage) {
        let value = ((logical[self.source as usize] >> self.shift_down) & self.mask) << self.shift_up;
        *image.slot_mut(self.dest as usize) |= value;
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.source)?;
        if self.shift_down != 0 {
            write!(f, ">>{}", self.shift_down)?;
        }
        if self.mask != u64::MAX {
            write!(f, "&{:#x}", self.mask)?;
        }
        if self.shift_up != 0 {
            write!(f, "<<{}", self.shift_up)?;
        }
        if (self.dest as usize) < BASE_F {
            write!(f, "->A{}", self.dest as usize - BASE_A)
        } else {
            write!(f, "->F{}", self.dest as usize - BASE_F)
        }
    }
}

/// Physical register/stack image handed to a trampoline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallImage {
    /// A file: GP registers then stack words
    pub gp: [u64; SIZE_A],
    /// F file: FP registers
    pub fp: [u64; SIZE_F],
}

impl CallImage {
    #[inline]
    fn slot_mut(&mut self, slot: usize) -> &mut u64 {
        if slot < BASE_F {
            &mut self.gp[slot - BASE_A]
        } else {
            &mut self.fp[slot - BASE_F]
        }
    }

    /// Reads a physical slot.
    pub fn slot(&self, slot: usize) -> u64 {
        if slot < BASE_F {
            self.gp[slot - BASE_A]
        } else {
            self.fp[slot - BASE_F]
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised when calling through an invoker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    /// More argument slots than the trampolines carry
    #[error("{given} argument slots passed, at most {max} are supported")]
    TooManySlots {
        /// Number of slots passed
        given: usize,
        /// Logical slot budget
        max: usize,
    },

    /// The trampoline for this convention is not compiled into this host
    #[error("calling convention {convention} is not available on {host}")]
    ConventionUnavailable {
        /// Requested convention
        convention: CallingConvention,
        /// Host architecture
        host: &'static str,
    },
}

// ============================================================================
// Invoker
// ============================================================================

/// A compiled call shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Invoker {
    convention: CallingConvention,
    ret: UnaType,
    args: Vec<UnaType>,
    commands: Box<[Command]>,
    stack_words: usize,
    fixed_fp_mask: u8,
}

impl Invoker {
    pub(crate) fn new(
        convention: CallingConvention,
        ret: UnaType,
        args: Vec<UnaType>,
        commands: Vec<Command>,
        stack_words: usize,
        fixed_fp_mask: u8,
    ) -> Self {
        Invoker {
            convention,
            ret,
            args,
            commands: commands.into_boxed_slice(),
            stack_words,
            fixed_fp_mask,
        }
    }

    /// Trampoline this invoker targets
    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    /// Return type
    pub fn ret(&self) -> UnaType {
        self.ret
    }

    /// Argument types
    pub fn args(&self) -> &[UnaType] {
        &self.args
    }

    /// Word moves, in argument order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of A-file words used past the register area.
    pub fn stack_words(&self) -> usize {
        self.stack_words
    }

    /// Bit `i` is set when FP register `i` holds a fixed (non-variadic)
    /// floating-point argument.
    pub fn fixed_fp_mask(&self) -> u8 {
        self.fixed_fp_mask
    }

    /// How the trampoline reads the result.
    pub fn return_class(&self) -> ReturnClass {
        ReturnClass::of(self.ret)
    }

    /// Extends the declared arguments and runs the command list.
    pub fn assemble(&self, slots: &[u64; LOGICAL_SLOTS]) -> CallImage {
        let mut logical = *slots;
        for (slot, ty) in logical.iter_mut().zip(self.args.iter()) {
            *slot = ty.sign_extend(*slot);
        }
        let mut image = CallImage::default();
        for command in self.commands.iter() {
            command.apply(&logical, &mut image);
        }
        image
    }

    /// Calls native code with up to sixteen raw argument slots.
    ///
    /// Missing slots are zero. The raw result is extended per the return
    /// type; floating-point results come back as their bit pattern.
    ///
    /// # Safety
    ///
    /// `code` must point to a function whose real signature matches the one
    /// this invoker was compiled from, and every pointer-valued slot must be
    /// valid for what the callee does with it.
    pub unsafe fn call(&self, code: CodePtr, slots: &[u64]) -> Result<u64, InvokeError> {
        if slots.len() > LOGICAL_SLOTS {
            return Err(InvokeError::TooManySlots {
                given: slots.len(),
                max: LOGICAL_SLOTS,
            });
        }
        let mut logical = [0u64; LOGICAL_SLOTS];
        logical[..slots.len()].copy_from_slice(slots);
        let image = self.assemble(&logical);
        let class = self.return_class();

        let raw = match self.convention {
            CallingConvention::X86Cdecl => trampoline::x86_cdecl(code, &image, class),
            CallingConvention::X86Stdcall => {
                trampoline::x86_stdcall(code, &image, class, self.stack_words)
            }
            CallingConvention::X86_64Windows => {
                trampoline::x86_64_windows(code, &image, class, self.fixed_fp_mask)
            }
            CallingConvention::X86_64Unix => trampoline::x86_64_unix(code, &image, class),
        };

        match raw {
            Some(raw) => Ok(self.ret.sign_extend(raw)),
            None => Err(InvokeError::ConventionUnavailable {
                convention: self.convention,
                host: std::env::consts::ARCH,
            }),
        }
    }
}

impl fmt::Display for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inv{{{} {}(", self.convention, self.ret)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_str(") [")?;
        for (i, command) in self.commands.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", command)?;
        }
        write!(f, "] stack={}", self.stack_words)?;
        if self.fixed_fp_mask != 0 {
            write!(f, " fp={:#06b}", self.fixed_fp_mask)?;
        }
        f.write_str("}")
    }
}
