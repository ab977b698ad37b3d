//! ABI allocators
//!
//! An `AbiAllocator` reproduces, in data, the argument classifier a C
//! compiler runs for one calling convention. Compiling a [`Prototype`] walks
//! the arguments in declaration order, hands out general-purpose registers,
//! floating-point registers and stack words exactly as the compiler would,
//! and records each decision as a [`Command`]. The resulting command list is
//! a pure function of the prototype and the allocator, so it is compiled once
//! and reused for every call.
//!
//! # Physical slot layout
//!
//! ```text
//!  0 ............ gp_registers ........... 16 | 16 ...... 24
//!  [ GP registers | stack words (in order) ]  | [ FP regs  ]
//!  \____________________ A file ____________/   \_ F file _/
//! ```
//!
//! The trampoline for each convention loads the A file into its register
//! arguments and outgoing stack area, and the F file into its vector
//! registers. See [`crate::trampoline`].

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::invoke::{Command, Invoker, BASE_A, BASE_F, LOGICAL_SLOTS, SIZE_A, SIZE_F};
use crate::proto::Prototype;
use crate::sig::SysTypeInfo;
use crate::types::UnaType;
use crate::UnaResult;

// ============================================================================
// Machine parameters
// ============================================================================

/// Native word size of a convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordSize {
    /// 32-bit words; 64-bit values are split across two words
    W32,
    /// 64-bit words
    W64,
}

impl WordSize {
    /// Mask applied to every general-purpose word.
    #[inline]
    pub const fn mask(self) -> u64 {
        match self {
            WordSize::W32 => 0xFFFF_FFFF,
            WordSize::W64 => u64::MAX,
        }
    }

    /// Size in bits.
    pub const fn bits(self) -> u32 {
        match self {
            WordSize::W32 => 32,
            WordSize::W64 => 64,
        }
    }
}

/// Byte order of a convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

impl Endian {
    /// Byte order of the compilation target.
    pub const fn native() -> Endian {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }
}

// ============================================================================
// Calling conventions
// ============================================================================

/// The four native trampolines. Every compiled invoker is tagged with one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallingConvention {
    /// 32-bit x86, caller cleans the stack
    X86Cdecl,
    /// 32-bit x86, callee cleans the stack
    X86Stdcall,
    /// Microsoft x64
    X86_64Windows,
    /// System V AMD64
    X86_64Unix,
}

impl CallingConvention {
    /// Word size the trampoline operates on.
    pub const fn word_size(self) -> WordSize {
        match self {
            CallingConvention::X86Cdecl | CallingConvention::X86Stdcall => WordSize::W32,
            CallingConvention::X86_64Windows | CallingConvention::X86_64Unix => WordSize::W64,
        }
    }

    /// Number of A-file slots the trampoline loads into registers. The rest
    /// of the A file becomes outgoing stack words.
    pub const fn gp_registers(self) -> usize {
        match self {
            CallingConvention::X86Cdecl | CallingConvention::X86Stdcall => 0,
            CallingConvention::X86_64Windows => 4,
            CallingConvention::X86_64Unix => 6,
        }
    }

    /// Number of F-file slots the trampoline loads.
    pub const fn fp_registers(self) -> usize {
        match self {
            CallingConvention::X86Cdecl | CallingConvention::X86Stdcall => 0,
            CallingConvention::X86_64Windows => 4,
            CallingConvention::X86_64Unix => SIZE_F,
        }
    }

    /// Short name, as printed in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            CallingConvention::X86Cdecl => "x86_cdecl",
            CallingConvention::X86Stdcall => "x86_stdcall",
            CallingConvention::X86_64Windows => "x86_64_windows",
            CallingConvention::X86_64Unix => "x86_64_unix",
        }
    }
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Convention attribute requested at a call site.
///
/// Attributes alias onto the same allocator whenever a compiler would alias
/// them, e.g. `stdcall` means nothing on x86-64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConventionAttr {
    /// No attribute
    #[default]
    Default,
    /// `__stdcall`
    Stdcall,
    /// `__stdcall` on Windows only (the Khronos `APIENTRY` pattern)
    StdcallOnWindows,
}

impl FromStr for ConventionAttr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(ConventionAttr::Default),
            "stdcall" => Ok(ConventionAttr::Stdcall),
            "stdcall-on-windows" => Ok(ConventionAttr::StdcallOnWindows),
            other => Err(format!(
                "unknown convention '{}' (expected default, stdcall or stdcall-on-windows)",
                other
            )),
        }
    }
}

/// What happens to floating-point arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpPolicy {
    /// FP registers, then the stack. FP arguments never take GP registers,
    /// so an `fp_count` of zero puts every FP argument on the stack.
    Registers,
    /// FP registers, then GP registers, then the stack
    RegistersThenGeneral,
    /// Positional register assignment: each GP allocation burns the FP
    /// register of the same position, and each FP allocation is copied into
    /// the GP register of the same position (needed by variadic callees).
    /// Requires equal register counts.
    ShadowGeneral,
}

/// Errors raised while building allocators or compiling prototypes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    /// More arguments than logical slots
    #[error("prototype {proto} has {count} arguments, at most {max} can be passed")]
    TooManyArguments {
        /// Prototype text
        proto: String,
        /// Number of declared arguments
        count: usize,
        /// Logical slot budget
        max: usize,
    },

    /// Registers and stack words ran out
    #[error("prototype {proto} exceeded the capacity of the {convention} trampoline at argument {index}")]
    CapacityExceeded {
        /// Prototype text
        proto: String,
        /// Convention being compiled for
        convention: CallingConvention,
        /// Argument that did not fit
        index: usize,
    },

    /// Allocator parameters the trampoline cannot honour
    #[error("invalid {convention} allocator: {reason}")]
    InvalidAllocator {
        /// Convention the allocator targets
        convention: CallingConvention,
        /// What is wrong
        reason: &'static str,
    },
}

// ============================================================================
// Allocator
// ============================================================================

/// Argument allocator for one calling convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AbiAllocator {
    convention: CallingConvention,
    word: WordSize,
    endian: Endian,
    gp_count: usize,
    fp_count: usize,
    fp_policy: FpPolicy,
}

impl AbiAllocator {
    /// 32-bit x86 cdecl: everything on the stack.
    pub const X86_CDECL: AbiAllocator = AbiAllocator::preset(
        CallingConvention::X86Cdecl,
        WordSize::W32,
        0,
        0,
        FpPolicy::Registers,
    );

    /// 32-bit x86 stdcall: everything on the stack, callee pops.
    pub const X86_STDCALL: AbiAllocator = AbiAllocator::preset(
        CallingConvention::X86Stdcall,
        WordSize::W32,
        0,
        0,
        FpPolicy::Registers,
    );

    /// Microsoft x64: four positional register slots shared by GP and FP.
    pub const X86_64_WINDOWS: AbiAllocator = AbiAllocator::preset(
        CallingConvention::X86_64Windows,
        WordSize::W64,
        4,
        4,
        FpPolicy::ShadowGeneral,
    );

    /// System V AMD64: six GP registers, eight SSE registers.
    pub const X86_64_UNIX: AbiAllocator = AbiAllocator::preset(
        CallingConvention::X86_64Unix,
        WordSize::W64,
        6,
        8,
        FpPolicy::Registers,
    );

    const fn preset(
        convention: CallingConvention,
        word: WordSize,
        gp_count: usize,
        fp_count: usize,
        fp_policy: FpPolicy,
    ) -> AbiAllocator {
        AbiAllocator {
            convention,
            word,
            endian: Endian::Little,
            gp_count,
            fp_count,
            fp_policy,
        }
    }

    /// Builds a custom allocator on top of one of the four trampolines.
    pub fn new(
        convention: CallingConvention,
        word: WordSize,
        endian: Endian,
        gp_count: usize,
        fp_count: usize,
        fp_policy: FpPolicy,
    ) -> Result<AbiAllocator, AbiError> {
        let invalid = |reason| AbiError::InvalidAllocator { convention, reason };
        if word != convention.word_size() {
            return Err(invalid("word size does not match the trampoline"));
        }
        if gp_count > convention.gp_registers() {
            return Err(invalid("more GP registers than the trampoline loads"));
        }
        if fp_count > convention.fp_registers() {
            return Err(invalid("more FP registers than the trampoline loads"));
        }
        if fp_policy == FpPolicy::ShadowGeneral && (gp_count != fp_count || word != WordSize::W64) {
            return Err(invalid("FP/GP shadowing needs equal register counts and 64-bit words"));
        }
        Ok(AbiAllocator {
            convention,
            word,
            endian,
            gp_count,
            fp_count,
            fp_policy,
        })
    }

    /// Trampoline this allocator compiles for
    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    /// Native word size
    pub fn word_size(&self) -> WordSize {
        self.word
    }

    /// Byte order
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Number of GP argument registers
    pub fn gp_count(&self) -> usize {
        self.gp_count
    }

    /// Number of FP argument registers
    pub fn fp_count(&self) -> usize {
        self.fp_count
    }

    /// Floating-point handling
    pub fn fp_policy(&self) -> FpPolicy {
        self.fp_policy
    }

    /// Type info matching this allocator's word size, for pointer letters.
    pub fn type_info(&self) -> SysTypeInfo {
        SysTypeInfo::for_word_size(self.word)
    }

    /// First physical slot used for stack words.
    #[inline]
    pub fn stack_start(&self) -> usize {
        BASE_A + self.convention.gp_registers()
    }

    /// Whether a value of this type takes two words.
    #[inline]
    pub fn is_split(&self, ty: UnaType) -> bool {
        self.word == WordSize::W32 && ty.width_bytes() > 4
    }

    /// Which of the two words of a split value carries the high half.
    #[inline]
    fn pull_down_word(&self) -> usize {
        match self.endian {
            Endian::Big => 0,
            Endian::Little => 1,
        }
    }

    /// Parses `signature` with this allocator's pointer width and compiles it.
    pub fn of(&self, signature: &str) -> UnaResult<Invoker> {
        let proto = self.type_info().parse(signature)?;
        Ok(self.compile(&proto)?)
    }

    /// Emulates the compiler's argument allocator to produce an invoker.
    pub fn compile(&self, proto: &Prototype) -> Result<Invoker, AbiError> {
        let args = proto.args();
        if args.len() > LOGICAL_SLOTS {
            return Err(AbiError::TooManyArguments {
                proto: proto.to_string(),
                count: args.len(),
                max: LOGICAL_SLOTS,
            });
        }

        let shadow = self.fp_policy == FpPolicy::ShadowGeneral;
        let gp_end = BASE_A + self.gp_count;
        let fp_end = BASE_F + self.fp_count;
        let stack_start = self.stack_start();
        let stack_end = BASE_A + SIZE_A;

        let mut next_gp = BASE_A;
        let mut next_fp = BASE_F;
        let mut next_stack = stack_start;
        let mut fixed_fp_mask = 0u8;
        let mut commands = Vec::with_capacity(args.len() * 2);

        for (index, &arg) in args.iter().enumerate() {
            let source = index as u8;
            let mut gp_allowed = true;

            if arg.is_float() {
                if next_fp != fp_end {
                    if !proto.is_variadic_arg(index) {
                        fixed_fp_mask |= 1 << (next_fp - BASE_F);
                    }
                    commands.push(Command::whole(source, next_fp));
                    next_fp += 1;
                    if shadow {
                        commands.push(Command::whole(source, next_gp));
                        next_gp += 1;
                    }
                    continue;
                }
                gp_allowed = self.fp_policy == FpPolicy::RegistersThenGeneral;
            }

            let split = self.is_split(arg);
            let words = if split { 2 } else { 1 };
            for word in 0..words {
                let shift_down = if split && word == self.pull_down_word() {
                    32
                } else {
                    0
                };
                let dest = if gp_allowed && next_gp != gp_end {
                    next_gp += 1;
                    if shadow {
                        next_fp += 1;
                    }
                    next_gp - 1
                } else if next_stack != stack_end {
                    next_stack += 1;
                    next_stack - 1
                } else {
                    return Err(AbiError::CapacityExceeded {
                        proto: proto.to_string(),
                        convention: self.convention,
                        index,
                    });
                };
                commands.push(Command::new(source, shift_down, self.word.mask(), 0, dest));
            }
        }

        let invoker = Invoker::new(
            self.convention,
            proto.ret(),
            args.to_vec(),
            commands,
            next_stack - stack_start,
            fixed_fp_mask,
        );
        log::trace!("compiled {} for {}: {}", proto, self.convention, invoker);
        Ok(invoker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unix() -> AbiAllocator {
        AbiAllocator::X86_64_UNIX
    }

    fn dests(invoker: &Invoker) -> Vec<usize> {
        invoker.commands().iter().map(|c| c.dest as usize).collect()
    }

    #[test]
    fn test_presets_are_valid() {
        for preset in [
            AbiAllocator::X86_CDECL,
            AbiAllocator::X86_STDCALL,
            AbiAllocator::X86_64_WINDOWS,
            AbiAllocator::X86_64_UNIX,
        ] {
            let rebuilt = AbiAllocator::new(
                preset.convention(),
                preset.word_size(),
                preset.endian(),
                preset.gp_count(),
                preset.fp_count(),
                preset.fp_policy(),
            );
            assert_eq!(rebuilt, Ok(preset));
        }
    }

    #[test]
    fn test_two_ints_in_registers() {
        let inv = unix().of("i(ii)").unwrap();
        assert_eq!(dests(&inv), vec![0, 1]);
        assert!(inv.commands().iter().all(|c| c.shift_down == 0 && c.mask == u64::MAX));
    }

    #[test]
    fn test_pointer_goes_to_gp() {
        let inv = unix().of("p(p)").unwrap();
        assert_eq!(inv.commands().len(), 1);
        assert_eq!(inv.commands()[0].dest, 0);
        assert_eq!(inv.ret(), UnaType::I64);
    }

    #[test]
    fn test_seventh_int_spills_to_stack() {
        let inv = unix().of("v(iiiiiii)").unwrap();
        let stack = unix().stack_start();
        assert_eq!(dests(&inv), vec![0, 1, 2, 3, 4, 5, stack]);
        assert_eq!(inv.stack_words(), 1);
    }

    #[test]
    fn test_floats_use_fp_file() {
        let inv = unix().of("v(idif)").unwrap();
        assert_eq!(dests(&inv), vec![0, BASE_F, 1, BASE_F + 1]);
        assert_eq!(inv.fixed_fp_mask(), 0b11);
    }

    #[test]
    fn test_ninth_float_policy_divergence() {
        let proto = SysTypeInfo::SI64.parse("v(ddddddddd)").unwrap();

        let strict = unix().compile(&proto).unwrap();
        let d = dests(&strict);
        assert_eq!(&d[..8], &(BASE_F..BASE_F + 8).collect::<Vec<_>>()[..]);
        assert_eq!(d[8], unix().stack_start());

        let fallback = AbiAllocator::new(
            CallingConvention::X86_64Unix,
            WordSize::W64,
            Endian::Little,
            6,
            8,
            FpPolicy::RegistersThenGeneral,
        )
        .unwrap()
        .compile(&proto)
        .unwrap();
        let d = dests(&fallback);
        assert_eq!(d[8], BASE_A);
        assert_eq!(fallback.stack_words(), 0);
    }

    #[test]
    fn test_no_fp_registers_sends_floats_to_stack() {
        let abi = AbiAllocator::new(
            CallingConvention::X86_64Unix,
            WordSize::W64,
            Endian::Little,
            6,
            0,
            FpPolicy::Registers,
        )
        .unwrap();
        let inv = abi.of("v(did)").unwrap();
        assert_eq!(dests(&inv), vec![abi.stack_start(), BASE_A, abi.stack_start() + 1]);
        assert_eq!(inv.stack_words(), 2);
        assert_eq!(inv.fixed_fp_mask(), 0);
    }

    #[test]
    fn test_split_little_endian() {
        let inv = AbiAllocator::X86_CDECL.of("v(l)").unwrap();
        let cmds = inv.commands();
        assert_eq!(cmds.len(), 2);
        assert_eq!((cmds[0].dest, cmds[0].shift_down), (0, 0));
        assert_eq!((cmds[1].dest, cmds[1].shift_down), (1, 32));
        assert!(cmds.iter().all(|c| c.mask == 0xFFFF_FFFF && c.source == 0));
        assert_eq!(inv.stack_words(), 2);
    }

    #[test]
    fn test_split_big_endian() {
        let be = AbiAllocator::new(
            CallingConvention::X86Cdecl,
            WordSize::W32,
            Endian::Big,
            0,
            0,
            FpPolicy::Registers,
        )
        .unwrap();
        let inv = be.of("v(L)").unwrap();
        let cmds = inv.commands();
        assert_eq!((cmds[0].dest, cmds[0].shift_down), (0, 32));
        assert_eq!((cmds[1].dest, cmds[1].shift_down), (1, 0));
    }

    #[test]
    fn test_split_assembles_halves() {
        let inv = AbiAllocator::X86_CDECL.of("v(il)").unwrap();
        let mut slots = [0u64; LOGICAL_SLOTS];
        slots[0] = 7;
        slots[1] = 0x1122_3344_5566_7788;
        let image = inv.assemble(&slots);
        assert_eq!(&image.gp[..3], &[7, 0x5566_7788, 0x1122_3344]);
    }

    #[test]
    fn test_x86_doubles_on_stack() {
        let inv = AbiAllocator::X86_STDCALL.of("d(fd)").unwrap();
        assert_eq!(dests(&inv), vec![0, 1, 2]);
        assert_eq!(inv.stack_words(), 3);
        assert_eq!(inv.fixed_fp_mask(), 0);
    }

    #[test]
    fn test_windows_shadowing() {
        let inv = AbiAllocator::X86_64_WINDOWS.of("v(idif)").unwrap();
        // i -> rcx, d -> xmm1 + rdx, i -> r8, f -> xmm3 + r9
        assert_eq!(dests(&inv), vec![0, BASE_F + 1, 1, 2, BASE_F + 3, 3]);
        assert_eq!(inv.fixed_fp_mask(), 0b1010);
        assert_eq!(inv.stack_words(), 0);
    }

    #[test]
    fn test_windows_fifth_float_on_stack() {
        let inv = AbiAllocator::X86_64_WINDOWS.of("v(ddddd)").unwrap();
        let d = dests(&inv);
        assert_eq!(d.len(), 9);
        assert_eq!(d[8], AbiAllocator::X86_64_WINDOWS.stack_start());
    }

    #[test]
    fn test_windows_variadic_floats_not_typed() {
        let inv = AbiAllocator::X86_64_WINDOWS.of("i(p|d)").unwrap();
        assert_eq!(inv.fixed_fp_mask(), 0);
        assert_eq!(dests(&inv), vec![0, BASE_F + 1, 1]);
    }

    #[test]
    fn test_too_many_arguments() {
        let sig = format!("i({})", "i".repeat(20));
        let err = unix().of(&sig).unwrap_err();
        assert!(matches!(
            err,
            crate::UnaError::Abi(AbiError::TooManyArguments { count: 20, .. })
        ));
    }

    #[test]
    fn test_stack_capacity_exceeded() {
        // nine 64-bit values need eighteen 32-bit words
        let err = AbiAllocator::X86_CDECL.of("v(lllllllll)").unwrap_err();
        assert!(matches!(
            err,
            crate::UnaError::Abi(AbiError::CapacityExceeded { index: 8, .. })
        ));
    }

    #[test]
    fn test_sixteen_ints_fill_unix() {
        let inv = unix().of(&format!("v({})", "i".repeat(16))).unwrap();
        assert_eq!(dests(&inv), (0..16).collect::<Vec<_>>());
        assert_eq!(inv.stack_words(), 10);
    }

    #[test]
    fn test_invalid_allocators() {
        assert!(AbiAllocator::new(
            CallingConvention::X86_64Unix,
            WordSize::W64,
            Endian::Little,
            7,
            8,
            FpPolicy::Registers,
        )
        .is_err());
        assert!(AbiAllocator::new(
            CallingConvention::X86_64Windows,
            WordSize::W64,
            Endian::Little,
            4,
            2,
            FpPolicy::ShadowGeneral,
        )
        .is_err());
        assert!(AbiAllocator::new(
            CallingConvention::X86Cdecl,
            WordSize::W64,
            Endian::Little,
            0,
            0,
            FpPolicy::Registers,
        )
        .is_err());
    }

    #[test]
    fn test_convention_attr_from_str() {
        assert_eq!("stdcall".parse(), Ok(ConventionAttr::Stdcall));
        assert_eq!(
            "stdcall-on-windows".parse(),
            Ok(ConventionAttr::StdcallOnWindows)
        );
        assert!("fastcall".parse::<ConventionAttr>().is_err());
    }
}
