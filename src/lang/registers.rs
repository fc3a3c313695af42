//! Closed per-architecture register sets used by the tokenizer.
//!
//! Register recognition is by lookup in the union of these sets, so register
//! renaming never affects similarity scoring. The tables cover the four
//! dialects the normalizer understands: x86/x86-64, ARM/AArch64, MIPS, and
//! RISC-V.

use std::collections::HashSet;
use std::sync::OnceLock;

/// x86 / x86-64 registers, including control, debug, segment, x87, SSE/AVX,
/// and the r8..r15 sub-register forms.
pub const X86_REGISTERS: &[&str] = &[
    "ah", "al", "ax", "bh", "bl", "bp", "bx", "ch", "cl", "cx", "dh", "di", "dl", "dx", "si",
    "sp", "eax", "ebp", "ebx", "ecx", "edi", "edx", "esi", "esp", "rax", "rbp", "rbx", "rcx",
    "rdi", "rdx", "rsi", "rsp", "rip", "eip", "eflags", "cs", "ds", "es", "fs", "gs", "ss",
    "cr0", "cr2", "cr3", "cr4", "dr0", "dr1", "dr2", "dr3", "dr6", "dr7", "st0", "st1", "st2",
    "st3", "st4", "st5", "st6", "st7", "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6",
    "xmm7", "ymm0", "ymm1", "ymm2", "ymm3", "ymm4", "ymm5", "ymm6", "ymm7", "r8", "r9", "r10",
    "r11", "r12", "r13", "r14", "r15", "r8d", "r9d", "r10d", "r11d", "r12d", "r13d", "r14d",
    "r15d", "r8w", "r9w", "r10w", "r11w", "r12w", "r13w", "r14w", "r15w", "r8b", "r9b", "r10b",
    "r11b", "r12b", "r13b", "r14b", "r15b",
];

/// ARM registers: AArch32 general purpose, AArch64 general purpose, and
/// NEON/FP views.
pub const ARM_REGISTERS: &[&str] = &[
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "lr", "pc", "cpsr", "spsr", "fpscr", "x0",
    "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13", "x14",
    "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26", "x27",
    "x28", "x29", "x30", "w0", "w1", "w2", "w3", "w4", "w5", "w6", "w7", "w8", "w9", "w10",
    "w11", "w12", "w13", "w14", "w15", "w16", "w17", "w18", "w19", "w20", "w21", "w22", "w23",
    "w24", "w25", "w26", "w27", "w28", "w29", "w30", "xzr", "wzr", "d0", "d1", "d2", "d3", "d4",
    "d5", "d6", "d7", "d8", "d9", "d10", "d11", "d12", "d13", "d14", "d15", "q0", "q1", "q2",
    "q3", "q4", "q5", "q6", "q7", "q8", "q9", "q10", "q11", "q12", "q13", "q14", "q15",
];

/// MIPS registers, numeric and ABI names plus FP registers. All are spelled
/// with the `$` sigil.
pub const MIPS_REGISTERS: &[&str] = &[
    "$0", "$1", "$2", "$3", "$4", "$5", "$6", "$7", "$8", "$9", "$10", "$11", "$12", "$13",
    "$14", "$15", "$16", "$17", "$18", "$19", "$20", "$21", "$22", "$23", "$24", "$25", "$26",
    "$27", "$28", "$29", "$30", "$31", "$zero", "$at", "$v0", "$v1", "$a0", "$a1", "$a2", "$a3",
    "$t0", "$t1", "$t2", "$t3", "$t4", "$t5", "$t6", "$t7", "$t8", "$t9", "$s0", "$s1", "$s2",
    "$s3", "$s4", "$s5", "$s6", "$s7", "$k0", "$k1", "$gp", "$sp", "$fp", "$ra", "$hi", "$lo",
    "$f0", "$f1", "$f2", "$f3", "$f4", "$f5", "$f6", "$f7", "$f8", "$f9", "$f10", "$f11",
    "$f12", "$f13", "$f14", "$f15", "$f16", "$f17", "$f18", "$f19", "$f20", "$f21", "$f22",
    "$f23", "$f24", "$f25", "$f26", "$f27", "$f28", "$f29", "$f30", "$f31",
];

/// RISC-V registers: x-names, ABI names, and FP names.
pub const RISCV_REGISTERS: &[&str] = &[
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13",
    "x14", "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26",
    "x27", "x28", "x29", "x30", "x31", "zero", "ra", "gp", "tp", "t0", "t1", "t2", "t3", "t4",
    "t5", "t6", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "a0",
    "a1", "a2", "a3", "a4", "a5", "a6", "a7", "f0", "f1", "f2", "f3", "f4", "f5", "f6", "f7",
    "f8", "f9", "f10", "f11", "f12", "f13", "f14", "f15", "f16", "f17", "f18", "f19", "f20",
    "f21", "f22", "f23", "f24", "f25", "f26", "f27", "f28", "f29", "f30", "f31", "ft0", "ft1",
    "ft2", "ft3", "ft4", "ft5", "ft6", "ft7", "ft8", "ft9", "ft10", "ft11", "fs0", "fs1",
    "fs2", "fs3", "fs4", "fs5", "fs6", "fs7", "fs8", "fs9", "fs10", "fs11", "fa0", "fa1",
    "fa2", "fa3", "fa4", "fa5", "fa6", "fa7", "sp",
];

static ALL_REGISTERS: OnceLock<HashSet<&'static str>> = OnceLock::new();

/// True if `token` (case-insensitively) names a register in any supported
/// architecture.
pub fn is_register(token: &str) -> bool {
    let set = ALL_REGISTERS.get_or_init(|| {
        X86_REGISTERS
            .iter()
            .chain(ARM_REGISTERS)
            .chain(MIPS_REGISTERS)
            .chain(RISCV_REGISTERS)
            .copied()
            .collect()
    });

    if set.contains(token) {
        return true;
    }
    let lowered = token.to_ascii_lowercase();
    set.contains(lowered.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_architecture_recognised() {
        assert!(is_register("eax"));
        assert!(is_register("r15d"));
        assert!(is_register("x19"));
        assert!(is_register("w0"));
        assert!(is_register("lr"));
        assert!(is_register("$t0"));
        assert!(is_register("$ra"));
        assert!(is_register("$f1"));
        assert!(is_register("a0"));
        assert!(is_register("s1"));
        assert!(is_register("fa7"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(is_register("EAX"));
        assert!(is_register("Rsp"));
        assert!(is_register("$RA"));
    }

    #[test]
    fn test_non_registers() {
        assert!(!is_register("mov"));
        assert!(!is_register("loc_123"));
        assert!(!is_register("$nope"));
        assert!(!is_register(""));
    }
}
