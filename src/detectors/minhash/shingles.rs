//! Weighted n-gram shingling over token streams.
//!
//! Each shingle carries an integer insertion weight in `{1, 2, 3}`: shingles
//! made entirely of rare instructions are amplified, shingles made entirely
//! of common instructions are damped, everything else stays at the default.

/// Separator joining tokens inside a shingle. Tokens never contain
/// whitespace, so a single space is unambiguous.
pub const SHINGLE_SEPARATOR: &str = " ";

/// Default shingle size in tokens.
pub const DEFAULT_NGRAM_SIZE: usize = 3;

/// System, privileged, or otherwise distinctive instructions. A shingle
/// composed entirely of these is inserted with weight 3.
pub const RARE_INSTRUCTIONS: &[&str] = &[
    "CPUID", "RDTSC", "RDTSCP", "RDRAND", "RDSEED", "XGETBV", "VMCALL", "VMLAUNCH", "VMRESUME",
    "VMXOFF", "SYSENTER", "SYSEXIT", "SYSCALL", "SYSRET", "INT", "IRET", "IRETD", "IRETQ",
    "EMMS", "WBINVD", "INVLPG", "INVD", "SGDT", "LGDT", "SLDT", "LLDT", "LIDT", "SIDT", "STR",
    "LTR", "LMSW", "CLTS", "MONITOR", "MWAIT", "HLT", "RSM", "UD2", "RDMSR", "WRMSR", "RDPMC",
    "AESENC", "AESDEC", "PCLMULQDQ", "MOVDQA", "VPXOR", "SHA256RNDS2", "CLFLUSH", "MFENCE",
    "LFENCE", "SFENCE",
];

/// The most common instructions, plus the normalized placeholders. A shingle
/// composed entirely of these is inserted with weight 1.
pub const COMMON_INSTRUCTIONS: &[&str] = &[
    "MOV", "PUSH", "POP", "NOP", "LEA", "ADD", "SUB", "XOR", "CMP", "AND", "OR", "NOT", "NEG",
    "JMP", "CALL", "RET", "RETN", "JE", "JNE", "JZ", "JNZ", "TEST", "INC", "DEC", "SHL", "SHR",
    "SAR", "SAL", "REG", "IMM", "MEM_SIZE", "LABEL",
];

/// A shingle plus its insertion weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shingle {
    /// Canonical shingle text (tokens joined by [`SHINGLE_SEPARATOR`])
    pub text: String,
    /// Insertion weight in `{1, 2, 3}`
    pub weight: u32,
}

/// Insertion weight for a shingle string.
///
/// 3 when every token is rare, 1 when every token is common, 2 otherwise.
pub fn shingle_weight(shingle: &str) -> u32 {
    let mut tokens = shingle.split(SHINGLE_SEPARATOR).filter(|t| !t.is_empty());
    let mut all_rare = true;
    let mut all_common = true;
    let mut any = false;

    for token in tokens.by_ref() {
        any = true;
        if !RARE_INSTRUCTIONS.contains(&token) {
            all_rare = false;
        }
        if !COMMON_INSTRUCTIONS.contains(&token) {
            all_common = false;
        }
        if !all_rare && !all_common {
            return 2;
        }
    }

    if !any {
        return 2;
    }
    if all_rare {
        3
    } else if all_common {
        1
    } else {
        2
    }
}

/// Produce the contiguous weighted n-gram multiset for a token stream.
///
/// Streams shorter than `k` yield a single shingle covering the full
/// sequence, at the default weight. Empty streams yield nothing.
pub fn create_shingles(tokens: &[String], k: usize) -> Vec<Shingle> {
    if tokens.is_empty() {
        return Vec::new();
    }

    if tokens.len() < k {
        return vec![Shingle {
            text: tokens.join(SHINGLE_SEPARATOR),
            weight: 2,
        }];
    }

    let mut shingles = Vec::with_capacity(tokens.len() - k + 1);
    for window in tokens.windows(k) {
        let text = window.join(SHINGLE_SEPARATOR);
        let weight = shingle_weight(&text);
        shingles.push(Shingle { text, weight });
    }
    shingles
}
