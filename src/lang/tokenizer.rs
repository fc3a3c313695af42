//! Assembly tokenizer and canonical normalizer.
//!
//! The tokenizer is total: any byte sequence produces a token stream without
//! failing. Comments and whitespace are always dropped; with generalization
//! on, registers, immediates, labels, and memory-size hints collapse to the
//! placeholders `REG`, `IMM`, `LABEL`, and `MEM_SIZE` so that register
//! renaming and constant changes do not affect similarity.

use sha2::{Digest, Sha256};

use crate::lang::registers::is_register;

/// How tokens are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizationMode {
    /// Collapse registers/immediates/labels/size hints to placeholders.
    Generalize,
    /// Emit tokens as their uppercased source form.
    Raw,
}

/// Memory-size hint keywords, lowercased.
const MEM_SIZE_WORDS: &[&str] = &["dword", "word", "byte", "qword", "ptr"];

/// Placeholder emitted for any register token.
pub const TOKEN_REG: &str = "REG";
/// Placeholder emitted for any immediate operand.
pub const TOKEN_IMM: &str = "IMM";
/// Placeholder emitted for label definitions and references.
pub const TOKEN_LABEL: &str = "LABEL";
/// Placeholder emitted for memory-size hints.
pub const TOKEN_MEM_SIZE: &str = "MEM_SIZE";

/// Tokenize a code snippet.
///
/// Never fails; unrecognized printable characters become single-character
/// punctuation tokens, control and non-ASCII bytes are skipped.
pub fn tokenize(code: &str, mode: TokenizationMode) -> Vec<String> {
    let mut tokens = Vec::new();
    for line in code.lines() {
        tokenize_line(line, mode, &mut tokens);
    }
    tokens
}

/// Normalize a snippet: tokenize with generalization on and join with
/// single spaces. Stable across whitespace and comment reformatting.
pub fn normalize(code: &str) -> String {
    tokenize(code, TokenizationMode::Generalize).join(" ")
}

/// Hex-encoded SHA-256 of the normalized snippet; the snippet's identity.
pub fn string_checksum(code: &str) -> String {
    let normalized = normalize(code);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Lowercase hex encoding of a byte slice.
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn tokenize_line(line: &str, mode: TokenizationMode, tokens: &mut Vec<String>) {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        // Comments run to end of line. `#` only opens a comment when it is
        // not an assembler-style immediate like `#8` or `#0x10`.
        if c == ';' {
            return;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            return;
        }
        if c == '#' && !chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) {
            return;
        }

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Assembler-style immediate: `#` followed by a number.
        if c == '#' {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            push_immediate(&chars[start..i], mode, tokens);
            continue;
        }

        // Numeric immediate: decimal, 0x hex, 0b binary, or trailing-h hex.
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            push_immediate(&chars[start..i], mode, tokens);
            continue;
        }

        // Identifier: mnemonic, register, label, or size hint. `$` begins
        // MIPS registers, `.` and `?` begin label spellings.
        if c.is_ascii_alphabetic() || matches!(c, '_' | '.' | '$' | '?' | '@') {
            let start = i;
            i += 1;
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '.' | '$' | '?' | '@'))
            {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();

            // A trailing colon makes this a label definition.
            if chars.get(i) == Some(&':') {
                i += 1;
                match mode {
                    TokenizationMode::Generalize => tokens.push(TOKEN_LABEL.to_string()),
                    TokenizationMode::Raw => {
                        let mut raw = word.to_uppercase();
                        raw.push(':');
                        tokens.push(raw);
                    }
                }
                continue;
            }

            push_word(&word, mode, tokens);
            continue;
        }

        // Everything else: single-character punctuation, verbatim. Skip
        // control characters and non-ASCII bytes.
        if c.is_ascii() && !c.is_ascii_control() {
            tokens.push(c.to_string());
        }
        i += 1;
    }
}

fn push_immediate(lexeme: &[char], mode: TokenizationMode, tokens: &mut Vec<String>) {
    match mode {
        TokenizationMode::Generalize => tokens.push(TOKEN_IMM.to_string()),
        TokenizationMode::Raw => {
            let raw: String = lexeme.iter().collect();
            tokens.push(raw.to_uppercase());
        }
    }
}

fn push_word(word: &str, mode: TokenizationMode, tokens: &mut Vec<String>) {
    if mode == TokenizationMode::Raw {
        tokens.push(word.to_uppercase());
        return;
    }

    if is_register(word) {
        tokens.push(TOKEN_REG.to_string());
    } else if MEM_SIZE_WORDS.contains(&word.to_ascii_lowercase().as_str()) {
        tokens.push(TOKEN_MEM_SIZE.to_string());
    } else if looks_like_label(word) {
        tokens.push(TOKEN_LABEL.to_string());
    } else {
        tokens.push(word.to_uppercase());
    }
}

/// Heuristic for label references: compiler- and disassembler-style label
/// spellings (`.L1`, `?_0001`, `loc_401000`, `sub_1234`).
fn looks_like_label(word: &str) -> bool {
    if word.starts_with('.') || word.starts_with('?') {
        return true;
    }
    let lowered = word.to_ascii_lowercase();
    lowered.starts_with("loc_") || lowered.starts_with("sub_") || lowered.starts_with("lbl_")
}
