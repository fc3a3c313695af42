//! Simplified control-flow graph extraction and similarity.
//!
//! Blocks are split line-by-line: a boundary opens at start-of-stream, after
//! any branch, or at a label definition; it closes after a branch or return,
//! before a label, or at end-of-stream. Branch targets only contribute edges
//! when the label is defined in the same snippet.

use std::collections::HashMap;

/// Branch mnemonics that terminate a basic block with both a fall-through
/// and (when resolvable) a target edge.
const CONDITIONAL_BRANCHES: &[&str] = &[
    "JZ", "JNZ", "JE", "JNE", "JG", "JGE", "JL", "JLE", "JA", "JAE", "JB", "JBE", "JO", "JNO",
    "JS", "JNS", "JP", "JNP", "JCXZ", "JECXZ", "JRCXZ", "LOOP", "LOOPZ", "LOOPNZ", "LOOPE",
    "LOOPNE", "BEQ", "BNE", "BLE", "BGT", "BLT", "BGE", "BLTZ", "BGEZ", "BNEZ", "BEQZ", "CBZ",
    "CBNZ", "BL", "CALL",
];

/// Branch mnemonics that terminate a basic block with only a target edge.
const UNCONDITIONAL_BRANCHES: &[&str] = &["JMP", "B", "BR", "J"];

/// Return mnemonics: terminate a block with no successor.
const RETURNS: &[&str] = &["RET", "RETN", "RETF", "RETQ"];

/// Simplified control-flow graph of one snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFlowGraph {
    /// Number of basic blocks
    pub num_blocks: usize,
    /// Number of control-flow edges
    pub num_edges: usize,
    /// Instruction count per block
    pub block_sizes: Vec<usize>,
    /// Adjacency list: block index to successor indices
    pub adj: Vec<Vec<usize>>,
}

impl ControlFlowGraph {
    /// An empty graph (no code).
    pub fn empty() -> Self {
        Self {
            num_blocks: 0,
            num_edges: 0,
            block_sizes: Vec::new(),
            adj: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Terminator<'a> {
    FallThrough,
    Conditional(Option<&'a str>),
    Unconditional(Option<&'a str>),
    Return,
}

/// Extract the basic-block graph from assembly text.
pub fn extract(code: &str) -> ControlFlowGraph {
    let mut blocks: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut label_to_block: HashMap<String, usize> = HashMap::new();

    for raw_line in code.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if let Some((label, remainder)) = split_label(line) {
            // Every label opens a new block.
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            label_to_block.insert(label.to_string(), blocks.len());
            if remainder.is_empty() {
                continue;
            }
            current.push(remainder.to_string());
            if is_terminator(remainder) {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }

        current.push(line.to_string());
        if is_terminator(line) {
            blocks.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        blocks.push(current);
    }

    if blocks.is_empty() {
        return ControlFlowGraph::empty();
    }

    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); blocks.len()];
    for (i, block) in blocks.iter().enumerate() {
        let successor = if i + 1 < blocks.len() { Some(i + 1) } else { None };

        let terminator = match block.last() {
            Some(last) => classify(last),
            // Label-only block falls through.
            None => Terminator::FallThrough,
        };

        match terminator {
            Terminator::Return => {}
            Terminator::Unconditional(target) => {
                if let Some(t) = target.and_then(|t| label_to_block.get(t)) {
                    adj[i].push(*t);
                }
            }
            Terminator::Conditional(target) => {
                if let Some(next) = successor {
                    adj[i].push(next);
                }
                if let Some(t) = target.and_then(|t| label_to_block.get(t)) {
                    adj[i].push(*t);
                }
            }
            Terminator::FallThrough => {
                if let Some(next) = successor {
                    adj[i].push(next);
                }
            }
        }
    }

    let num_edges = adj.iter().map(Vec::len).sum();
    let block_sizes = blocks.iter().map(Vec::len).collect();

    ControlFlowGraph {
        num_blocks: blocks.len(),
        num_edges,
        block_sizes,
        adj,
    }
}

/// Structural similarity between two CFGs, in `[0, 1]`.
///
/// Weighted combination of block-count ratio (0.4), edge-count ratio (0.3),
/// and cosine similarity of power-of-two block-size histograms (0.3).
pub fn cfg_similarity(g1: &ControlFlowGraph, g2: &ControlFlowGraph) -> f64 {
    if g1.num_blocks == 0 && g2.num_blocks == 0 {
        return 1.0;
    }
    if g1.num_blocks == 0 || g2.num_blocks == 0 {
        return 0.0;
    }

    let size_ratio =
        g1.num_blocks.min(g2.num_blocks) as f64 / g1.num_blocks.max(g2.num_blocks) as f64;

    let edge_ratio = if g1.num_edges == 0 && g2.num_edges == 0 {
        1.0
    } else {
        g1.num_edges.min(g2.num_edges) as f64 / g1.num_edges.max(g2.num_edges).max(1) as f64
    };

    let h1 = size_histogram(&g1.block_sizes);
    let h2 = size_histogram(&g2.block_sizes);
    let hist_cos = cosine(&h1, &h2);

    (0.4 * size_ratio + 0.3 * edge_ratio + 0.3 * hist_cos).clamp(0.0, 1.0)
}

/// Histogram of block sizes bucketed by powers of two:
/// `[1,2) [2,4) [4,8) [8,16) [16,32) [32,inf)`.
fn size_histogram(sizes: &[usize]) -> [f64; 6] {
    let mut hist = [0.0; 6];
    for &s in sizes {
        let bucket = match s {
            0..=1 => 0,
            2..=3 => 1,
            4..=7 => 2,
            8..=15 => 3,
            16..=31 => 4,
            _ => 5,
        };
        hist[bucket] += 1.0;
    }
    hist
}

fn cosine(a: &[f64; 6], b: &[f64; 6]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag1: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag2: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if mag1 == 0.0 || mag2 == 0.0 {
        return 0.0;
    }
    dot / (mag1 * mag2)
}

/// Drop the comment suffix of a line. `#` opens a comment only when not
/// immediately followed by a digit (ARM immediates).
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b';' => return &line[..i],
            b'/' if bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            b'#' if !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => return &line[..i],
            _ => {}
        }
    }
    line
}

/// If the line begins with a label definition, return `(label, remainder)`.
fn split_label(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let head = &line[..colon];
    if head.is_empty()
        || !head
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '?' | '@'))
    {
        return None;
    }
    Some((head, line[colon + 1..].trim()))
}

fn mnemonic(line: &str) -> Option<String> {
    line.split_whitespace().next().map(str::to_uppercase)
}

fn branch_target(line: &str) -> Option<&str> {
    line.split_whitespace().last().filter(|t| {
        // The mnemonic itself is not a target.
        line.split_whitespace().count() > 1 && !t.is_empty()
    })
}

fn classify(line: &str) -> Terminator<'_> {
    let Some(m) = mnemonic(line) else {
        return Terminator::FallThrough;
    };
    let m = m.as_str();

    if RETURNS.contains(&m) {
        return Terminator::Return;
    }
    // `jr $ra` is the MIPS function return.
    if m == "JR" {
        let target = branch_target(line).map(str::to_ascii_lowercase);
        if target.as_deref() == Some("$ra") {
            return Terminator::Return;
        }
        return Terminator::Unconditional(branch_target(line));
    }
    if UNCONDITIONAL_BRANCHES.contains(&m) {
        return Terminator::Unconditional(branch_target(line));
    }
    if CONDITIONAL_BRANCHES.contains(&m) {
        return Terminator::Conditional(branch_target(line));
    }
    Terminator::FallThrough
}

fn is_terminator(line: &str) -> bool {
    !matches!(classify(line), Terminator::FallThrough)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_straight_line_is_one_block() {
        let g = extract("mov eax, ebx\nadd eax, 1\nret");
        assert_eq!(g.num_blocks, 1);
        assert_eq!(g.num_edges, 0);
        assert_eq!(g.block_sizes, vec![3]);
    }

    #[test]
    fn test_conditional_branch_splits_blocks() {
        let code = "cmp eax, 0\njne skip\nmov eax, 1\nskip:\nret";
        let g = extract(code);
        // [cmp, jne] [mov] [ret]
        assert_eq!(g.num_blocks, 3);
        // jne: fall-through + resolved target; mov block: fall-through
        assert_eq!(g.num_edges, 3);
        assert_eq!(g.adj[0], vec![1, 2]);
        assert_eq!(g.adj[1], vec![2]);
        assert!(g.adj[2].is_empty());
    }

    #[test]
    fn test_unconditional_jump_has_no_fallthrough() {
        let code = "start:\nmov eax, 1\njmp done\nmov eax, 2\ndone:\nret";
        let g = extract(code);
        assert_eq!(g.num_blocks, 3);
        // jmp resolves to the `done` block only; middle block falls through.
        assert_eq!(g.adj[0], vec![2]);
        assert_eq!(g.adj[1], vec![2]);
    }

    #[test]
    fn test_unresolved_target_contributes_no_edge() {
        let g = extract("jmp elsewhere\nret");
        assert_eq!(g.num_blocks, 2);
        assert_eq!(g.num_edges, 0);
    }

    #[test]
    fn test_mips_jr_ra_is_return() {
        let g = extract("addi $t0, $zero, 1\njr $ra");
        assert_eq!(g.num_blocks, 1);
        assert_eq!(g.num_edges, 0);
    }

    #[test]
    fn test_empty_graphs_similar() {
        assert_relative_eq!(
            cfg_similarity(&ControlFlowGraph::empty(), &ControlFlowGraph::empty()),
            1.0
        );
        let g = extract("ret");
        assert_relative_eq!(cfg_similarity(&g, &ControlFlowGraph::empty()), 0.0);
    }

    #[test]
    fn test_identical_graphs_score_one() {
        let code = "cmp eax, 0\njne out\nmov eax, 1\nout:\nret";
        let g1 = extract(code);
        let g2 = extract(code);
        assert_relative_eq!(cfg_similarity(&g1, &g2), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_different_shapes_score_below_one() {
        let g1 = extract("ret");
        let g2 = extract("a:\njne a\nb:\njne b\nc:\nret");
        let s = cfg_similarity(&g1, &g2);
        assert!(s > 0.0 && s < 1.0, "got {s}");
    }

    #[test]
    fn test_label_with_inline_instruction() {
        let g = extract("top: mov eax, 1\njmp top");
        assert_eq!(g.num_blocks, 1);
        // Single block [mov, jmp] looping to itself.
        assert_eq!(g.adj[0], vec![0]);
    }
}
