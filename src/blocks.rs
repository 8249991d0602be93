//! Run-length compression of classified line numbers
//!
//! Reduces the covered/missed/partially-covered line sets of a changed file
//! to maximal contiguous blocks for compact display.

use serde::{Deserialize, Serialize};

/// Coverage classification of a changed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineClass {
    Covered,
    Missed,
    PartiallyCovered,
}

/// A maximal contiguous run of lines sharing one classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub start: u32,
    pub end: u32,
    pub class: LineClass,
}

/// Compress the three disjoint line sets into one block sequence ordered by
/// start line. Blocks of different classifications are never merged, even
/// when numerically adjacent. O(n log n) sort plus O(n) scan.
pub fn compress(covered: &[u32], missed: &[u32], partial: &[u32]) -> Vec<Block> {
    let mut blocks = runs(covered, LineClass::Covered);
    blocks.extend(runs(missed, LineClass::Missed));
    blocks.extend(runs(partial, LineClass::PartiallyCovered));
    blocks.sort_by_key(|b| b.start);
    blocks
}

fn runs(lines: &[u32], class: LineClass) -> Vec<Block> {
    let mut sorted = lines.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut blocks = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return blocks;
    };
    let mut start = first;
    let mut last = first;
    for line in iter {
        if line == last + 1 {
            last = line;
        } else {
            blocks.push(Block { start, end: last, class });
            start = line;
            last = line;
        }
    }
    blocks.push(Block { start, end: last, class });
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_runs_split_on_gaps() {
        let blocks = compress(&[15, 16, 21, 22], &[], &[]);
        assert_eq!(
            blocks,
            vec![
                Block { start: 15, end: 16, class: LineClass::Covered },
                Block { start: 21, end: 22, class: LineClass::Covered },
            ]
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let blocks = compress(&[], &[], &[20, 20]);
        assert_eq!(
            blocks,
            vec![Block { start: 20, end: 20, class: LineClass::PartiallyCovered }]
        );
    }

    #[test]
    fn test_unsorted_input_is_sorted_first() {
        let blocks = compress(&[3, 1, 2], &[], &[]);
        assert_eq!(
            blocks,
            vec![Block { start: 1, end: 3, class: LineClass::Covered }]
        );
    }

    #[test]
    fn test_classifications_never_merge() {
        // 10 covered, 11 missed, 12 covered: adjacent but distinct blocks.
        let blocks = compress(&[10, 12], &[11], &[]);
        assert_eq!(
            blocks,
            vec![
                Block { start: 10, end: 10, class: LineClass::Covered },
                Block { start: 11, end: 11, class: LineClass::Missed },
                Block { start: 12, end: 12, class: LineClass::Covered },
            ]
        );
    }

    #[test]
    fn test_output_ordered_by_start_across_classes() {
        let blocks = compress(&[5, 6], &[1, 2], &[3]);
        let starts: Vec<u32> = blocks.iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![1, 3, 5]);
    }

    #[test]
    fn test_empty_input() {
        assert!(compress(&[], &[], &[]).is_empty());
    }
}
