// Row selectors -> minimal runs of contiguous rows, so K runs cost K reads instead of N.
use std::ops::Range;

/// Collapses an ascending row selector into maximal `[start, end)` runs.
///
/// The selector must already be sorted ascending; this is not checked.
pub fn compact(selector: &[usize]) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();
    for &row in selector {
        match ranges.last_mut() {
            Some(run) if run.end == row => run.end = row + 1,
            _ => ranges.push(row..row + 1),
        }
    }
    ranges
}

/// Same as [`compact`] for a boolean mask over all rows.
pub fn compact_mask(mask: &[bool]) -> Vec<Range<usize>> {
    compact(&mask_positions(mask))
}

pub fn mask_positions(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(row, &selected)| selected.then_some(row))
        .collect()
}

/// Total rows covered by `ranges`.
pub fn covered(ranges: &[Range<usize>]) -> usize {
    ranges.iter().map(|range| range.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::{compact, compact_mask, covered, mask_positions};

    #[test]
    fn empty_and_singleton() {
        assert!(compact(&[]).is_empty());
        assert_eq!(compact(&[7]), vec![7..8]);
    }

    #[test]
    fn runs_split_on_gaps() {
        assert_eq!(compact(&[1, 2, 5]), vec![1..3, 5..6]);
        assert_eq!(compact(&[0, 1, 2, 3]), vec![0..4]);
        assert_eq!(compact(&[0, 2, 4]), vec![0..1, 2..3, 4..5]);
    }

    #[test]
    fn masks_become_positions_first() {
        let mask = [false, true, true, false, true];
        assert_eq!(mask_positions(&mask), vec![1, 2, 4]);
        assert_eq!(compact_mask(&mask), vec![1..3, 4..5]);
        assert!(compact_mask(&[false, false]).is_empty());
    }

    #[test]
    fn expanding_ranges_reproduces_selector() {
        let selectors: [&[usize]; 4] = [&[3, 4, 5, 9, 10, 42], &[0], &[1, 3, 5, 7], &[2, 3, 4, 5, 6]];
        for selector in selectors {
            let ranges = compact(selector);
            let expanded: Vec<usize> = ranges.iter().cloned().flatten().collect();
            assert_eq!(expanded, selector);
            assert_eq!(covered(&ranges), selector.len());
            assert!(ranges.len() <= selector.len());
            let adjacent = selector.windows(2).any(|w| w[1] == w[0] + 1);
            assert_eq!(ranges.len() == selector.len(), !adjacent);
        }
    }
}
