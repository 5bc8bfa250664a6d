use crate::oracle::CandidateResult;
use serde::{Deserialize, Serialize};

/// Forward/reverse candidates whose melting temperatures are close enough.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcceptedPair {
    pub left_index: usize,
    pub right_index: usize,
    pub tm_diff: f64,
}

/// First pair in scan order (left-major) with `|tm_left - tm_right| < max_tm_diff`.
pub fn first_acceptable_pair(result: &CandidateResult, max_tm_diff: f64) -> Option<AcceptedPair> {
    result.left.iter().find_map(|left| {
        result.right.iter().find_map(|right| {
            let tm_diff = (right.tm - left.tm).abs();
            (tm_diff < max_tm_diff).then_some(AcceptedPair {
                left_index: left.index,
                right_index: right.index,
                tm_diff,
            })
        })
    })
}

pub fn has_acceptable_pair(result: &CandidateResult, max_tm_diff: f64) -> bool {
    first_acceptable_pair(result, max_tm_diff).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::mock::record_with;

    fn result(left: &[f64], right: &[f64]) -> CandidateResult {
        CandidateResult::from_record(record_with(left, right)).unwrap()
    }

    #[test]
    fn test_empty_sides_never_accept() {
        assert!(!has_acceptable_pair(&result(&[], &[]), 2.0));
        assert!(!has_acceptable_pair(&result(&[58.0], &[]), 2.0));
        assert!(!has_acceptable_pair(&result(&[], &[58.0]), 2.0));
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(!has_acceptable_pair(&result(&[58.0], &[60.0]), 2.0));
        assert!(has_acceptable_pair(&result(&[58.0], &[59.9]), 2.0));
        assert!(has_acceptable_pair(&result(&[60.5], &[59.0]), 2.0));
    }

    #[test]
    fn test_first_pair_in_scan_order() {
        // Left 0 matches nothing, left 1 matches right 1 and right 2.
        let pair = first_acceptable_pair(&result(&[50.0, 60.0], &[55.0, 60.5, 60.1]), 1.0).unwrap();
        assert_eq!((pair.left_index, pair.right_index), (1, 1));
        assert!((pair.tm_diff - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_exhaustive_scan() {
        let left: Vec<f64> = (0..30).map(|i| 40.0 + i as f64 * 0.01).collect();
        let mut right: Vec<f64> = vec![90.0; 29];
        right.push(left[29] + 0.5);
        let pair = first_acceptable_pair(&result(&left, &right), 1.0).unwrap();
        assert_eq!(pair.right_index, 29);
        assert!(!has_acceptable_pair(&result(&left, &vec![90.0; 30]), 1.0));
    }
}
