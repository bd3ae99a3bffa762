//! Resampling plans.
//!
//! A resampling replaces member `i` with a copy of member `parents[i]`. The
//! copies happen in place, so they must be ordered: a member may only be
//! overwritten once no pending copy still reads from it. Cycles (for example
//! two members swapping states) are broken by staging one member on the host.

use std::collections::BTreeMap;

use crate::error::{EnsembleError, Result};

/// One step of a resampling plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOp {
    /// Copy member `source` into member `target` on the device.
    Copy {
        /// Member that is overwritten
        target: usize,
        /// Member that is read
        source: usize,
    },
    /// Download both generations of `member` to the host.
    Stage {
        /// Member that is staged
        member: usize,
    },
    /// Upload the staged copy of `member` into `target`.
    CopyStaged {
        /// Member that is overwritten
        target: usize,
        /// Member whose staged copy is read
        member: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Member(usize),
    Staged(usize),
}

/// Order the copies of a resampling so that every member receives the state
/// its parent had before resampling started.
///
/// Members that keep their own state produce no operation.
pub fn plan_copies(parents: &[usize]) -> Result<Vec<CopyOp>> {
    let members = parents.len();
    if let Some((target, &parent)) = parents.iter().enumerate().find(|&(_, &p)| p >= members) {
        return Err(EnsembleError::InvalidResample(format!(
            "member {} has parent {}, but the ensemble has {} members",
            target, parent, members
        )));
    }

    let mut pending: BTreeMap<usize, Source> = parents
        .iter()
        .enumerate()
        .filter(|&(target, &parent)| target != parent)
        .map(|(target, &parent)| (target, Source::Member(parent)))
        .collect();
    let mut ops = Vec::with_capacity(pending.len());

    while let Some(&first) = pending.keys().next() {
        let ready: Vec<usize> = pending
            .keys()
            .copied()
            .filter(|&target| !pending.values().any(|&s| s == Source::Member(target)))
            .collect();

        if ready.is_empty() {
            // Every pending target is still read by someone: a cycle
            ops.push(CopyOp::Stage { member: first });
            for source in pending.values_mut() {
                if *source == Source::Member(first) {
                    *source = Source::Staged(first);
                }
            }
            continue;
        }

        for target in ready {
            match pending.remove(&target) {
                Some(Source::Member(source)) => ops.push(CopyOp::Copy { target, source }),
                Some(Source::Staged(member)) => ops.push(CopyOp::CopyStaged { target, member }),
                None => {}
            }
        }
    }

    Ok(ops)
}

/// Systematic resampling: one uniform `offset` in `[0, 1)` places `n` evenly
/// spaced pointers over the cumulative weights.
///
/// Weights need not be normalized. The returned parent indices are
/// non-decreasing.
pub fn systematic_resample(weights: &[f64], offset: f64) -> Result<Vec<usize>> {
    if weights.is_empty() {
        return Err(EnsembleError::InvalidResample("no weights given".into()));
    }
    if let Some(w) = weights.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
        return Err(EnsembleError::InvalidResample(format!(
            "weights must be finite and non-negative, got {}",
            w
        )));
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(EnsembleError::InvalidResample("weights sum to zero".into()));
    }
    if !(0.0..1.0).contains(&offset) {
        return Err(EnsembleError::InvalidResample(format!(
            "offset must lie in [0, 1), got {}",
            offset
        )));
    }

    let n = weights.len();
    let mut parents = Vec::with_capacity(n);
    let mut parent = 0;
    let mut cumulative = weights[0] / total;
    for k in 0..n {
        let pointer = (k as f64 + offset) / n as f64;
        while pointer >= cumulative && parent < n - 1 {
            parent += 1;
            cumulative += weights[parent] / total;
        }
        parents.push(parent);
    }
    Ok(parents)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Apply a plan to plain values and return the result.
    fn apply(plan: &[CopyOp], values: &[char]) -> Vec<char> {
        let mut values = values.to_vec();
        let mut staged = BTreeMap::new();
        for op in plan {
            match *op {
                CopyOp::Copy { target, source } => values[target] = values[source],
                CopyOp::Stage { member } => {
                    staged.insert(member, values[member]);
                }
                CopyOp::CopyStaged { target, member } => values[target] = staged[&member],
            }
        }
        values
    }

    #[test]
    fn test_identity_is_empty() {
        assert!(plan_copies(&[0, 1, 2, 3]).unwrap().is_empty());
    }

    #[test]
    fn test_duplicates_are_ordered() {
        let plan = plan_copies(&[0, 0, 1]).unwrap();
        assert_eq!(
            plan,
            vec![
                CopyOp::Copy { target: 2, source: 1 },
                CopyOp::Copy { target: 1, source: 0 },
            ]
        );
        assert_eq!(apply(&plan, &['a', 'b', 'c']), vec!['a', 'a', 'b']);
    }

    #[test]
    fn test_swap_stages_one_member() {
        let plan = plan_copies(&[1, 0, 2]).unwrap();
        assert_eq!(plan[0], CopyOp::Stage { member: 0 });
        assert_eq!(plan.iter().filter(|op| matches!(op, CopyOp::Stage { .. })).count(), 1);
        assert_eq!(apply(&plan, &['a', 'b', 'c']), vec!['b', 'a', 'c']);
    }

    #[test]
    fn test_rotation_and_chain() {
        let values = ['a', 'b', 'c', 'd', 'e'];
        for parents in [[1, 2, 3, 4, 0], [4, 0, 1, 2, 3], [1, 0, 3, 4, 2], [2, 2, 2, 0, 3]] {
            let plan = plan_copies(&parents).unwrap();
            let expected: Vec<char> = parents.iter().map(|&p| values[p]).collect();
            assert_eq!(apply(&plan, &values), expected, "parents {parents:?}");
        }
    }

    #[test]
    fn test_out_of_range_parent() {
        assert!(matches!(
            plan_copies(&[0, 3, 1]),
            Err(EnsembleError::InvalidResample(_))
        ));
    }

    #[test]
    fn test_systematic_resample() {
        assert_eq!(systematic_resample(&[1.0, 1.0, 1.0, 1.0], 0.5).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(systematic_resample(&[0.0, 1.0, 0.0], 0.2).unwrap(), vec![1, 1, 1]);
        assert_eq!(systematic_resample(&[3.0, 1.0], 0.25).unwrap(), vec![0, 0]);
        assert_eq!(systematic_resample(&[3.0, 1.0], 0.75).unwrap(), vec![0, 1]);

        let parents = systematic_resample(&[0.1, 0.4, 0.2, 0.3, 0.0], 0.9).unwrap();
        assert!(parents.windows(2).all(|w| w[0] <= w[1]));
        assert!(!parents.contains(&4));
    }

    #[test]
    fn test_systematic_resample_rejects_bad_input() {
        assert!(systematic_resample(&[], 0.5).is_err());
        assert!(systematic_resample(&[0.0, 0.0], 0.5).is_err());
        assert!(systematic_resample(&[1.0, -1.0], 0.5).is_err());
        assert!(systematic_resample(&[1.0, f64::NAN], 0.5).is_err());
        assert!(systematic_resample(&[1.0, 1.0], 1.0).is_err());
    }
}
