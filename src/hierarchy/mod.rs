//! The distributed AMG hierarchy consumed by composite-grid setup.
//!
//! Each rank holds one [`ParLevel`] per multigrid level: its contiguous block
//! of rows of `A` (and `P` on all but the coarsest level), the restricted
//! residual, the C/F splitting of its rows and the one-hop communication
//! pattern of `A`.

pub mod distribute;
pub mod serial;

use crate::amgdd_error::AmgDdError;
use std::collections::BTreeSet;
use std::ops::Range;

/// Locally owned rows of a row-distributed sparse matrix.
///
/// Column indices are global.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParCsr {
    pub row_ptr: Vec<usize>,
    pub col_ind: Vec<usize>,
    pub values: Vec<f64>,
}

impl ParCsr {
    pub fn empty() -> Self {
        Self {
            row_ptr: vec![0],
            col_ind: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build from per-row `(global column, value)` lists.
    pub fn from_rows<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (usize, f64)>,
    {
        let mut out = Self::empty();
        for row in rows {
            for (c, v) in row {
                out.col_ind.push(c);
                out.values.push(v);
            }
            out.row_ptr.push(out.col_ind.len());
        }
        out
    }

    pub fn num_rows(&self) -> usize {
        self.row_ptr.len().saturating_sub(1)
    }

    pub fn nnz(&self) -> usize {
        self.col_ind.len()
    }

    /// `(global columns, values)` of local row `i`.
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let r = self.row_ptr[i]..self.row_ptr[i + 1];
        (&self.col_ind[r.clone()], &self.values[r])
    }

    fn check(&self, level: usize, what: &str) -> Result<(), AmgDdError> {
        let bad = |reason: String| AmgDdError::InvalidHierarchy {
            level,
            reason: format!("{what}: {reason}"),
        };
        if self.row_ptr.first() != Some(&0) {
            return Err(bad("row_ptr must start at 0".into()));
        }
        if self.row_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(bad("row_ptr is not monotone".into()));
        }
        if self.row_ptr.last() != Some(&self.col_ind.len())
            || self.col_ind.len() != self.values.len()
        {
            return Err(bad(format!(
                "row_ptr ends at {:?} but {} columns and {} values are stored",
                self.row_ptr.last(),
                self.col_ind.len(),
                self.values.len()
            )));
        }
        Ok(())
    }
}

/// The one-hop neighbor pattern of a level's matrix `A`.
///
/// Rows `send_map_elmts[send_map_starts[i]..send_map_starts[i+1]]` (local
/// indices) are those `send_procs[i]` needs to apply `A` to its own rows.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OneHopPattern {
    pub send_procs: Vec<usize>,
    pub send_map_starts: Vec<usize>,
    pub send_map_elmts: Vec<usize>,
    pub recv_procs: Vec<usize>,
}

impl OneHopPattern {
    pub fn num_sends(&self) -> usize {
        self.send_procs.len()
    }

    /// Local rows sent to the `i`-th send proc.
    pub fn send_elements(&self, i: usize) -> &[usize] {
        &self.send_map_elmts[self.send_map_starts[i]..self.send_map_starts[i + 1]]
    }
}

/// Coarse/fine classification of a row.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CfMarker {
    Coarse,
    Fine,
}

/// One rank's share of one multigrid level.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParLevel {
    /// Global index of the first owned row.
    pub first_row: usize,
    pub num_global_rows: usize,
    pub a: ParCsr,
    /// Interpolation rows with global coarse column indices; `None` on the coarsest level.
    pub p: Option<ParCsr>,
    /// Residual `f - A u` of the owned rows, not the right-hand side `f`.
    /// Setup copies it as given; coarser levels carry the restricted residual.
    pub residual: Vec<f64>,
    pub cf_marker: Vec<CfMarker>,
    pub comm_pattern: OneHopPattern,
}

impl ParLevel {
    pub fn num_owned(&self) -> usize {
        self.a.num_rows()
    }

    pub fn owned_range(&self) -> Range<usize> {
        self.first_row..self.first_row + self.num_owned()
    }
}

/// The per-rank view of a complete AMG hierarchy, finest level first.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AmgHierarchy {
    pub levels: Vec<ParLevel>,
}

impl AmgHierarchy {
    pub fn new(levels: Vec<ParLevel>) -> Self {
        Self { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// First global row of the next coarser level, or 0 on the coarsest.
    pub fn coarse_first_index(&self, level: usize) -> usize {
        self.levels.get(level + 1).map_or(0, |l| l.first_row)
    }

    /// Check shapes and the reciprocity of every one-hop pattern.
    pub fn validate(&self) -> Result<(), AmgDdError> {
        if self.levels.is_empty() {
            return Err(AmgDdError::InvalidHierarchy {
                level: 0,
                reason: "hierarchy has no levels".into(),
            });
        }
        let coarsest = self.levels.len() - 1;
        for (level, l) in self.levels.iter().enumerate() {
            let bad = |reason: String| AmgDdError::InvalidHierarchy { level, reason };
            l.a.check(level, "A")?;
            let n = l.num_owned();
            if l.owned_range().end > l.num_global_rows {
                return Err(bad(format!(
                    "owned rows {:?} exceed {} global rows",
                    l.owned_range(),
                    l.num_global_rows
                )));
            }
            if l.residual.len() != n || l.cf_marker.len() != n {
                return Err(bad(format!(
                    "{n} rows but {} residual entries and {} C/F markers",
                    l.residual.len(),
                    l.cf_marker.len()
                )));
            }
            if let Some(&c) = l.a.col_ind.iter().find(|&&c| c >= l.num_global_rows) {
                return Err(bad(format!("A column {c} out of range")));
            }
            match (&l.p, level == coarsest) {
                (Some(_), true) => return Err(bad("P given on the coarsest level".into())),
                (None, false) => return Err(bad("P missing below the coarsest level".into())),
                (Some(p), false) => {
                    p.check(level, "P")?;
                    if p.num_rows() != n {
                        return Err(bad(format!("P has {} rows, A has {n}", p.num_rows())));
                    }
                    let coarse = &self.levels[level + 1];
                    if let Some(&c) = p.col_ind.iter().find(|&&c| c >= coarse.num_global_rows) {
                        return Err(bad(format!("P column {c} out of range")));
                    }
                    let num_c = l.cf_marker.iter().filter(|&&m| m == CfMarker::Coarse).count();
                    if num_c != coarse.num_owned() {
                        return Err(bad(format!(
                            "{num_c} C-points but the next level owns {} rows",
                            coarse.num_owned()
                        )));
                    }
                }
                (None, true) => {}
            }

            let pat = &l.comm_pattern;
            if pat.send_map_starts.len() != pat.send_procs.len() + 1
                && !(pat.send_procs.is_empty() && pat.send_map_starts.len() <= 1)
            {
                return Err(bad("send_map_starts does not match send_procs".into()));
            }
            if !pat.send_procs.is_empty()
                && (pat.send_map_starts.windows(2).any(|w| w[0] > w[1])
                    || pat.send_map_starts.last() != Some(&pat.send_map_elmts.len()))
            {
                return Err(bad("send_map_starts is not a prefix sum of the send map".into()));
            }
            if let Some(&e) = pat.send_map_elmts.iter().find(|&&e| e >= n) {
                return Err(bad(format!("send map element {e} outside the owned rows")));
            }
            let sends: BTreeSet<usize> = pat.send_procs.iter().copied().collect();
            let recvs: BTreeSet<usize> = pat.recv_procs.iter().copied().collect();
            if let Some(&peer) = sends.symmetric_difference(&recvs).next() {
                return Err(AmgDdError::AsymmetricCommPattern { level, peer });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_level(n: usize) -> ParLevel {
        ParLevel {
            first_row: 0,
            num_global_rows: n,
            a: ParCsr::from_rows((0..n).map(|i| vec![(i, 2.0)])),
            p: None,
            residual: vec![1.0; n],
            cf_marker: vec![CfMarker::Fine; n],
            comm_pattern: OneHopPattern::default(),
        }
    }

    #[test]
    fn csr_rows() {
        let a = ParCsr::from_rows(vec![vec![(0, 2.0), (1, -1.0)], vec![(1, 2.0)]]);
        assert_eq!(a.num_rows(), 2);
        assert_eq!(a.row(0), (&[0usize, 1][..], &[2.0, -1.0][..]));
        assert_eq!(a.nnz(), 3);
    }

    #[test]
    fn single_level_is_valid() {
        AmgHierarchy::new(vec![single_level(4)]).validate().unwrap();
    }

    #[test]
    fn asymmetric_pattern_rejected() {
        let mut l = single_level(4);
        l.comm_pattern = OneHopPattern {
            send_procs: vec![1],
            send_map_starts: vec![0, 1],
            send_map_elmts: vec![3],
            recv_procs: vec![2],
        };
        let err = AmgDdError::AsymmetricCommPattern { level: 0, peer: 1 };
        assert_eq!(
            AmgHierarchy::new(vec![l]).validate().unwrap_err().to_string(),
            err.to_string()
        );
    }

    fn two_levels(num_c: usize) -> AmgHierarchy {
        let mut fine = single_level(4);
        fine.p = Some(ParCsr::from_rows((0..4).map(|i| vec![(i / 2, 1.0)])));
        for m in fine.cf_marker.iter_mut().take(num_c) {
            *m = CfMarker::Coarse;
        }
        AmgHierarchy::new(vec![fine, single_level(2)])
    }

    #[test]
    fn c_points_match_coarse_rows() {
        two_levels(2).validate().unwrap();
    }

    #[test]
    fn too_many_c_points_rejected() {
        let err = two_levels(4).validate().unwrap_err();
        assert!(matches!(err, AmgDdError::InvalidHierarchy { level: 0, .. }));
        assert!(two_levels(1).validate().is_err());
    }

    #[test]
    fn residual_length_checked() {
        let mut l = single_level(4);
        l.residual.pop();
        assert!(matches!(
            AmgHierarchy::new(vec![l]).validate(),
            Err(AmgDdError::InvalidHierarchy { level: 0, .. })
        ));
    }
}
