//! Serial construction of small AMG hierarchies.
//!
//! A classical-flavoured setup good enough to drive composite-grid
//! construction in tests and demos: greedy independent-set C/F splitting,
//! interpolation that averages neighboring C-points, and the Galerkin
//! coarse operator `P^T A P`.

use crate::hierarchy::CfMarker;
use std::collections::BTreeMap;

/// Global CSR matrix.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CsrMatrix {
    pub num_rows: usize,
    pub num_cols: usize,
    pub row_ptr: Vec<usize>,
    pub col_ind: Vec<usize>,
    pub values: Vec<f64>,
}

impl CsrMatrix {
    /// Build from per-row `(column, value)` lists; columns are kept in the given order.
    pub fn from_rows<I, R>(num_cols: usize, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (usize, f64)>,
    {
        let mut m = Self {
            num_cols,
            row_ptr: vec![0],
            ..Default::default()
        };
        for row in rows {
            for (c, v) in row {
                m.col_ind.push(c);
                m.values.push(v);
            }
            m.row_ptr.push(m.col_ind.len());
        }
        m.num_rows = m.row_ptr.len() - 1;
        m
    }

    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let r = self.row_ptr[i]..self.row_ptr[i + 1];
        (&self.col_ind[r.clone()], &self.values[r])
    }

    pub fn nnz(&self) -> usize {
        self.col_ind.len()
    }

    pub fn transpose(&self) -> CsrMatrix {
        let mut rows = vec![Vec::new(); self.num_cols];
        for i in 0..self.num_rows {
            let (cols, vals) = self.row(i);
            for (&j, &v) in cols.iter().zip(vals) {
                rows[j].push((i, v));
            }
        }
        CsrMatrix::from_rows(self.num_rows, rows)
    }

    /// `self * other`, keeping every structurally produced entry.
    pub fn matmul(&self, other: &CsrMatrix) -> CsrMatrix {
        let rows = (0..self.num_rows).map(|i| {
            let mut acc: BTreeMap<usize, f64> = BTreeMap::new();
            let (cols, vals) = self.row(i);
            for (&k, &a) in cols.iter().zip(vals) {
                let (bc, bv) = other.row(k);
                for (&j, &b) in bc.iter().zip(bv) {
                    *acc.entry(j).or_insert(0.0) += a * b;
                }
            }
            acc
        });
        CsrMatrix::from_rows(other.num_cols, rows.collect::<Vec<_>>())
    }

    /// `y = self^T x`.
    pub fn transpose_apply(&self, x: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; self.num_cols];
        for (i, &xi) in x.iter().enumerate().take(self.num_rows) {
            let (cols, vals) = self.row(i);
            for (&j, &v) in cols.iter().zip(vals) {
                y[j] += v * xi;
            }
        }
        y
    }
}

/// Three-point Laplacian on `n` nodes.
pub fn laplacian_1d(n: usize) -> CsrMatrix {
    CsrMatrix::from_rows(
        n,
        (0..n).map(|i| {
            let mut r = Vec::with_capacity(3);
            if i > 0 {
                r.push((i - 1, -1.0));
            }
            r.push((i, 2.0));
            if i + 1 < n {
                r.push((i + 1, -1.0));
            }
            r
        }),
    )
}

/// Five-point Laplacian on an `nx × ny` grid, numbered block by block over a
/// `px × py` grid of ranks so each rank owns one contiguous range of rows.
///
/// Returns the matrix and the `px * py + 1` row starts of the rank blocks.
pub fn laplacian_2d_blocked(nx: usize, ny: usize, px: usize, py: usize) -> (CsrMatrix, Vec<usize>) {
    let split = |n: usize, p: usize| -> Vec<usize> { (0..=p).map(|k| k * n / p).collect() };
    let xs = split(nx, px);
    let ys = split(ny, py);

    let mut id = vec![0usize; nx * ny];
    let mut starts = vec![0];
    let mut next = 0;
    for by in 0..py {
        for bx in 0..px {
            for y in ys[by]..ys[by + 1] {
                for x in xs[bx]..xs[bx + 1] {
                    id[y * nx + x] = next;
                    next += 1;
                }
            }
            starts.push(next);
        }
    }

    let mut rows = vec![Vec::new(); nx * ny];
    for y in 0..ny {
        for x in 0..nx {
            let mut r = vec![(id[y * nx + x], 4.0)];
            if x > 0 {
                r.push((id[y * nx + x - 1], -1.0));
            }
            if x + 1 < nx {
                r.push((id[y * nx + x + 1], -1.0));
            }
            if y > 0 {
                r.push((id[(y - 1) * nx + x], -1.0));
            }
            if y + 1 < ny {
                r.push((id[(y + 1) * nx + x], -1.0));
            }
            r.sort_unstable_by_key(|&(c, _)| c);
            rows[id[y * nx + x]] = r;
        }
    }
    (CsrMatrix::from_rows(nx * ny, rows), starts)
}

/// Greedy maximal independent set in row order: an unmarked row becomes a
/// C-point and its off-diagonal neighbors F-points.
pub fn greedy_cf_split(a: &CsrMatrix) -> Vec<CfMarker> {
    let mut marker: Vec<Option<CfMarker>> = vec![None; a.num_rows];
    for i in 0..a.num_rows {
        if marker[i].is_some() {
            continue;
        }
        marker[i] = Some(CfMarker::Coarse);
        for &j in a.row(i).0 {
            if j != i && marker[j].is_none() {
                marker[j] = Some(CfMarker::Fine);
            }
        }
    }
    marker.into_iter().map(|m| m.unwrap_or(CfMarker::Fine)).collect()
}

/// C-points interpolate by injection, F-points average their C neighbors.
pub fn interpolation(a: &CsrMatrix, cf: &[CfMarker]) -> CsrMatrix {
    let mut coarse_index = vec![None; cf.len()];
    let mut nc = 0;
    for (i, m) in cf.iter().enumerate() {
        if *m == CfMarker::Coarse {
            coarse_index[i] = Some(nc);
            nc += 1;
        }
    }
    let rows = (0..a.num_rows).map(|i| match coarse_index[i] {
        Some(c) => vec![(c, 1.0)],
        None => {
            let cs: Vec<usize> = a.row(i).0.iter().filter_map(|&j| coarse_index[j]).collect();
            let w = 1.0 / cs.len().max(1) as f64;
            cs.into_iter().map(|c| (c, w)).collect()
        }
    });
    CsrMatrix::from_rows(nc, rows.collect::<Vec<_>>())
}

/// `P^T A P`.
pub fn galerkin(a: &CsrMatrix, p: &CsrMatrix) -> CsrMatrix {
    p.transpose().matmul(&a.matmul(p))
}

/// One level of a serial hierarchy.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SerialLevel {
    pub a: CsrMatrix,
    /// `None` on the coarsest level.
    pub p: Option<CsrMatrix>,
    pub residual: Vec<f64>,
    pub cf_marker: Vec<CfMarker>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SerialHierarchy {
    pub levels: Vec<SerialLevel>,
}

/// Coarsen `a` until `max_levels` levels exist, the operator has at most
/// `min_coarse_size` rows, or coarsening stalls.
///
/// `residual` is the finest-level residual `f - A u`; pass `f` only for a zero
/// initial guess. Coarser residuals are restricted by `P^T`.
pub fn build_hierarchy(
    a: CsrMatrix,
    residual: Vec<f64>,
    max_levels: usize,
    min_coarse_size: usize,
) -> SerialHierarchy {
    let mut levels = Vec::new();
    let mut a = a;
    let mut residual = residual;
    loop {
        let n = a.num_rows;
        let last = levels.len() + 1 >= max_levels || n <= min_coarse_size;
        let cf = greedy_cf_split(&a);
        let nc = cf.iter().filter(|m| **m == CfMarker::Coarse).count();
        if last || nc == 0 || nc == n {
            levels.push(SerialLevel {
                a,
                p: None,
                residual,
                cf_marker: vec![CfMarker::Fine; n],
            });
            break;
        }
        let p = interpolation(&a, &cf);
        let coarse_a = galerkin(&a, &p);
        let coarse_r = p.transpose_apply(&residual);
        log::debug!("serial level {}: {n} rows -> {nc} coarse", levels.len());
        levels.push(SerialLevel {
            a,
            p: Some(p),
            residual,
            cf_marker: cf,
        });
        a = coarse_a;
        residual = coarse_r;
    }
    SerialHierarchy { levels }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn laplacian_1d_shape() {
        let a = laplacian_1d(4);
        assert_eq!(a.row_ptr, vec![0, 2, 5, 8, 10]);
        assert_eq!(a.row(1), (&[0usize, 1, 2][..], &[-1.0, 2.0, -1.0][..]));
    }

    #[test]
    fn blocked_numbering_is_contiguous_per_block() {
        let (a, starts) = laplacian_2d_blocked(4, 4, 2, 2);
        assert_eq!(starts, vec![0, 4, 8, 12, 16]);
        assert_eq!(a.num_rows, 16);
        // corner of block 0 touches block 1 to its right and block 2 above
        let (cols, _) = a.row(3);
        assert_eq!(cols, &[1, 2, 3, 6, 9]);
        assert_eq!(a.transpose(), a);
    }

    #[test]
    fn chain_splits_every_other_point() {
        let cf = greedy_cf_split(&laplacian_1d(5));
        use CfMarker::*;
        assert_eq!(cf, vec![Coarse, Fine, Coarse, Fine, Coarse]);
        let p = interpolation(&laplacian_1d(5), &cf);
        assert_eq!(p.num_cols, 3);
        assert_eq!(p.row(1), (&[0usize, 1][..], &[0.5, 0.5][..]));
    }

    #[test]
    fn galerkin_of_chain_is_tridiagonal() {
        let a = laplacian_1d(5);
        let p = interpolation(&a, &greedy_cf_split(&a));
        let ac = galerkin(&a, &p);
        assert_eq!(ac.num_rows, 3);
        assert_eq!(ac.row(1).0, &[0, 1, 2]);
        assert_eq!(ac.transpose(), ac);
    }

    #[test]
    fn hierarchy_stops_at_max_levels() {
        let h = build_hierarchy(laplacian_1d(32), vec![1.0; 32], 3, 1);
        assert_eq!(h.levels.len(), 3);
        assert!(h.levels[2].p.is_none());
        assert_eq!(h.levels[1].a.num_rows, 16);
        assert_eq!(h.levels[1].residual.len(), 16);
    }
}
