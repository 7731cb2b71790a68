//! Sparse rows stored per composite-grid node.

/// One sparse matrix row: values, global column indices and, once resolved,
/// the column's position in the composite grid it indexes into.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CompositeMatrixRow {
    pub values: Vec<f64>,
    pub global_cols: Vec<usize>,
    /// `None` until resolution finds the column in the composite grid.
    pub local_cols: Vec<Option<usize>>,
}

impl CompositeMatrixRow {
    /// Build an unresolved row from parallel value/column slices.
    pub fn new(values: Vec<f64>, global_cols: Vec<usize>) -> Self {
        debug_assert_eq!(values.len(), global_cols.len());
        let local_cols = vec![None; global_cols.len()];
        Self {
            values,
            global_cols,
            local_cols,
        }
    }

    pub fn from_slices(values: &[f64], global_cols: &[usize]) -> Self {
        Self::new(values.to_vec(), global_cols.to_vec())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate `(value, global column, local column)`.
    pub fn entries(&self) -> impl Iterator<Item = (f64, usize, Option<usize>)> + '_ {
        self.values
            .iter()
            .zip(&self.global_cols)
            .zip(&self.local_cols)
            .map(|((&v, &g), &l)| (v, g, l))
    }

    pub fn is_resolved(&self) -> bool {
        self.local_cols.iter().all(Option::is_some)
    }

    /// Re-resolve every column through `lookup`.
    pub fn resolve_with(&mut self, lookup: impl Fn(usize) -> Option<usize>) {
        for (local, &global) in self.local_cols.iter_mut().zip(&self.global_cols) {
            *local = lookup(global);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_row_is_unresolved() {
        let row = CompositeMatrixRow::new(vec![2.0, -1.0], vec![4, 5]);
        assert_eq!(row.len(), 2);
        assert!(!row.is_resolved());
        assert_eq!(row.local_cols, vec![None, None]);
    }

    #[test]
    fn resolve_with_marks_missing_columns() {
        let mut row = CompositeMatrixRow::from_slices(&[2.0, -1.0, -1.0], &[4, 5, 9]);
        row.resolve_with(|g| (g < 9).then(|| g - 4));
        let got: Vec<_> = row.entries().collect();
        assert_eq!(got, vec![(2.0, 4, Some(0)), (-1.0, 5, Some(1)), (-1.0, 9, None)]);
    }
}
