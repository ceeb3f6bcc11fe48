use serde::{Deserialize, Serialize};

/// Per-subplot assignment of data-header indices, plus the set of subplots
/// flagged for normalized display.
///
/// The indices stored here are logical references into the current data
/// header. Whenever a function column is removed from the table, the spec
/// must be rebased through [`rebase_removed`](Self::rebase_removed) so the
/// references stay valid; that is the single place index-shift logic lives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlotSpec {
    pub plot: Vec<Vec<usize>>,
    pub normalize: Vec<usize>,
}

impl PlotSpec {
    /// Default layout: one subplot per data-header column.
    pub fn one_per_column(header_len: usize) -> Self {
        Self {
            plot: (0..header_len).map(|i| vec![i]).collect(),
            normalize: Vec::new(),
        }
    }

    pub fn subplot_count(&self) -> usize {
        self.plot.len()
    }

    pub fn is_normalized(&self, subplot: usize) -> bool {
        self.normalize.contains(&subplot)
    }

    /// True when every referenced index is valid for a header of the given
    /// length. Used as a guard after loading a config from disk.
    pub fn is_valid_for(&self, header_len: usize) -> bool {
        self.plot
            .iter()
            .all(|set| set.iter().all(|&i| i < header_len))
            && self.normalize.iter().all(|&s| s < self.plot.len())
    }

    /// Rebase after removing the data-header column at `removed`: the index
    /// is dropped from every subplot set and every greater index shifts down
    /// by one.
    pub fn rebase_removed(&mut self, removed: usize) {
        for set in &mut self.plot {
            set.retain(|&i| i != removed);
            for i in set.iter_mut() {
                if *i > removed {
                    *i -= 1;
                }
            }
        }
    }

    /// Add or remove a column from a subplot's set.
    pub fn toggle_column(&mut self, subplot: usize, column: usize) {
        let Some(set) = self.plot.get_mut(subplot) else {
            return;
        };
        if let Some(pos) = set.iter().position(|&i| i == column) {
            set.remove(pos);
        } else {
            set.push(column);
        }
    }

    pub fn toggle_normalize(&mut self, subplot: usize) {
        if let Some(pos) = self.normalize.iter().position(|&s| s == subplot) {
            self.normalize.remove(pos);
        } else {
            self.normalize.push(subplot);
            self.normalize.sort_unstable();
        }
    }

    /// Insert an empty subplot at `at`, shifting normalize flags to follow
    /// their subplots.
    pub fn insert_subplot(&mut self, at: usize) {
        let at = at.min(self.plot.len());
        self.plot.insert(at, Vec::new());
        for s in &mut self.normalize {
            if *s >= at {
                *s += 1;
            }
        }
    }

    pub fn clear_subplot(&mut self, subplot: usize) {
        if let Some(set) = self.plot.get_mut(subplot) {
            set.clear();
        }
    }

    /// Remove a subplot entirely, dropping its normalize flag and shifting
    /// the flags of later subplots down.
    pub fn remove_subplot(&mut self, subplot: usize) {
        if subplot >= self.plot.len() {
            return;
        }
        self.plot.remove(subplot);
        self.normalize.retain(|&s| s != subplot);
        for s in &mut self.normalize {
            if *s > subplot {
                *s -= 1;
            }
        }
    }

    pub fn reset(&mut self, header_len: usize) {
        *self = Self::one_per_column(header_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> PlotSpec {
        PlotSpec {
            plot: vec![vec![0, 3], vec![1], vec![2, 3, 4]],
            normalize: vec![0, 2],
        }
    }

    #[test]
    fn default_layout_is_one_column_per_subplot() {
        let spec = PlotSpec::one_per_column(3);
        assert_eq!(spec.plot, vec![vec![0], vec![1], vec![2]]);
        assert!(spec.normalize.is_empty());
        assert!(spec.is_valid_for(3));
    }

    #[test]
    fn rebase_drops_removed_index_and_shifts_greater() {
        let mut s = spec();
        s.rebase_removed(3);
        assert_eq!(s.plot, vec![vec![0], vec![1], vec![2, 3]]);
    }

    #[test]
    fn rebase_leaves_smaller_indices_alone() {
        let mut s = spec();
        s.rebase_removed(4);
        assert_eq!(s.plot, vec![vec![0, 3], vec![1], vec![2, 3]]);
        s.rebase_removed(0);
        assert_eq!(s.plot, vec![vec![2], vec![0], vec![1, 2]]);
    }

    #[test]
    fn removing_a_subplot_rebases_normalize_flags() {
        let mut s = spec();
        s.remove_subplot(0);
        assert_eq!(s.plot.len(), 2);
        assert_eq!(s.normalize, vec![1]);
    }

    #[test]
    fn inserting_a_subplot_shifts_normalize_flags() {
        let mut s = spec();
        s.insert_subplot(1);
        assert_eq!(s.plot.len(), 4);
        assert!(s.plot[1].is_empty());
        assert_eq!(s.normalize, vec![0, 3]);
    }

    #[test]
    fn validity_checks_both_columns_and_subplots() {
        let s = spec();
        assert!(s.is_valid_for(5));
        assert!(!s.is_valid_for(4));
    }

    #[test]
    fn toggle_column_round_trips() {
        let mut s = spec();
        s.toggle_column(1, 4);
        assert_eq!(s.plot[1], vec![1, 4]);
        s.toggle_column(1, 4);
        assert_eq!(s.plot[1], vec![1]);
    }
}
