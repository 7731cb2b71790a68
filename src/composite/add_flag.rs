//! Per-node visitation state for one bounded-distance traversal.

/// State of a node during one discovery or packing pass.
///
/// `Visited(d)` means the node was reached with `d` hops of budget left.
/// `Seed` marks a starting point flagged from the next finer level; it
/// outranks every visited distance so a traversal never overwrites it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AddFlag {
    #[default]
    NotVisited,
    Visited(usize),
    Seed,
}

impl AddFlag {
    pub fn weight(self) -> usize {
        match self {
            AddFlag::NotVisited => 0,
            AddFlag::Visited(d) => d,
            AddFlag::Seed => usize::MAX,
        }
    }

    pub fn is_set(self) -> bool {
        self.weight() > 0
    }

    /// Raise to `Visited(d)` if that is further than what is recorded.
    /// Returns whether the flag changed.
    pub fn raise(&mut self, d: usize) -> bool {
        if self.weight() < d {
            *self = AddFlag::Visited(d);
            true
        } else {
            false
        }
    }
}

/// A fresh flag array for `n` nodes.
pub fn flags(n: usize) -> Vec<AddFlag> {
    vec![AddFlag::NotVisited; n]
}
