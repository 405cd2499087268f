//! Depth-first flattening of nested one-to-many fields into leaf rows.
//!
//! A flattened row carries the root record at depth `0` and one element per
//! expansion level after it. Column mappers compiled for depth `d` read the
//! element stored at that depth.

use std::any::Any;
use std::rc::Rc;

/// Type-erased expansion of one nesting level.
///
/// Returns `None` when the element at the level does not yield a collection.
pub type ExpandFn = Box<dyn Fn(&(dyn Any + 'static)) -> Option<Vec<Rc<dyn Any>>>>;

/// One flattened row: the root record plus the expanded element path.
#[derive(Clone)]
pub struct FlatRow<'a> {
    id: u64,
    root: &'a (dyn Any + 'static),
    l_path: Vec<Rc<dyn Any>>,
}

impl<'a> FlatRow<'a> {
    /// Row identity. Every fork gets a fresh one.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of expanded levels below the root.
    pub fn depth(&self) -> usize {
        self.l_path.len()
    }

    /// Element at `depth` (`0` is the root record).
    pub fn element(&self, depth: usize) -> Option<&(dyn Any + 'static)> {
        match depth {
            0 => Some(self.root),
            _ => self.l_path.get(depth - 1).map(|rc| rc.as_ref()),
        }
    }
}

impl std::fmt::Debug for FlatRow<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatRow")
            .field("id", &self.id)
            .field("depth", &self.depth())
            .finish()
    }
}

/// Leaf rows of one record plus the depths whose extraction yielded no collection.
#[derive(Debug, Default)]
pub struct SpecFlattenOutcome<'a> {
    /// Leaf rows in depth-first order.
    pub rows: Vec<FlatRow<'a>>,
    /// Depth of every branch dropped because its level returned no collection.
    pub l_mismatch_depths: Vec<usize>,
}

/// Flattener over a fixed chain of expansion levels.
///
/// Level `d` expands the element at depth `d`; rows reaching the end of the
/// chain are leaves.
pub struct RowFlattener<'t> {
    l_levels: &'t [ExpandFn],
    n_id_next: u64,
}

impl<'t> RowFlattener<'t> {
    /// Flattener over `levels`.
    pub fn new(levels: &'t [ExpandFn]) -> Self {
        Self {
            l_levels: levels,
            n_id_next: 0,
        }
    }

    /// Flatten one record.
    pub fn flatten<'a>(&mut self, record: &'a (dyn Any + 'static)) -> SpecFlattenOutcome<'a> {
        let mut outcome = SpecFlattenOutcome::default();
        let row = FlatRow {
            id: self.next_id(),
            root: record,
            l_path: Vec::new(),
        };
        self.walk(row, &mut outcome);
        outcome
    }

    fn walk<'a>(&mut self, row: FlatRow<'a>, outcome: &mut SpecFlattenOutcome<'a>) {
        let n_depth = row.depth();
        let l_levels = self.l_levels;
        let Some(expand) = l_levels.get(n_depth) else {
            outcome.rows.push(row);
            return;
        };
        let l_children = row.element(n_depth).and_then(|element| expand(element));
        let Some(l_children) = l_children else {
            outcome.l_mismatch_depths.push(n_depth);
            return;
        };

        for child in l_children {
            let mut row_fork = FlatRow {
                id: self.next_id(),
                root: row.root,
                l_path: row.l_path.clone(),
            };
            row_fork.l_path.push(child);
            self.walk(row_fork, outcome);
        }
    }

    fn next_id(&mut self) -> u64 {
        let n_id = self.n_id_next;
        self.n_id_next += 1;
        n_id
    }
}

/// Wrap a typed extractor as an [`ExpandFn`].
pub fn derive_expand_fn<P, C>(extract: impl Fn(&P) -> Option<Vec<C>> + 'static) -> ExpandFn
where
    P: 'static,
    C: 'static,
{
    Box::new(move |element: &(dyn Any + 'static)| {
        let parent = element.downcast_ref::<P>()?;
        extract(parent).map(|l_children| {
            l_children
                .into_iter()
                .map(|child| Rc::new(child) as Rc<dyn Any>)
                .collect()
        })
    })
}
