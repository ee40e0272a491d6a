//! Column sorting for tabular listings.
//!
//! [`SortSpec`] tracks the active key and direction; [`ListSorter`] applies
//! it to rows that expose their cells as text.

use std::borrow::Cow;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn flipped(self) -> Self {
        match self {
            Direction::Ascending => Direction::Descending,
            Direction::Descending => Direction::Ascending,
        }
    }

    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec<K> {
    pub key: K,
    pub direction: Direction,
}

impl<K: Copy + PartialEq> SortSpec<K> {
    pub fn new(key: K) -> Self {
        Self {
            key,
            direction: Direction::Ascending,
        }
    }

    /// Selecting the active key flips the direction; any other key becomes
    /// active in ascending order.
    pub fn select(&mut self, key: K) {
        if self.key == key {
            self.direction = self.direction.flipped();
        } else {
            self.key = key;
            self.direction = Direction::Ascending;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Numeric,
}

/// A row of a sortable listing.
pub trait SortableRow {
    fn cell(&self, column: usize) -> Cow<'_, str>;
}

#[derive(Debug, Clone)]
pub struct ListSorter {
    columns: Vec<ColumnKind>,
    spec: Option<SortSpec<usize>>,
}

impl ListSorter {
    pub fn new(columns: Vec<ColumnKind>) -> Self {
        Self {
            columns,
            spec: None,
        }
    }

    pub fn spec(&self) -> Option<SortSpec<usize>> {
        self.spec
    }

    /// Select a column to sort by. Out-of-range columns are ignored.
    pub fn select(&mut self, column: usize) {
        if column >= self.columns.len() {
            return;
        }
        match self.spec {
            Some(ref mut spec) => spec.select(column),
            None => self.spec = Some(SortSpec::new(column)),
        }
    }

    pub fn compare<R: SortableRow>(&self, a: &R, b: &R) -> Ordering {
        let Some(spec) = self.spec else {
            return Ordering::Equal;
        };
        let (x, y) = (a.cell(spec.key), b.cell(spec.key));
        let ordering = match self.columns[spec.key] {
            ColumnKind::Text => x.cmp(&y),
            ColumnKind::Numeric => compare_numeric(&x, &y),
        };
        spec.direction.apply(ordering)
    }

    /// Stable sort; rows keep their relative order when no column is selected.
    pub fn sort<R: SortableRow>(&self, rows: &mut [R]) {
        if self.spec.is_some() {
            rows.sort_by(|a, b| self.compare(a, b));
        }
    }
}

// Cells that do not parse as integers sort before those that do.
fn compare_numeric(x: &str, y: &str) -> Ordering {
    match (x.trim().parse::<i64>(), y.trim().parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Err(_), Ok(_)) => Ordering::Less,
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Err(_)) => x.cmp(y),
    }
}
