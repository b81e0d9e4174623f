// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeMap;
use std::ops::{Bound, RangeBounds};

/// A composite secondary-index key; byte order is logical order.
pub type IndexKey = Vec<u8>;

/// A row type stored in a [`Table`]. Secondary keys are pure functions of the
/// row (and its instance id, appended to make non-unique indices total); the
/// table recomputes every key on each mutation.
pub trait ChainObject: Clone + Send + 'static {
    const TYPE_NAME: &'static str;
    const INDEX_COUNT: usize = 0;

    fn index_keys(&self, _id: u64) -> Vec<IndexKey> {
        Vec::new()
    }
}

/// One typed object table: a primary id map plus ordered secondary indices.
#[derive(Clone)]
pub struct Table<T> {
    rows: BTreeMap<u64, T>,
    indices: Vec<BTreeMap<IndexKey, u64>>,
    next_id: u64,
}

impl<T: ChainObject> Default for Table<T> {
    fn default() -> Self {
        Table {
            rows: BTreeMap::new(),
            indices: vec![BTreeMap::new(); T::INDEX_COUNT],
            next_id: 0,
        }
    }
}

impl<T: ChainObject> Table<T> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn get(&self, id: u64) -> Option<&T> {
        self.rows.get(&id)
    }

    /// Iterate rows in instance-id order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    /// Insert a new row under the next instance id.
    pub fn insert(&mut self, row: T) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.index_row(id, &row);
        self.rows.insert(id, row);
        id
    }

    /// Insert or replace the row at an explicit id, returning any prior row.
    pub fn put(&mut self, id: u64, row: T) -> Option<T> {
        let prior = self.rows.remove(&id);
        if let Some(old) = &prior {
            self.unindex_row(id, old);
        }
        self.index_row(id, &row);
        self.rows.insert(id, row);
        if id >= self.next_id {
            self.next_id = id + 1;
        }
        prior
    }

    /// Mutate the row in place, keeping every secondary index consistent.
    pub fn update<R>(&mut self, id: u64, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let row = self.rows.get_mut(&id)?;
        let old_keys = row.index_keys(id);
        let out = f(row);
        let new_keys = row.index_keys(id);
        debug_assert_eq!(old_keys.len(), new_keys.len());
        for (index, (old, new)) in self.indices.iter_mut().zip(old_keys.iter().zip(&new_keys)) {
            if old != new {
                index.remove(old);
                index.insert(new.clone(), id);
            }
        }
        Some(out)
    }

    /// Remove and return the row, clearing its index entries.
    pub fn take(&mut self, id: u64) -> Option<T> {
        let row = self.rows.remove(&id)?;
        self.unindex_row(id, &row);
        Some(row)
    }

    /// Used by undo records to roll the id allocator back with a create.
    pub fn set_next_id(&mut self, id: u64) {
        self.next_id = id;
    }

    pub fn index(&self, i: usize) -> &BTreeMap<IndexKey, u64> {
        &self.indices[i]
    }

    /// Ids in index order within `bounds`.
    pub fn ids_in_range<R>(&self, i: usize, bounds: R) -> Vec<u64>
    where
        R: RangeBounds<IndexKey>,
    {
        self.indices[i].range(bounds).map(|(_, id)| *id).collect()
    }

    /// Ids whose index key starts with `prefix`, in index order.
    pub fn ids_with_prefix(&self, i: usize, prefix: &[u8]) -> Vec<u64> {
        let (lo, hi) = crate::prefix_range(prefix);
        self.ids_in_range(i, (lo, hi))
    }

    /// The first id at or after `key` in index `i`.
    pub fn first_at_or_after(&self, i: usize, key: &[u8]) -> Option<u64> {
        self.indices[i]
            .range((Bound::Included(key.to_vec()), Bound::Unbounded))
            .next()
            .map(|(_, id)| *id)
    }

    /// Exact-match lookup in a unique index.
    pub fn id_by_key(&self, i: usize, key: &[u8]) -> Option<u64> {
        self.indices[i].get(key).copied()
    }

    fn index_row(&mut self, id: u64, row: &T) {
        let keys = row.index_keys(id);
        debug_assert_eq!(keys.len(), T::INDEX_COUNT);
        for (index, key) in self.indices.iter_mut().zip(keys) {
            let prior = index.insert(key, id);
            debug_assert!(prior.is_none(), "duplicate secondary key in {}", T::TYPE_NAME);
        }
    }

    fn unindex_row(&mut self, id: u64, row: &T) {
        for (index, key) in self.indices.iter_mut().zip(row.index_keys(id)) {
            let removed = index.remove(&key);
            debug_assert_eq!(removed, Some(id), "index out of sync in {}", T::TYPE_NAME);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyWriter;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        group: u8,
        score: u64,
    }

    impl ChainObject for Row {
        const TYPE_NAME: &'static str = "row";
        const INDEX_COUNT: usize = 1;

        fn index_keys(&self, id: u64) -> Vec<IndexKey> {
            vec![KeyWriter::default().u8(self.group).u64_desc(self.score).u64(id).finish()]
        }
    }

    #[test]
    fn prefix_scan_orders_by_descending_score() {
        let mut t: Table<Row> = Table::default();
        let a = t.insert(Row { group: 1, score: 10 });
        let b = t.insert(Row { group: 1, score: 30 });
        let _other = t.insert(Row { group: 2, score: 99 });
        let c = t.insert(Row { group: 1, score: 20 });

        let prefix = KeyWriter::default().u8(1).finish();
        assert_eq!(t.ids_with_prefix(0, &prefix), vec![b, c, a]);
    }

    #[test]
    fn update_moves_index_entries() {
        let mut t: Table<Row> = Table::default();
        let a = t.insert(Row { group: 1, score: 10 });
        t.update(a, |r| r.group = 3).unwrap();
        assert!(t.ids_with_prefix(0, &[1u8]).is_empty());
        assert_eq!(t.ids_with_prefix(0, &[3u8]), vec![a]);
    }

    #[test]
    fn take_clears_indices() {
        let mut t: Table<Row> = Table::default();
        let a = t.insert(Row { group: 1, score: 10 });
        assert_eq!(t.take(a), Some(Row { group: 1, score: 10 }));
        assert!(t.index(0).is_empty());
        assert!(t.get(a).is_none());
    }
}
