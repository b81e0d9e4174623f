// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The speculative object store backing the chain state machine.
//!
//! Every object type lives in its own [`Table`]: a primary map from instance
//! id to row plus one ordered secondary index per declared key function.
//! [`Store`] couples a struct of tables with an [`UndoStack`] of inverse
//! mutations, so a nested session can be rolled back to bit-exact prior
//! state. The undo stack is the sole discipline for speculative state.

mod errors;
mod key;
mod table;
mod undo;

pub use errors::Error;
pub use key::{prefix_range, KeyWriter};
pub use table::{ChainObject, IndexKey, Table};
pub use undo::UndoStack;

/// Maps a concrete object type to its table within a tables struct.
pub trait HasTable<T: ChainObject> {
    fn table(&self) -> &Table<T>;
    fn table_mut(&mut self) -> &mut Table<T>;
}

/// A tables struct plus the undo stack that guards it.
pub struct Store<S> {
    tables: S,
    undo: UndoStack<S>,
}

impl<S> Store<S> {
    pub fn new(tables: S) -> Self {
        Store { tables, undo: UndoStack::default() }
    }

    /// Read-only view of the tables. Mutation goes through the typed
    /// operations below so every change lands on the undo stack.
    pub fn tables(&self) -> &S {
        &self.tables
    }

    pub fn table<T: ChainObject>(&self) -> &Table<T>
    where
        S: HasTable<T>,
    {
        self.tables.table()
    }

    /// Insert a new object, assigning the next instance id.
    pub fn create<T: ChainObject>(&mut self, obj: T) -> u64
    where
        S: HasTable<T>,
    {
        let id = self.tables.table_mut().insert(obj);
        self.undo.push(Box::new(move |s: &mut S| {
            let table = HasTable::<T>::table_mut(s);
            table.take(id);
            table.set_next_id(id);
        }));
        id
    }

    /// Insert at an explicit instance id (singletons, the TaPoS ring).
    /// Replaces any existing row at that id.
    pub fn put<T: ChainObject>(&mut self, id: u64, obj: T)
    where
        S: HasTable<T>,
    {
        let prior = self.tables.table_mut().put(id, obj);
        self.undo.push(Box::new(move |s: &mut S| {
            let table = HasTable::<T>::table_mut(s);
            match prior {
                Some(old) => {
                    table.put(id, old);
                }
                None => {
                    table.take(id);
                }
            }
        }));
    }

    pub fn find<T: ChainObject>(&self, id: u64) -> Option<&T>
    where
        S: HasTable<T>,
    {
        self.tables.table().get(id)
    }

    pub fn get<T: ChainObject>(&self, id: u64) -> Result<&T, Error>
    where
        S: HasTable<T>,
    {
        self.find(id).ok_or(Error::NotFound { kind: T::TYPE_NAME, id })
    }

    /// Apply `f` to the object, recording its prior bytes for undo and
    /// recomputing every secondary index entry.
    pub fn modify<T: ChainObject, R>(
        &mut self,
        id: u64,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, Error>
    where
        S: HasTable<T>,
    {
        let table = self.tables.table_mut();
        let old = table
            .get(id)
            .cloned()
            .ok_or(Error::NotFound { kind: T::TYPE_NAME, id })?;
        let out = table.update(id, f).expect("row existence checked above");
        self.undo.push(Box::new(move |s: &mut S| {
            HasTable::<T>::table_mut(s).put(id, old);
        }));
        Ok(out)
    }

    pub fn remove<T: ChainObject>(&mut self, id: u64) -> Result<T, Error>
    where
        S: HasTable<T>,
    {
        let old = self
            .tables
            .table_mut()
            .take(id)
            .ok_or(Error::NotFound { kind: T::TYPE_NAME, id })?;
        let restore = old.clone();
        self.undo.push(Box::new(move |s: &mut S| {
            HasTable::<T>::table_mut(s).put(id, restore);
        }));
        Ok(old)
    }

    /// Open a nested undo session. Mutations made while any session is open
    /// are recorded; with no session open they are permanent.
    pub fn begin_session(&mut self) {
        self.undo.begin();
    }

    /// Merge the top session into its parent (or into permanent state).
    pub fn commit_session(&mut self) {
        self.undo.commit();
    }

    /// Roll the top session back, restoring bit-exact prior state.
    pub fn undo_session(&mut self) {
        self.undo.undo(&mut self.tables);
    }

    pub fn open_sessions(&self) -> usize {
        self.undo.sessions()
    }

    /// Discard the oldest sessions until at most `max_sessions` remain;
    /// their mutations become permanent. Called as blocks turn irreversible.
    pub fn trim_sessions(&mut self, max_sessions: usize) {
        self.undo.trim_oldest(max_sessions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: String,
        rank: u64,
    }

    impl ChainObject for Item {
        const TYPE_NAME: &'static str = "item";
        const INDEX_COUNT: usize = 2;

        fn index_keys(&self, id: u64) -> Vec<IndexKey> {
            let by_name = KeyWriter::default().str(&self.name).finish();
            let by_rank = KeyWriter::default().u64_desc(self.rank).u64(id).finish();
            vec![by_name, by_rank]
        }
    }

    #[derive(Default)]
    struct Tables {
        items: Table<Item>,
    }

    impl HasTable<Item> for Tables {
        fn table(&self) -> &Table<Item> {
            &self.items
        }
        fn table_mut(&mut self) -> &mut Table<Item> {
            &mut self.items
        }
    }

    fn item(name: &str, rank: u64) -> Item {
        Item { name: name.into(), rank }
    }

    #[test]
    fn undo_restores_prior_state() {
        let mut store: Store<Tables> = Store::new(Tables::default());
        let a = store.create(item("a", 5));
        store.begin_session();
        store.modify(a, |i: &mut Item| i.rank = 9).unwrap();
        let b = store.create(item("b", 2));
        store.remove::<Item>(a).unwrap();
        store.undo_session();
        assert_eq!(store.get::<Item>(a).unwrap(), &item("a", 5));
        assert!(store.find::<Item>(b).is_none());
        // ids roll back too: the next create reuses b's id
        assert_eq!(store.create(item("c", 1)), b);
    }

    #[test]
    fn nested_sessions_commit_into_parent() {
        let mut store: Store<Tables> = Store::new(Tables::default());
        store.begin_session();
        let a = store.create(item("a", 1));
        store.begin_session();
        store.modify(a, |i: &mut Item| i.rank = 2).unwrap();
        store.commit_session();
        store.undo_session();
        assert!(store.find::<Item>(a).is_none());
    }

    #[test]
    fn indices_track_modifications() {
        let mut store: Store<Tables> = Store::new(Tables::default());
        let a = store.create(item("a", 5));
        let _b = store.create(item("b", 7));
        // descending rank order
        let first = *store.table::<Item>().index(1).values().next().unwrap();
        assert_eq!(store.get::<Item>(first).unwrap().name, "b");
        store.modify(a, |i: &mut Item| i.rank = 10).unwrap();
        let first = *store.table::<Item>().index(1).values().next().unwrap();
        assert_eq!(store.get::<Item>(first).unwrap().name, "a");
    }

    #[test]
    fn trim_makes_old_sessions_permanent() {
        let mut store: Store<Tables> = Store::new(Tables::default());
        store.begin_session();
        let a = store.create(item("a", 1));
        store.begin_session();
        let b = store.create(item("b", 2));
        store.trim_sessions(1);
        assert_eq!(store.open_sessions(), 1);
        store.undo_session();
        assert!(store.find::<Item>(a).is_some());
        assert!(store.find::<Item>(b).is_none());
    }
}
