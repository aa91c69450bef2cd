//! Committed database contents and the mutations that change them.

use crate::error::{CoreError, CoreResult};
use crate::key::{Direction, Key, KeyPath, KeyRange};
use historial_codec::Value;
use std::collections::BTreeMap;

/// Contents of one database.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DatabaseState {
    pub(crate) version: u64,
    pub(crate) stores: BTreeMap<String, StoreData>,
}

/// One collection: its key path, index definitions and records by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct StoreData {
    pub(crate) key_path: Option<KeyPath>,
    pub(crate) indexes: BTreeMap<String, IndexSpec>,
    pub(crate) records: BTreeMap<Key, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexSpec {
    pub(crate) key_path: KeyPath,
    pub(crate) unique: bool,
}

/// An entry visited by a cursor or returned by an index scan.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) key: Key,
    pub(crate) primary_key: Key,
    pub(crate) value: Value,
}

/// A single change, staged by a transaction and written to the journal.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Mutation {
    SetVersion(u64),
    CreateStore {
        name: String,
        key_path: Option<String>,
    },
    DeleteStore {
        name: String,
    },
    CreateIndex {
        store: String,
        name: String,
        key_path: String,
        unique: bool,
    },
    DeleteIndex {
        store: String,
        name: String,
    },
    Put {
        store: String,
        key: Key,
        value: Value,
    },
    Delete {
        store: String,
        key: Key,
    },
    Clear {
        store: String,
    },
}

impl DatabaseState {
    pub(crate) fn store(&self, name: &str) -> CoreResult<&StoreData> {
        self.stores
            .get(name)
            .ok_or_else(|| CoreError::not_found(format!("collection {name:?}")))
    }

    fn store_mut(&mut self, name: &str) -> CoreResult<&mut StoreData> {
        self.stores
            .get_mut(name)
            .ok_or_else(|| CoreError::not_found(format!("collection {name:?}")))
    }

    pub(crate) fn apply(&mut self, mutation: &Mutation) -> CoreResult<()> {
        match mutation {
            Mutation::SetVersion(version) => self.version = *version,
            Mutation::CreateStore { name, key_path } => {
                if self.stores.contains_key(name) {
                    return Err(CoreError::constraint(format!(
                        "collection {name:?} already exists"
                    )));
                }
                let data = StoreData {
                    key_path: key_path.as_deref().map(KeyPath::new),
                    ..StoreData::default()
                };
                self.stores.insert(name.clone(), data);
            }
            Mutation::DeleteStore { name } => {
                if self.stores.remove(name).is_none() {
                    return Err(CoreError::not_found(format!("collection {name:?}")));
                }
            }
            Mutation::CreateIndex {
                store,
                name,
                key_path,
                unique,
            } => {
                let data = self.store_mut(store)?;
                if data.indexes.contains_key(name) {
                    return Err(CoreError::constraint(format!(
                        "index {name:?} already exists on {store:?}"
                    )));
                }
                let spec = IndexSpec {
                    key_path: KeyPath::new(key_path.clone()),
                    unique: *unique,
                };
                if spec.unique {
                    data.check_unique_index(name, &spec)?;
                }
                data.indexes.insert(name.clone(), spec);
            }
            Mutation::DeleteIndex { store, name } => {
                let data = self.store_mut(store)?;
                if data.indexes.remove(name).is_none() {
                    return Err(CoreError::not_found(format!(
                        "index {name:?} on {store:?}"
                    )));
                }
            }
            Mutation::Put { store, key, value } => {
                let data = self.store_mut(store)?;
                data.check_unique_put(key, value)?;
                data.records.insert(key.clone(), value.clone());
            }
            Mutation::Delete { store, key } => {
                self.store_mut(store)?.records.remove(key);
            }
            Mutation::Clear { store } => {
                self.store_mut(store)?.records.clear();
            }
        }
        Ok(())
    }

    /// Mutations that rebuild this state from nothing.
    pub(crate) fn snapshot(&self) -> Vec<Mutation> {
        let mut out = vec![Mutation::SetVersion(self.version)];
        for (name, data) in &self.stores {
            out.push(Mutation::CreateStore {
                name: name.clone(),
                key_path: data.key_path.as_ref().map(|p| p.as_str().to_string()),
            });
            for (index, spec) in &data.indexes {
                out.push(Mutation::CreateIndex {
                    store: name.clone(),
                    name: index.clone(),
                    key_path: spec.key_path.as_str().to_string(),
                    unique: spec.unique,
                });
            }
            for (key, value) in &data.records {
                out.push(Mutation::Put {
                    store: name.clone(),
                    key: key.clone(),
                    value: value.clone(),
                });
            }
        }
        out
    }
}

impl StoreData {
    /// Records in `range`, ordered by key in `direction`.
    pub(crate) fn scan(&self, range: &KeyRange, direction: Direction) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self
            .records
            .iter()
            .filter(|(key, _)| range.contains(key))
            .map(|(key, value)| Entry {
                key: key.clone(),
                primary_key: key.clone(),
                value: value.clone(),
            })
            .collect();
        if direction.is_reverse() {
            entries.reverse();
        }
        entries
    }

    /// Index entries whose index key falls in `range`, ordered by
    /// (index key, primary key) in `direction`. Records without a valid key
    /// at the index path are not indexed.
    pub(crate) fn index_scan(
        &self,
        spec: &IndexSpec,
        range: &KeyRange,
        direction: Direction,
    ) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self
            .records
            .iter()
            .filter_map(|(primary_key, value)| {
                let key = spec.key_path.extract(value).ok()?;
                range.contains(&key).then(|| Entry {
                    key,
                    primary_key: primary_key.clone(),
                    value: value.clone(),
                })
            })
            .collect();
        entries.sort_by(|a, b| (&a.key, &a.primary_key).cmp(&(&b.key, &b.primary_key)));
        if direction.is_unique() {
            entries.dedup_by(|later, earlier| later.key == earlier.key);
        }
        if direction.is_reverse() {
            entries.reverse();
        }
        entries
    }

    pub(crate) fn index(&self, store: &str, name: &str) -> CoreResult<&IndexSpec> {
        self.indexes
            .get(name)
            .ok_or_else(|| CoreError::not_found(format!("index {name:?} on {store:?}")))
    }

    fn check_unique_put(&self, key: &Key, value: &Value) -> CoreResult<()> {
        for (name, spec) in self.indexes.iter().filter(|(_, s)| s.unique) {
            let Ok(index_key) = spec.key_path.extract(value) else {
                continue;
            };
            let clash = self.records.iter().any(|(other_key, other)| {
                other_key != key && spec.key_path.extract(other).ok().as_ref() == Some(&index_key)
            });
            if clash {
                return Err(CoreError::constraint(format!(
                    "unique index {name:?} already holds key {index_key}"
                )));
            }
        }
        Ok(())
    }

    fn check_unique_index(&self, name: &str, spec: &IndexSpec) -> CoreResult<()> {
        let mut seen = std::collections::BTreeSet::new();
        for value in self.records.values() {
            if let Ok(index_key) = spec.key_path.extract(value) {
                if !seen.insert(index_key.clone()) {
                    return Err(CoreError::constraint(format!(
                        "cannot create unique index {name:?}: key {index_key} is duplicated"
                    )));
                }
            }
        }
        Ok(())
    }
}

// Journal encoding. Each mutation is a map tagged by "op".

fn field<'a>(map: &'a Value, name: &str) -> CoreResult<&'a Value> {
    map.get(name)
        .ok_or_else(|| CoreError::journal_corruption(format!("mutation missing {name:?}")))
}

fn text_field(map: &Value, name: &str) -> CoreResult<String> {
    field(map, name)?
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| CoreError::journal_corruption(format!("mutation field {name:?} is not text")))
}

fn key_field(map: &Value, name: &str) -> CoreResult<Key> {
    Key::from_value(field(map, name)?)
        .map_err(|e| CoreError::journal_corruption(format!("mutation field {name:?}: {e}")))
}

impl Mutation {
    /// Collection and record this mutation writes. `None` for the key
    /// means every record of the collection; `None` overall means no
    /// collection is touched.
    pub(crate) fn written(&self) -> Option<(&str, Option<&Key>)> {
        match self {
            Mutation::SetVersion(_) => None,
            Mutation::Put { store, key, .. } | Mutation::Delete { store, key } => {
                Some((store, Some(key)))
            }
            Mutation::CreateStore { name, .. } | Mutation::DeleteStore { name } => {
                Some((name, None))
            }
            Mutation::CreateIndex { store, .. }
            | Mutation::DeleteIndex { store, .. }
            | Mutation::Clear { store } => Some((store, None)),
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            Mutation::SetVersion(version) => Value::map([
                ("op", Value::from("version")),
                ("version", Value::Integer(i64::try_from(*version).unwrap_or(i64::MAX))),
            ]),
            Mutation::CreateStore { name, key_path } => Value::map([
                ("op", Value::from("create_store")),
                ("name", Value::from(name.as_str())),
                ("key_path", Value::from(key_path.clone())),
            ]),
            Mutation::DeleteStore { name } => Value::map([
                ("op", Value::from("delete_store")),
                ("name", Value::from(name.as_str())),
            ]),
            Mutation::CreateIndex {
                store,
                name,
                key_path,
                unique,
            } => Value::map([
                ("op", Value::from("create_index")),
                ("store", Value::from(store.as_str())),
                ("name", Value::from(name.as_str())),
                ("key_path", Value::from(key_path.as_str())),
                ("unique", Value::Bool(*unique)),
            ]),
            Mutation::DeleteIndex { store, name } => Value::map([
                ("op", Value::from("delete_index")),
                ("store", Value::from(store.as_str())),
                ("name", Value::from(name.as_str())),
            ]),
            Mutation::Put { store, key, value } => Value::map([
                ("op", Value::from("put")),
                ("store", Value::from(store.as_str())),
                ("key", key.to_value()),
                ("value", value.clone()),
            ]),
            Mutation::Delete { store, key } => Value::map([
                ("op", Value::from("delete")),
                ("store", Value::from(store.as_str())),
                ("key", key.to_value()),
            ]),
            Mutation::Clear { store } => Value::map([
                ("op", Value::from("clear")),
                ("store", Value::from(store.as_str())),
            ]),
        }
    }

    pub(crate) fn from_value(value: &Value) -> CoreResult<Self> {
        let op = text_field(value, "op")?;
        let mutation = match op.as_str() {
            "version" => {
                let version = field(value, "version")?
                    .as_integer()
                    .and_then(|v| u64::try_from(v).ok())
                    .ok_or_else(|| CoreError::journal_corruption("invalid version"))?;
                Mutation::SetVersion(version)
            }
            "create_store" => Mutation::CreateStore {
                name: text_field(value, "name")?,
                key_path: field(value, "key_path")?.as_text().map(str::to_string),
            },
            "delete_store" => Mutation::DeleteStore {
                name: text_field(value, "name")?,
            },
            "create_index" => Mutation::CreateIndex {
                store: text_field(value, "store")?,
                name: text_field(value, "name")?,
                key_path: text_field(value, "key_path")?,
                unique: field(value, "unique")?.as_bool().unwrap_or(false),
            },
            "delete_index" => Mutation::DeleteIndex {
                store: text_field(value, "store")?,
                name: text_field(value, "name")?,
            },
            "put" => Mutation::Put {
                store: text_field(value, "store")?,
                key: key_field(value, "key")?,
                value: field(value, "value")?.clone(),
            },
            "delete" => Mutation::Delete {
                store: text_field(value, "store")?,
                key: key_field(value, "key")?,
            },
            "clear" => Mutation::Clear {
                store: text_field(value, "store")?,
            },
            other => {
                return Err(CoreError::journal_corruption(format!(
                    "unknown mutation {other:?}"
                )))
            }
        };
        Ok(mutation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: &str, email: &str) -> Value {
        Value::map([("id", Value::from(id)), ("email", Value::from(email))])
    }

    fn state_with_store() -> DatabaseState {
        let mut state = DatabaseState::default();
        state
            .apply(&Mutation::CreateStore {
                name: "students".into(),
                key_path: Some("id".into()),
            })
            .unwrap();
        state
    }

    fn put(state: &mut DatabaseState, id: &str, email: &str) -> CoreResult<()> {
        state.apply(&Mutation::Put {
            store: "students".into(),
            key: Key::from(id),
            value: student(id, email),
        })
    }

    #[test]
    fn duplicate_store_is_a_constraint_error() {
        let mut state = state_with_store();
        let err = state
            .apply(&Mutation::CreateStore {
                name: "students".into(),
                key_path: None,
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Constraint { .. }));
    }

    #[test]
    fn delete_of_missing_key_is_noop() {
        let mut state = state_with_store();
        state
            .apply(&Mutation::Delete {
                store: "students".into(),
                key: Key::from("ghost"),
            })
            .unwrap();
        assert!(state.store("students").unwrap().records.is_empty());
    }

    #[test]
    fn unique_index_rejects_second_holder() {
        let mut state = state_with_store();
        state
            .apply(&Mutation::CreateIndex {
                store: "students".into(),
                name: "by_email".into(),
                key_path: "email".into(),
                unique: true,
            })
            .unwrap();
        put(&mut state, "1", "a@x").unwrap();
        // Overwriting the same record keeps its own index key.
        put(&mut state, "1", "a@x").unwrap();
        let err = put(&mut state, "2", "a@x").unwrap_err();
        assert!(matches!(err, CoreError::Constraint { .. }));
    }

    #[test]
    fn index_scan_orders_by_index_key_then_primary_key() {
        let mut state = state_with_store();
        put(&mut state, "3", "b").unwrap();
        put(&mut state, "1", "b").unwrap();
        put(&mut state, "2", "a").unwrap();
        let spec = IndexSpec {
            key_path: KeyPath::new("email"),
            unique: false,
        };
        let store = state.store("students").unwrap();
        let keys: Vec<_> = store
            .index_scan(&spec, &KeyRange::unbounded(), Direction::Next)
            .into_iter()
            .map(|e| e.primary_key)
            .collect();
        assert_eq!(keys, vec![Key::from("2"), Key::from("1"), Key::from("3")]);

        let unique: Vec<_> = store
            .index_scan(&spec, &KeyRange::unbounded(), Direction::PrevUnique)
            .into_iter()
            .map(|e| e.primary_key)
            .collect();
        assert_eq!(unique, vec![Key::from("1"), Key::from("2")]);
    }

    #[test]
    fn snapshot_rebuilds_equal_state() {
        let mut state = state_with_store();
        state.apply(&Mutation::SetVersion(3)).unwrap();
        put(&mut state, "1", "a").unwrap();
        let mut rebuilt = DatabaseState::default();
        for mutation in state.snapshot() {
            let decoded = Mutation::from_value(&mutation.to_value()).unwrap();
            rebuilt.apply(&decoded).unwrap();
        }
        assert_eq!(rebuilt, state);
    }
}
