//! Natural key to surrogate key lookups, built once per batch and dropped with the load.

use crate::domain::record::SurrogateKey;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Found(SurrogateKey),
    Missing,
    /// The key was duplicated in its batch, so no single row owns it.
    Ambiguous,
}

#[derive(Debug, Default)]
pub struct KeyLookup {
    keys: HashMap<String, SurrogateKey>,
    ambiguous: HashSet<String>,
}

impl KeyLookup {
    /// Builds a lookup from flushed `(natural key, surrogate key)` pairs.
    /// Keys already known to be duplicated resolve as [`Resolution::Ambiguous`].
    pub fn build<I>(pairs: I, ambiguous: HashSet<String>) -> Result<Self, String>
    where
        I: IntoIterator<Item = (String, SurrogateKey)>,
    {
        let mut keys = HashMap::new();
        for (key, id) in pairs {
            if ambiguous.contains(&key) || keys.insert(key.clone(), id).is_some() {
                return Err(key);
            }
        }
        Ok(Self { keys, ambiguous })
    }

    pub fn resolve(&self, key: &str) -> Resolution {
        if let Some(id) = self.keys.get(key) {
            Resolution::Found(*id)
        } else if self.ambiguous.contains(key) {
            Resolution::Ambiguous
        } else {
            Resolution::Missing
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Groups row indexes by natural key and keeps only keys seen more than once.
pub fn duplicate_keys<'a, I>(keys: I) -> BTreeMap<String, Vec<usize>>
where
    I: IntoIterator<Item = (usize, &'a str)>,
{
    let mut rows: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, key) in keys {
        rows.entry(key.to_string()).or_default().push(idx);
    }
    rows.retain(|_, idxs| idxs.len() > 1);
    rows
}
