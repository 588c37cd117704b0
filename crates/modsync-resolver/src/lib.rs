use std::collections::{BTreeMap, BTreeSet};

/// One node of a dependency graph: a key, the keys it depends on, and the
/// values it contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyItem<K, V> {
    pub key: K,
    pub dependencies: Vec<K>,
    pub values: Vec<V>,
}

impl<K, V> DependencyItem<K, V> {
    pub fn new(key: K, dependencies: Vec<K>, values: Vec<V>) -> Self {
        Self {
            key,
            dependencies,
            values,
        }
    }
}

/// For every item, the union of its own values with the values of every key
/// transitively reachable through dependency edges.
///
/// Dependency keys with no item are ignored. Cycles terminate: a key
/// revisited while its own resolution is still in progress contributes
/// nothing to that resolution.
pub fn resolve_transitive<K, V>(items: &[DependencyItem<K, V>]) -> BTreeMap<K, BTreeSet<V>>
where
    K: Ord + Clone,
    V: Ord + Clone,
{
    let index: BTreeMap<&K, &DependencyItem<K, V>> =
        items.iter().map(|item| (&item.key, item)).collect();

    let mut resolved: BTreeMap<K, BTreeSet<V>> = BTreeMap::new();
    for item in items {
        let mut in_progress = BTreeSet::new();
        resolve_key(&item.key, &index, &mut resolved, &mut in_progress);
    }

    items
        .iter()
        .map(|item| {
            let values = resolved.get(&item.key).cloned().unwrap_or_default();
            (item.key.clone(), values)
        })
        .collect()
}

fn resolve_key<K, V>(
    key: &K,
    index: &BTreeMap<&K, &DependencyItem<K, V>>,
    resolved: &mut BTreeMap<K, BTreeSet<V>>,
    in_progress: &mut BTreeSet<K>,
) -> BTreeSet<V>
where
    K: Ord + Clone,
    V: Ord + Clone,
{
    if let Some(done) = resolved.get(key) {
        return done.clone();
    }
    if !in_progress.insert(key.clone()) {
        // Cycle: the revisited key contributes nothing to its own closure.
        return BTreeSet::new();
    }

    let values = match index.get(key) {
        None => BTreeSet::new(),
        Some(item) => {
            let mut values: BTreeSet<V> = item.values.iter().cloned().collect();
            for dependency in &item.dependencies {
                values.extend(resolve_key(dependency, index, resolved, in_progress));
            }
            values
        }
    };

    in_progress.remove(key);
    if index.contains_key(key) {
        resolved.insert(key.clone(), values.clone());
    }
    values
}
