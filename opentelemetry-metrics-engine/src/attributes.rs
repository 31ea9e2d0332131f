use std::{
    collections::{hash_map::DefaultHasher, HashSet},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use opentelemetry::{Key, KeyValue, Value};

/// A unique set of attributes that identifies one stream within an instrument.
///
/// The pairs are sorted by key and de-duplicated (the last value given for a
/// key wins), so two sets built from the same pairs in any order are equal and
/// hash identically. The hash is computed once, on construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeSet(Vec<KeyValue>, u64);

impl Default for AttributeSet {
    fn default() -> Self {
        AttributeSet(Vec::new(), calculate_hash(&[]))
    }
}

impl From<&[KeyValue]> for AttributeSet {
    fn from(values: &[KeyValue]) -> Self {
        AttributeSet::from_iter(values.iter().cloned())
    }
}

impl FromIterator<KeyValue> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        // walk backwards so the last occurrence of a key is the one retained
        let mut vec: Vec<KeyValue> = iter.into_iter().collect();
        vec.reverse();
        vec.retain(|kv| seen.insert(kv.key.clone()));
        vec.sort_by(|a, b| a.key.cmp(&b.key));

        let hash = calculate_hash(&vec);
        AttributeSet(vec, hash)
    }
}

fn calculate_hash(values: &[KeyValue]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for item in values {
        item.hash(&mut hasher);
    }
    hasher.finish()
}

impl AttributeSet {
    /// Iterate over key value pairs in the set
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.0.iter().map(|kv| (&kv.key, &kv.value))
    }

    /// Number of distinct keys in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the set holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The sorted key value pairs.
    pub fn as_slice(&self) -> &[KeyValue] {
        &self.0
    }

    /// Consumes the set, returning its sorted key value pairs.
    pub fn into_vec(self) -> Vec<KeyValue> {
        self.0
    }
}

impl Hash for AttributeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.1)
    }
}

type Filter = Arc<dyn Fn(&KeyValue) -> bool + Send + Sync>;

/// Projects attribute keys out of a measurement before it is stored.
///
/// Filtering deliberately reduces cardinality: every raw attribute set that
/// differs only in removed keys resolves to the same accumulator.
#[derive(Clone)]
pub struct KeyFilter {
    filter: Filter,
}

impl KeyFilter {
    /// A filter that keeps the attributes for which `f` returns `true`.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&KeyValue) -> bool + Send + Sync + 'static,
    {
        KeyFilter {
            filter: Arc::new(f),
        }
    }

    /// A filter that keeps only the listed keys.
    pub fn allow_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        let keys: HashSet<Key> = keys.into_iter().map(Into::into).collect();
        KeyFilter::new(move |kv| keys.contains(&kv.key))
    }

    /// Returns the canonical set built from the attributes that pass the filter.
    pub fn apply(&self, attrs: &[KeyValue]) -> AttributeSet {
        attrs
            .iter()
            .filter(|kv| (self.filter)(kv))
            .cloned()
            .collect()
    }
}

impl fmt::Debug for KeyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyFilter")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_does_not_change_identity() {
        let a = AttributeSet::from(&[KeyValue::new("a", 1), KeyValue::new("b", "x")][..]);
        let b = AttributeSet::from(&[KeyValue::new("b", "x"), KeyValue::new("a", 1)][..]);

        assert_eq!(a, b);
        assert_eq!(calculate_hash(a.as_slice()), calculate_hash(b.as_slice()));
        assert_eq!(a.as_slice()[0].key, Key::from("a"));
    }

    #[test]
    fn last_duplicate_wins() {
        let set = AttributeSet::from(
            &[
                KeyValue::new("k", 1),
                KeyValue::new("other", true),
                KeyValue::new("k", 2),
            ][..],
        );

        assert_eq!(set.len(), 2);
        assert_eq!(
            set.as_slice(),
            &[KeyValue::new("k", 2), KeyValue::new("other", true)]
        );
    }

    #[test]
    fn allow_keys_collapses_sets() {
        let filter = KeyFilter::allow_keys(["service"]);
        let first = filter.apply(&[
            KeyValue::new("service", "api"),
            KeyValue::new("request.id", "1"),
        ]);
        let second = filter.apply(&[
            KeyValue::new("request.id", "2"),
            KeyValue::new("service", "api"),
        ]);

        assert_eq!(first, second);
        assert_eq!(first.as_slice(), &[KeyValue::new("service", "api")]);
    }

    #[test]
    fn empty_set_is_default() {
        assert_eq!(AttributeSet::from(&[] as &[KeyValue]), AttributeSet::default());
        assert!(AttributeSet::default().is_empty());
    }
}
