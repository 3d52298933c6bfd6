use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// The label set that identifies an alert instance or a data field.
///
/// Backed by an ordered map, so equality, hashing and the string form are
/// all canonical (sorted by key) and independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        pairs.into_iter().collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when every pair of `other` is present in `self`.
    ///
    /// An empty `other` is never contained: unlabeled data only matches
    /// other unlabeled data through equality.
    pub fn contains(&self, other: &Labels) -> bool {
        if other.is_empty() {
            return false;
        }
        other
            .0
            .iter()
            .all(|(k, v)| self.0.get(k).is_some_and(|mine| mine == v))
    }

    /// Equal, or one set includes the other.
    pub fn overlaps(&self, other: &Labels) -> bool {
        self == other || self.contains(other) || other.contains(self)
    }

    pub fn to_hash_map(&self) -> HashMap<String, String> {
        self.0.clone().into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<HashMap<String, String>> for Labels {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

/// `k1=v1, k2=v2` with keys in sorted order; empty labels render as `""`.
impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_sorted() {
        let l = Labels::from_pairs([("zone", "eu"), ("host", "a")]);
        assert_eq!(l.to_string(), "host=a, zone=eu");
        assert_eq!(Labels::new().to_string(), "");
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let mut a = Labels::new();
        a.insert("x", "1");
        a.insert("y", "2");
        let b = Labels::from_pairs([("y", "2"), ("x", "1")]);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_sets_with_colliding_naive_strings_stay_distinct() {
        // Naive concatenation would render both as "a=b, c=d".
        let one = Labels::from_pairs([("a", "b, c=d")]);
        let two = Labels::from_pairs([("a", "b"), ("c", "d")]);
        assert_eq!(one.to_string(), two.to_string());
        assert_ne!(one, two);
    }

    #[test]
    fn contains_subset() {
        let wide = Labels::from_pairs([("host", "a"), ("dc", "x")]);
        let narrow = Labels::from_pairs([("host", "a")]);
        assert!(wide.contains(&narrow));
        assert!(!narrow.contains(&wide));
        assert!(wide.overlaps(&narrow));
        assert!(narrow.overlaps(&wide));
    }

    #[test]
    fn contains_rejects_different_value() {
        let a = Labels::from_pairs([("host", "a"), ("dc", "x")]);
        let b = Labels::from_pairs([("host", "b")]);
        assert!(!a.contains(&b));
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn empty_only_overlaps_empty() {
        let labeled = Labels::from_pairs([("host", "a")]);
        assert!(!labeled.contains(&Labels::new()));
        assert!(!labeled.overlaps(&Labels::new()));
        assert!(Labels::new().overlaps(&Labels::new()));
    }

    #[test]
    fn serde_as_plain_map() {
        let l = Labels::from_pairs([("host", "a")]);
        let json = serde_json::to_string(&l).unwrap();
        assert_eq!(json, r#"{"host":"a"}"#);
        let back: Labels = serde_json::from_str(&json).unwrap();
        assert_eq!(back, l);
    }
}
