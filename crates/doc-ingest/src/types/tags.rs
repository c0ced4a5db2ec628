//! Tag collection shared by a pipeline and the artifacts it derives

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved key holding synthetic-data markers
pub const SYNTHETIC_TAG_KEY: &str = "__synth";

/// Marker added to summaries generated from extracted text
pub const SYNTHETIC_SUMMARY: &str = "synthetic-summary";

/// Marker added to the raw tag list written for troubleshooting
pub const SYNTHETIC_TAGS: &str = "synthetic-tags";

/// Ordered mapping from tag key to distinct values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagCollection {
    tags: BTreeMap<String, Vec<String>>,
}

impl TagCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value under `key`; returns false if it was already there
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let value = value.into();
        let values = self.tags.entry(key.into()).or_default();
        if values.contains(&value) {
            return false;
        }
        values.push(value);
        true
    }

    /// Add several values under `key`, skipping duplicates
    pub fn add_all<I, V>(&mut self, key: &str, values: I) -> usize
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let mut added = 0;
        for value in values {
            if self.add(key, value) {
                added += 1;
            }
        }
        added
    }

    /// Builder-style synthetic marker, used on a clone of the pipeline tags
    pub fn with_synthetic_tag(mut self, marker: &str) -> Self {
        self.add(SYNTHETIC_TAG_KEY, marker);
        self
    }

    /// Whether the collection carries the given synthetic marker
    pub fn is_synthetic(&self, marker: &str) -> bool {
        self.contains(SYNTHETIC_TAG_KEY, marker)
    }

    /// Union-merge another collection into this one
    pub fn merge(&mut self, other: &TagCollection) {
        for (key, values) in &other.tags {
            self.add_all(key, values.iter().cloned());
        }
    }

    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.tags
            .get(key)
            .map_or(false, |values| values.iter().any(|v| v == value))
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.tags.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for TagCollection
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Self::new();
        for (key, value) in iter {
            tags.add(key, value);
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_deduplicates_values() {
        let mut tags = TagCollection::new();
        assert!(tags.add("Theme", "Book RH"));
        assert!(!tags.add("Theme", "Book RH"));
        assert!(tags.add("Theme", "Payroll"));
        assert_eq!(tags.get("Theme").unwrap(), &["Book RH", "Payroll"]);
    }

    #[test]
    fn test_synthetic_clone_leaves_original_untouched() {
        let tags: TagCollection = [("Theme", "Book RH")].into_iter().collect();
        let summary_tags = tags.clone().with_synthetic_tag(SYNTHETIC_SUMMARY);

        assert!(summary_tags.is_synthetic(SYNTHETIC_SUMMARY));
        assert!(summary_tags.contains("Theme", "Book RH"));
        assert!(!tags.is_synthetic(SYNTHETIC_SUMMARY));
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_merge_is_union() {
        let mut a: TagCollection = [("Contract", "A"), ("Contract", "B")].into_iter().collect();
        let b: TagCollection = [("Contract", "B"), ("Contract", "C"), ("Theme", "X")]
            .into_iter()
            .collect();

        a.merge(&b);
        assert_eq!(a.get("Contract").unwrap(), &["A", "B", "C"]);
        assert_eq!(a.get("Theme").unwrap(), &["X"]);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let tags: TagCollection = [("Theme", "Book RH")].into_iter().collect();
        let json = serde_json::to_string(&tags).unwrap();
        assert_eq!(json, r#"{"Theme":["Book RH"]}"#);
    }
}
