use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label mapping written by the training process next to its models.
///
/// Keys of `index2label` are class indices rendered as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDetails {
    pub index2label: BTreeMap<String, String>,

    #[serde(default)]
    pub label2index: BTreeMap<String, usize>,
}

impl DataDetails {
    /// Builds a mapping from labels listed in class-index order.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut details = Self::default();
        for (index, label) in labels.into_iter().enumerate() {
            let label = label.into();
            details.label2index.insert(label.clone(), index);
            details.index2label.insert(index.to_string(), label);
        }
        details
    }

    /// Label of the class at `index`.
    #[must_use]
    pub fn label_for(&self, index: usize) -> Option<&str> {
        self.index2label.get(&index.to_string()).map(String::as_str)
    }

    /// Number of classes, provided the indices are exactly `0..n`.
    ///
    /// Returns `None` when the mapping has gaps or non-numeric keys.
    #[must_use]
    pub fn class_count(&self) -> Option<usize> {
        let count = self.index2label.len();
        (0..count)
            .all(|index| self.index2label.contains_key(&index.to_string()))
            .then_some(count)
    }
}
