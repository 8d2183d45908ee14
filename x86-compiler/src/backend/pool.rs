//! Deduplicated string constants.

use crate::ir::Label;
use std::collections::HashMap;

const STR_PREFIX: &str = "_S";

/// Label of the `index`-th pooled string.
pub fn string_label(index: usize) -> Label {
    Label(format!("{STR_PREFIX}{index}"))
}

/// Literal text → insertion-ordered ordinal. Interning is idempotent.
#[derive(Debug, Default, Clone)]
pub struct StringPool {
    strings: Vec<String>,
    index: HashMap<String, usize>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, s: &str) -> usize {
        if let Some(&i) = self.index.get(s) {
            return i;
        }
        let i = self.strings.len();
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), i);
        i
    }

    pub fn get(&self, s: &str) -> Option<usize> {
        self.index.get(s).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Pooled strings with their ordinals, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.strings.iter().map(String::as_str).enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent_and_ordered() {
        let mut pool = StringPool::new();
        assert_eq!(pool.add("hello"), 0);
        assert_eq!(pool.add("world"), 1);
        assert_eq!(pool.add("hello"), 0);
        assert_eq!(pool.len(), 2);
        let all: Vec<_> = pool.iter().collect();
        assert_eq!(all, vec![(0, "hello"), (1, "world")]);
        assert_eq!(string_label(1).as_str(), "_S1");
    }
}
