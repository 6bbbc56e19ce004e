use std::sync::{PoisonError, RwLock};

use crate::value::Value;

/// Ordered name → value table applied to the script namespace before each run.
///
/// A name keeps the position of its first insertion; later writes replace the value.
#[derive(Debug, Default)]
pub struct Bindings {
    entries: RwLock<Vec<(String, Value)>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        upsert(&mut entries, name.into(), value.into());
    }

    pub fn merge<I, K, V>(&self, bindings: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for (name, value) in bindings {
            upsert(&mut entries, name.into(), value.into());
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// The bindings as they stand now, in insertion order.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn upsert(entries: &mut Vec<(String, Value)>, name: String, value: Value) {
    match entries.iter_mut().find(|(k, _)| *k == name) {
        Some((_, slot)) => *slot = value,
        None => entries.push((name, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins_and_order_is_kept() {
        let bindings = Bindings::new();
        bindings.set("a", 1);
        bindings.set("b", "two");
        bindings.set("a", 3);

        assert_eq!(
            bindings.snapshot(),
            vec![
                ("a".to_string(), Value::Integer(3)),
                ("b".to_string(), Value::from("two")),
            ]
        );
    }

    #[test]
    fn test_merge() {
        let bindings = Bindings::new();
        bindings.set("x", true);
        bindings.merge([("y", Value::Nil), ("x", Value::Bool(false))]);

        assert_eq!(bindings.names(), vec!["x".to_string(), "y".to_string()]);
        assert_eq!(bindings.get("x"), Some(Value::Bool(false)));
        assert_eq!(bindings.get("z"), None);
        assert_eq!(bindings.len(), 2);
    }
}
