//! State keys.
//!
//! Every node in a state tree is identified by an explicit [`StateKey`].
//! Keys are compared by value, never by position in the tree.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Opaque, tree-unique identifier of a state.
///
/// Keys are cheap to clone and serialize as plain strings, which is also
/// their representation in saved checkpoints.
///
/// # Example
///
/// ```rust
/// use treestate::core::StateKey;
///
/// let locked = StateKey::new("locked");
/// assert_eq!(locked.as_str(), "locked");
/// assert_eq!(locked, StateKey::from("locked"));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey(Arc<str>);

impl StateKey {
    /// Create a key from any string-like value.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The key's string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateKey({})", self.0)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for StateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(StateKey::from)
    }
}

impl PartialEq<str> for StateKey {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for StateKey {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl From<&str> for StateKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StateKey {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&StateKey> for StateKey {
    fn from(key: &StateKey) -> Self {
        key.clone()
    }
}

/// A [`StateKey`] that also pins the type `D` of the state's data value.
///
/// Looking up data through a `DataStateKey<D>` yields a typed
/// `DataValue<D>` without the caller naming the type again.
pub struct DataStateKey<D> {
    key: StateKey,
    _data: PhantomData<fn() -> D>,
}

impl<D> DataStateKey<D> {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            key: StateKey::new(name),
            _data: PhantomData,
        }
    }

    /// The untyped key.
    pub fn key(&self) -> &StateKey {
        &self.key
    }
}

impl<D> Clone for DataStateKey<D> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            _data: PhantomData,
        }
    }
}

impl<D> PartialEq for DataStateKey<D> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<D> Eq for DataStateKey<D> {}

impl<D> fmt::Debug for DataStateKey<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataStateKey<{}>({})",
            std::any::type_name::<D>(),
            self.key
        )
    }
}

impl<D> fmt::Display for DataStateKey<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.key, f)
    }
}

impl<D> From<DataStateKey<D>> for StateKey {
    fn from(key: DataStateKey<D>) -> Self {
        key.key
    }
}

impl<D> From<&DataStateKey<D>> for StateKey {
    fn from(key: &DataStateKey<D>) -> Self {
        key.key.clone()
    }
}

impl<D> PartialEq<StateKey> for DataStateKey<D> {
    fn eq(&self, other: &StateKey) -> bool {
        &self.key == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_compare_by_value() {
        assert_eq!(StateKey::new("open"), StateKey::from("open".to_string()));
        assert_ne!(StateKey::new("open"), StateKey::new("closed"));
    }

    #[test]
    fn key_serializes_as_plain_string() {
        let json = serde_json::to_string(&StateKey::new("locked")).unwrap();
        assert_eq!(json, "\"locked\"");

        let key: StateKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key.as_str(), "locked");

        let binary = bincode::serialize(&key).unwrap();
        assert_eq!(bincode::deserialize::<StateKey>(&binary).unwrap(), key);
    }

    #[test]
    fn data_key_converts_to_untyped_key() {
        let typed: DataStateKey<u32> = DataStateKey::new("counter");
        let key: StateKey = (&typed).into();
        assert_eq!(key, StateKey::new("counter"));
        assert!(typed == key);
    }

    #[test]
    fn display_uses_bare_name() {
        assert_eq!(StateKey::new("idle").to_string(), "idle");
        assert_eq!(format!("{:?}", StateKey::new("idle")), "StateKey(idle)");
    }
}
