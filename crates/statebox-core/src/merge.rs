#![forbid(unsafe_code)]

//! Shallow merge and keyed field access for record-shaped state.
//!
//! [`Merge`] backs [`StateBox::merge`](crate::StateBox::merge): the named
//! fields of the patch replace the corresponding fields of the value, every
//! other field is left untouched, and nested values are replaced wholesale
//! rather than merged recursively.
//!
//! Plain records implement it with a patch struct of `Option` fields:
//!
//! ```
//! use statebox_core::{BoxError, Merge, StateBox};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Profile {
//!     name: String,
//!     age: u32,
//! }
//!
//! #[derive(Default)]
//! struct ProfilePatch {
//!     name: Option<String>,
//!     age: Option<u32>,
//! }
//!
//! impl Merge for Profile {
//!     type Patch = ProfilePatch;
//!
//!     fn merge(&mut self, patch: ProfilePatch) -> Result<(), BoxError> {
//!         if let Some(name) = patch.name {
//!             self.name = name;
//!         }
//!         if let Some(age) = patch.age {
//!             self.age = age;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let profile = StateBox::new(Profile { name: "Foo".into(), age: 3 });
//! profile
//!     .merge(ProfilePatch { name: Some("Bar".into()), ..Default::default() })
//!     .unwrap();
//! assert_eq!(profile.get(), Profile { name: "Bar".into(), age: 3 });
//! ```

use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

use crate::error::BoxError;

/// A value that accepts a shallow patch.
pub trait Merge {
    /// Partial value applied by [`merge`](Self::merge).
    type Patch;

    /// Overwrite the fields named by `patch`.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::InvalidArgument`] if `self` or `patch` does not
    /// have a keyed shape. Implementations must leave `self` untouched on
    /// error.
    fn merge(&mut self, patch: Self::Patch) -> Result<(), BoxError>;
}

/// Keyed field access on top of [`Merge`], used by form bindings.
pub trait Fields: Merge {
    /// Type of a single field value.
    type Field: Clone;

    /// Current value of `key`, if present.
    fn field(&self, key: &str) -> Option<Self::Field>;

    /// Patch that sets `key` to `value` and nothing else.
    fn field_patch(key: &str, value: Self::Field) -> Self::Patch;
}

impl<K: Ord, V> Merge for BTreeMap<K, V> {
    type Patch = BTreeMap<K, V>;

    fn merge(&mut self, patch: Self::Patch) -> Result<(), BoxError> {
        self.extend(patch);
        Ok(())
    }
}

impl<K: Eq + Hash, V, S: BuildHasher> Merge for HashMap<K, V, S> {
    type Patch = Vec<(K, V)>;

    fn merge(&mut self, patch: Self::Patch) -> Result<(), BoxError> {
        self.extend(patch);
        Ok(())
    }
}

impl<V: Clone> Fields for BTreeMap<String, V> {
    type Field = V;

    fn field(&self, key: &str) -> Option<V> {
        self.get(key).cloned()
    }

    fn field_patch(key: &str, value: V) -> Self::Patch {
        BTreeMap::from([(key.to_string(), value)])
    }
}

impl<V: Clone, S: BuildHasher> Fields for HashMap<String, V, S> {
    type Field = V;

    fn field(&self, key: &str) -> Option<V> {
        self.get(key).cloned()
    }

    fn field_patch(key: &str, value: V) -> Self::Patch {
        vec![(key.to_string(), value)]
    }
}

#[cfg(feature = "json")]
impl Merge for serde_json::Value {
    type Patch = serde_json::Value;

    fn merge(&mut self, patch: Self::Patch) -> Result<(), BoxError> {
        let serde_json::Value::Object(patch) = patch else {
            return Err(BoxError::InvalidArgument(
                "merge patch must be a JSON object".into(),
            ));
        };
        let Some(target) = self.as_object_mut() else {
            return Err(BoxError::InvalidArgument(
                "merge target must be a JSON object".into(),
            ));
        };
        for (key, value) in patch {
            target.insert(key, value);
        }
        Ok(())
    }
}

#[cfg(feature = "json")]
impl Fields for serde_json::Value {
    type Field = serde_json::Value;

    fn field(&self, key: &str) -> Option<serde_json::Value> {
        self.get(key).cloned()
    }

    fn field_patch(key: &str, value: serde_json::Value) -> Self::Patch {
        let mut patch = serde_json::Map::new();
        patch.insert(key.to_string(), value);
        serde_json::Value::Object(patch)
    }
}
