//! # DataType Registry
//!
//! Maps the stable type tag embedded in a datatype file (`module.TypeName`)
//! to a constructor for that kind. Tags must be registered before loading;
//! a miss fails fast with `ImportError::UnknownArtifactType`.

use crate::model::DataType;
use crate::{ImportError, Result};
use std::collections::BTreeMap;

/// Builds a blank datatype of one kind.
pub type DataTypeConstructor = fn() -> DataType;

/// Registry of known datatype kinds.
#[derive(Debug, Clone, Default)]
pub struct DataTypeRegistry {
    constructors: BTreeMap<String, DataTypeConstructor>,
}

fn time_series() -> DataType {
    DataType::blank("TimeSeries", "datatypes.time_series", &["data", "time"])
}

fn connectivity() -> DataType {
    DataType::blank(
        "Connectivity",
        "datatypes.connectivity",
        &["weights", "tract_lengths", "centres"],
    )
}

fn surface() -> DataType {
    DataType::blank("Surface", "datatypes.surfaces", &["vertices", "triangles"])
}

fn value_wrapper() -> DataType {
    DataType::blank("ValueWrapper", "datatypes.mapped_values", &[])
}

impl DataTypeRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the kinds shipped with this crate.
    #[must_use]
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        for constructor in [
            time_series as DataTypeConstructor,
            connectivity,
            surface,
            value_wrapper,
        ] {
            registry.register(constructor);
        }
        registry
    }

    /// Register a kind under the tag of the instance it builds.
    pub fn register(&mut self, constructor: DataTypeConstructor) {
        let tag = constructor().type_tag();
        self.constructors.insert(tag, constructor);
    }

    /// Build a blank instance of the kind named by `module` and `type_name`.
    pub fn create(&self, module: &str, type_name: &str) -> Result<DataType> {
        let tag = format!("{}.{}", module, type_name);
        self.constructors
            .get(&tag)
            .map(|constructor| constructor())
            .ok_or(ImportError::UnknownArtifactType(tag))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Registered tags, in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

// =============================================================================
// TESTS
// =============================================================================
