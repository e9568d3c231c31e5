//! Method registry
//!
//! Maps case-sensitive method names to implementations. The registry is
//! populated by explicit registration calls at start-up and then shared
//! read-only (behind an `Arc`) for the duration of a run.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use reelforge_method_api::{Method, OutputKind};
pub use reelforge_utils::error::{DuplicateMethodError, RegistryError, UnknownMethodError};

/// A registered method
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub output_kind: OutputKind,
    pub implementation: Arc<dyn Method>,
}

impl MethodDescriptor {
    /// Descriptor using the implementation's own name and output kind
    #[must_use]
    pub fn from_method(implementation: Arc<dyn Method>) -> Self {
        Self {
            name: implementation.name().to_string(),
            output_kind: implementation.output_kind(),
            implementation,
        }
    }

    /// Descriptor registering `implementation` under an alias
    #[must_use]
    pub fn aliased(name: impl Into<String>, implementation: Arc<dyn Method>) -> Self {
        Self {
            name: name.into(),
            output_kind: implementation.output_kind(),
            implementation,
        }
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("output_kind", &self.output_kind)
            .finish_non_exhaustive()
    }
}

/// Serializable view of a descriptor for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodListing {
    pub name: String,
    pub output_kind: OutputKind,
}

/// How a registration treats an existing entry with the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Registration {
    /// Reject the registration
    #[default]
    Exclusive,
    /// Replace the existing entry and log the replacement
    Override,
}

/// Name → method mapping
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    methods: BTreeMap<String, MethodDescriptor>,
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty() {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
            reason: "name is empty".to_string(),
        });
    }
    if name.trim() != name {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
            reason: "name has surrounding whitespace".to_string(),
        });
    }
    Ok(())
}

impl MethodRegistry {
    /// Fresh, empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method; fails if the name is taken
    ///
    /// # Errors
    ///
    /// `RegistryError::Duplicate` when the name is already registered,
    /// `RegistryError::InvalidName` for an empty or padded name.
    pub fn register(&mut self, descriptor: MethodDescriptor) -> Result<(), RegistryError> {
        self.register_with(descriptor, Registration::Exclusive)
            .map(|_| ())
    }

    /// Register a method with an explicit conflict policy.
    ///
    /// Returns the replaced descriptor when `Registration::Override`
    /// replaced an existing entry.
    pub fn register_with(
        &mut self,
        descriptor: MethodDescriptor,
        mode: Registration,
    ) -> Result<Option<MethodDescriptor>, RegistryError> {
        validate_name(&descriptor.name)?;

        if self.methods.contains_key(&descriptor.name) && mode == Registration::Exclusive {
            return Err(DuplicateMethodError {
                name: descriptor.name,
            }
            .into());
        }

        let name = descriptor.name.clone();
        let replaced = self.methods.insert(name.clone(), descriptor);
        match &replaced {
            Some(previous) => warn!(
                method = %name,
                previous_kind = %previous.output_kind,
                "Replaced registered method"
            ),
            None => debug!(method = %name, "Registered method"),
        }
        Ok(replaced)
    }

    /// Look up a method by name
    ///
    /// # Errors
    ///
    /// `UnknownMethodError` listing the registered names.
    pub fn resolve(&self, name: &str) -> Result<&MethodDescriptor, UnknownMethodError> {
        self.methods.get(name).ok_or_else(|| UnknownMethodError {
            name: name.to_string(),
            known: self.names(),
        })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Descriptors ordered by name
    #[must_use]
    pub fn list(&self) -> Vec<&MethodDescriptor> {
        self.methods.values().collect()
    }

    /// Registered names, ordered
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    /// Serializable listing ordered by name
    #[must_use]
    pub fn listing(&self) -> Vec<MethodListing> {
        self.methods
            .values()
            .map(|d| MethodListing {
                name: d.name.clone(),
                output_kind: d.output_kind,
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
