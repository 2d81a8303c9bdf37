//! Subject type registry
//!
//! Maps a subject type tag (`user`, `group`, ...) to a descriptor of what
//! that type supports. Types can be registered at any time, so a host can add
//! its own kinds of subject after startup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use pexrs_engine::{StoreError, StoreResult};
use pexrs_sdk::{SubjectData, SubjectRef, SUBJECTS_DEFAULTS, SUBJECTS_GROUP, SUBJECTS_USER};

/// Identifier check applied before a subject of this type is written
pub type IdentifierValidator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// What a subject type supports
#[derive(Clone)]
pub struct SubjectTypeDescriptor {
    validator: IdentifierValidator,
    default_data: Option<Arc<SubjectData>>,
    transient: bool,
}

impl SubjectTypeDescriptor {
    /// Descriptor accepting any non-empty identifier without whitespace
    pub fn new() -> Self {
        Self {
            validator: Arc::new(plain_identifier),
            default_data: None,
            transient: false,
        }
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.validator = Arc::new(validator);
        self
    }

    /// Data used for subjects of this type that have nothing stored
    pub fn with_default_data(mut self, data: SubjectData) -> Self {
        self.default_data = Some(Arc::new(data));
        self
    }

    /// Transient subjects are left out of exports
    pub fn transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    pub fn is_valid(&self, identifier: &str) -> bool {
        (self.validator)(identifier)
    }

    pub fn default_data(&self) -> Option<&Arc<SubjectData>> {
        self.default_data.as_ref()
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

impl Default for SubjectTypeDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubjectTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectTypeDescriptor")
            .field("default_data", &self.default_data.is_some())
            .field("transient", &self.transient)
            .finish_non_exhaustive()
    }
}

fn plain_identifier(identifier: &str) -> bool {
    !identifier.is_empty() && !identifier.chars().any(char::is_whitespace)
}

/// Registry of known subject types
pub struct SubjectTypeRegistry {
    types: RwLock<HashMap<String, SubjectTypeDescriptor>>,
}

impl SubjectTypeRegistry {
    /// Empty registry; every type is unknown
    pub fn empty() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the `user`, `group` and `default` types
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        for subject_type in [SUBJECTS_USER, SUBJECTS_GROUP, SUBJECTS_DEFAULTS] {
            registry.register(subject_type, SubjectTypeDescriptor::new());
        }
        registry
    }

    /// Register or replace a type. Returns the previous descriptor.
    pub fn register(
        &self,
        subject_type: &str,
        descriptor: SubjectTypeDescriptor,
    ) -> Option<SubjectTypeDescriptor> {
        tracing::debug!("Registered subject type '{}'", subject_type);
        self.types.write().insert(subject_type.to_string(), descriptor)
    }

    pub fn unregister(&self, subject_type: &str) -> Option<SubjectTypeDescriptor> {
        self.types.write().remove(subject_type)
    }

    pub fn get(&self, subject_type: &str) -> Option<SubjectTypeDescriptor> {
        self.types.read().get(subject_type).cloned()
    }

    pub fn is_registered(&self, subject_type: &str) -> bool {
        self.types.read().contains_key(subject_type)
    }

    /// Registered type names, sorted
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.types.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Check a subject before it is written
    ///
    /// Subjects of unregistered types pass.
    pub fn validate(&self, subject: &SubjectRef) -> StoreResult<()> {
        let types = self.types.read();
        let Some(descriptor) = types.get(subject.subject_type()) else {
            tracing::debug!("Writing subject of unregistered type: {}", subject);
            return Ok(());
        };

        if descriptor.is_valid(subject.identifier()) {
            Ok(())
        } else {
            Err(StoreError::InvalidSubject {
                subject: subject.clone(),
                reason: format!("invalid identifier for type '{}'", subject.subject_type()),
            })
        }
    }

    pub fn default_data(&self, subject: &SubjectRef) -> Option<Arc<SubjectData>> {
        self.types
            .read()
            .get(subject.subject_type())
            .and_then(|d| d.default_data().cloned())
    }

    pub fn is_transient(&self, subject_type: &str) -> bool {
        self.types
            .read()
            .get(subject_type)
            .is_some_and(SubjectTypeDescriptor::is_transient)
    }
}

impl Default for SubjectTypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
