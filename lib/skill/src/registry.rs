//! Skill registry.
//!
//! Built once at startup, then shared read-only behind an `Arc`. There is
//! no way to register skills once the engine holds the registry.

use crate::definition::SkillDefinition;
use crate::error::SkillNotFound;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of skill definitions, keyed by skill name.
#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills: HashMap<String, Arc<SkillDefinition>>,
}

impl SkillRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            skills: HashMap::new(),
        }
    }

    /// Registers a definition, replacing any previous one with the same name.
    pub fn register(&mut self, definition: SkillDefinition) {
        tracing::debug!(skill = definition.name(), "registering skill");
        self.skills
            .insert(definition.name().to_string(), Arc::new(definition));
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, definition: SkillDefinition) -> Self {
        self.register(definition);
        self
    }

    /// Looks up a skill by name.
    ///
    /// # Errors
    ///
    /// Returns [`SkillNotFound`] when no skill is registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<Arc<SkillDefinition>, SkillNotFound> {
        self.skills.get(name).cloned().ok_or_else(|| SkillNotFound {
            name: name.to_string(),
        })
    }

    /// Returns whether a skill is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    /// Returns registered skill names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.skills.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered skills.
    #[must_use]
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}
