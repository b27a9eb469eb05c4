//! Error types for the skill crate.
//!
//! - `ParseError`: user input does not have the shape a parameter expects
//! - `ResolutionError`: enriching a parsed value failed (usually transient)
//! - `FulfillmentError`: the skill's completion hook failed
//! - `SkillError`: a skill definition is inconsistent
//! - `SkillNotFound`: registry lookup for an unregistered name

use std::fmt;

/// User input could not be parsed into a parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Why the input was rejected.
    pub reason: String,
}

impl ParseError {
    /// Creates a parse error with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not parse input: {}", self.reason)
    }
}

impl std::error::Error for ParseError {}

/// Enriching a parsed value failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The lookup backend could not be reached or answered with an error.
    Unavailable { reason: String },
    /// The backend answered, but had nothing for this value.
    NoMatch { value: String },
}

impl ResolutionError {
    /// Returns true if retrying the same value may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "resolver unavailable: {reason}"),
            Self::NoMatch { value } => write!(f, "no match for '{value}'"),
        }
    }
}

impl std::error::Error for ResolutionError {}

/// The skill's completion hook failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentError {
    /// Skill that failed.
    pub skill: String,
    /// What went wrong.
    pub reason: String,
}

impl fmt::Display for FulfillmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skill '{}' failed to fulfill: {}", self.skill, self.reason)
    }
}

impl std::error::Error for FulfillmentError {}

/// A skill definition is inconsistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillError {
    /// Two parameter specs share a catalog key, or two required specs share
    /// a name.
    DuplicateParameter { skill: String, key: String },
    /// A parameter declares a dependency on a name no spec provides.
    UnknownDependency {
        skill: String,
        parameter: String,
        dependency: String,
    },
    /// A dynamic collection request referenced a key missing from the catalog.
    UnknownParameter { skill: String, key: String },
}

impl fmt::Display for SkillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateParameter { skill, key } => {
                write!(f, "skill '{skill}' declares parameter '{key}' twice")
            }
            Self::UnknownDependency {
                skill,
                parameter,
                dependency,
            } => write!(
                f,
                "parameter '{parameter}' of skill '{skill}' depends on unknown parameter '{dependency}'"
            ),
            Self::UnknownParameter { skill, key } => {
                write!(f, "skill '{skill}' has no parameter '{key}'")
            }
        }
    }
}

impl std::error::Error for SkillError {}

/// No skill is registered under the requested name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillNotFound {
    /// The name that was looked up.
    pub name: String,
}

impl fmt::Display for SkillNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skill not found: {}", self.name)
    }
}

impl std::error::Error for SkillNotFound {}
