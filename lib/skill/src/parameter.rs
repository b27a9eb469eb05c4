//! Parameter specs.
//!
//! A parameter spec describes one value a skill collects: the question that
//! asks for it, how the answer is parsed, whether the parsed value is
//! enriched by a resolver, whether the user must confirm it, and which other
//! parameters it was derived from.

use crate::error::{ParseError, ResolutionError};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Turns raw user input into a parameter value.
pub trait Parser: Send + Sync {
    /// Parses the input, or explains why it does not fit.
    fn parse(&self, input: &str) -> Result<JsonValue, ParseError>;
}

impl<F> Parser for F
where
    F: Fn(&str) -> Result<JsonValue, ParseError> + Send + Sync,
{
    fn parse(&self, input: &str) -> Result<JsonValue, ParseError> {
        self(input)
    }
}

/// Enriches a parsed value, typically through an external lookup.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Returns the enriched value.
    async fn reason(&self, value: JsonValue) -> Result<JsonValue, ResolutionError>;
}

/// Derives a candidate value from parameters that are already confirmed.
pub trait Proposer: Send + Sync {
    /// Returns the candidate, or `None` when the user has to be asked.
    fn propose(&self, confirmed: &BTreeMap<String, JsonValue>) -> Option<JsonValue>;
}

impl<F> Proposer for F
where
    F: Fn(&BTreeMap<String, JsonValue>) -> Option<JsonValue> + Send + Sync,
{
    fn propose(&self, confirmed: &BTreeMap<String, JsonValue>) -> Option<JsonValue> {
        self(confirmed)
    }
}

type ConfirmFn = dyn Fn(&JsonValue) -> String + Send + Sync;

/// Describes how a single parameter is collected.
#[derive(Clone)]
pub struct ParameterSpec {
    name: String,
    key: String,
    message: String,
    reask_message: Option<String>,
    invalid_message: Option<String>,
    needs_confirmation: bool,
    parser: Arc<dyn Parser>,
    resolver: Option<Arc<dyn Resolver>>,
    proposer: Option<Arc<dyn Proposer>>,
    confirm: Arc<ConfirmFn>,
    depends_on: BTreeSet<String>,
}

impl ParameterSpec {
    /// Creates a spec that accepts any non-blank text.
    ///
    /// The catalog key defaults to the parameter name.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            name,
            message: message.into(),
            reask_message: None,
            invalid_message: None,
            needs_confirmation: false,
            parser: Arc::new(parsers::Text),
            resolver: None,
            proposer: None,
            confirm: Arc::new(|value: &JsonValue| {
                format!("Is \"{}\" correct?", display_value(value))
            }),
            depends_on: BTreeSet::new(),
        }
    }

    /// Registers the spec under a catalog key different from its name.
    ///
    /// Dynamic collection requests reference specs by key; a spec whose name
    /// matches an existing parameter replaces that parameter's spec.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Question used when the parameter is asked again after a rejection.
    #[must_use]
    pub fn with_reask_message(mut self, message: impl Into<String>) -> Self {
        self.reask_message = Some(message.into());
        self
    }

    /// Annotation sent when input fails to parse.
    #[must_use]
    pub fn with_invalid_message(mut self, message: impl Into<String>) -> Self {
        self.invalid_message = Some(message.into());
        self
    }

    /// Requires the user to confirm the parsed value before it is committed.
    #[must_use]
    pub fn needs_confirmation(mut self) -> Self {
        self.needs_confirmation = true;
        self
    }

    /// Uses the given parser.
    #[must_use]
    pub fn parser(mut self, parser: impl Parser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    /// Uses a closure as the parser.
    #[must_use]
    pub fn parse_with<F>(mut self, parse: F) -> Self
    where
        F: Fn(&str) -> Result<JsonValue, ParseError> + Send + Sync + 'static,
    {
        self.parser = Arc::new(parse);
        self
    }

    /// Enriches parsed values with the given resolver.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Proposes a value derived from confirmed parameters.
    #[must_use]
    pub fn propose_with<F>(mut self, propose: F) -> Self
    where
        F: Fn(&BTreeMap<String, JsonValue>) -> Option<JsonValue> + Send + Sync + 'static,
    {
        self.proposer = Some(Arc::new(propose));
        self
    }

    /// Builds the confirmation prompt from the (enriched) value.
    #[must_use]
    pub fn confirm_with<F>(mut self, confirm: F) -> Self
    where
        F: Fn(&JsonValue) -> String + Send + Sync + 'static,
    {
        self.confirm = Arc::new(confirm);
        self
    }

    /// Declares that this parameter was derived from `dependency`.
    #[must_use]
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.insert(dependency.into());
        self
    }

    /// Parameter name, as it appears in `confirmed` and `to_confirm`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Catalog key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The regular question.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The question used after a rejection; falls back to the regular one.
    #[must_use]
    pub fn reask_message(&self) -> &str {
        self.reask_message.as_deref().unwrap_or(&self.message)
    }

    /// Annotation for unparseable input, if the spec overrides the default.
    #[must_use]
    pub fn invalid_message(&self) -> Option<&str> {
        self.invalid_message.as_deref()
    }

    /// Whether a parsed value must be confirmed before commit.
    #[must_use]
    pub fn requires_confirmation(&self) -> bool {
        self.needs_confirmation
    }

    /// Parameters this one was derived from.
    #[must_use]
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.depends_on
    }

    /// Parses user input.
    ///
    /// `null` is never a committable value, so a parser producing it is
    /// treated as having rejected the input.
    pub fn parse(&self, input: &str) -> Result<JsonValue, ParseError> {
        match self.parser.parse(input)? {
            JsonValue::Null => Err(ParseError::new("empty value")),
            value => Ok(value),
        }
    }

    /// Returns the resolver, if the spec enriches values.
    #[must_use]
    pub fn resolver_ref(&self) -> Option<&Arc<dyn Resolver>> {
        self.resolver.as_ref()
    }

    /// Derives a candidate value from confirmed parameters.
    #[must_use]
    pub fn propose(&self, confirmed: &BTreeMap<String, JsonValue>) -> Option<JsonValue> {
        self.proposer
            .as_ref()
            .and_then(|p| p.propose(confirmed))
            .filter(|v| !v.is_null())
    }

    /// Builds the confirmation prompt text.
    #[must_use]
    pub fn confirm_message(&self, value: &JsonValue) -> String {
        (self.confirm)(value)
    }
}

impl fmt::Debug for ParameterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSpec")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("needs_confirmation", &self.needs_confirmation)
            .field("has_resolver", &self.resolver.is_some())
            .field("has_proposer", &self.proposer.is_some())
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

/// Renders a value the way a user would type it.
///
/// Strings are shown without quotes; everything else as compact JSON.
#[must_use]
pub fn display_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reusable parsers.
pub mod parsers {
    use super::{JsonValue, ParseError, Parser};

    /// Accepts any non-blank text, trimmed.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Text;

    impl Parser for Text {
        fn parse(&self, input: &str) -> Result<JsonValue, ParseError> {
            let trimmed = input.trim();
            if trimmed.is_empty() {
                return Err(ParseError::new("input is blank"));
            }
            Ok(JsonValue::String(trimmed.to_string()))
        }
    }

    /// Accepts exactly one of a fixed set of options.
    #[derive(Debug, Clone)]
    pub struct OneOf {
        options: Vec<String>,
    }

    impl OneOf {
        /// Creates a parser accepting the given options.
        #[must_use]
        pub fn new(options: impl IntoIterator<Item = impl Into<String>>) -> Self {
            Self {
                options: options.into_iter().map(Into::into).collect(),
            }
        }

        /// The accepted options, in declaration order.
        #[must_use]
        pub fn options(&self) -> &[String] {
            &self.options
        }
    }

    impl Parser for OneOf {
        fn parse(&self, input: &str) -> Result<JsonValue, ParseError> {
            let trimmed = input.trim();
            self.options
                .iter()
                .find(|o| o.as_str() == trimmed)
                .map(|o| JsonValue::String(o.clone()))
                .ok_or_else(|| {
                    ParseError::new(format!("expected one of: {}", self.options.join(", ")))
                })
        }
    }
}
