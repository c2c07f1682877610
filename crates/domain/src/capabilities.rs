//! Provider capability descriptors and request modes.
//!
//! A request may ask the provider for extended capabilities (structured
//! output, search grounding). Not every model supports them; the
//! [`CapabilityMap`] records, per model, which capabilities are known to be
//! available so the negotiator can skip an enhanced attempt that is certain to
//! fail.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::ModelId;

// ---------------------------------------------------------------------------
// Capability flags
// ---------------------------------------------------------------------------

/// An extended provider capability a request may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// The provider constrains its answer to JSON (optionally against a schema).
    StructuredOutput,
    /// The provider may ground its answer with a web search tool.
    SearchGrounding,
    /// The provider can return image parts.
    ImageOutput,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Capability::StructuredOutput => "structured_output",
            Capability::SearchGrounding => "search_grounding",
            Capability::ImageOutput => "image_output",
        };
        f.write_str(s)
    }
}

/// A small ordered set of [`Capability`] flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// The empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if no capability is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if `capability` is present.
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Adds `capability` to the set.
    pub fn insert(&mut self, capability: Capability) {
        self.0.insert(capability);
    }

    /// Returns `true` if every capability of `other` is also in `self`.
    pub fn is_superset(&self, other: &CapabilitySet) -> bool {
        self.0.is_superset(&other.0)
    }

    /// Capabilities of `self` that are missing from `available`.
    pub fn missing_from(&self, available: &CapabilitySet) -> CapabilitySet {
        Self(self.0.difference(&available.0).copied().collect())
    }

    /// Iterates the capabilities in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Capability descriptor lookup
// ---------------------------------------------------------------------------

/// Explicit capability descriptors keyed by model identifier.
///
/// Models absent from the map are treated as "unknown": the negotiator tries
/// the enhanced request and relies on the provider to reject it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityMap(HashMap<ModelId, CapabilitySet>);

impl CapabilityMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the capability set of `model`, replacing any previous entry.
    pub fn insert(&mut self, model: ModelId, capabilities: CapabilitySet) {
        self.0.insert(model, capabilities);
    }

    /// Builder-style variant of [`CapabilityMap::insert`].
    pub fn with(mut self, model: ModelId, capabilities: CapabilitySet) -> Self {
        self.insert(model, capabilities);
        self
    }

    /// Returns the known capability set of `model`, if described.
    pub fn lookup(&self, model: &ModelId) -> Option<&CapabilitySet> {
        self.0.get(model)
    }

    /// Returns `true` when `model` is described and lacks at least one of
    /// `requested`. Unknown models always return `false`.
    pub fn known_to_lack(&self, model: &ModelId, requested: &CapabilitySet) -> bool {
        match self.lookup(model) {
            Some(available) => !available.is_superset(requested),
            None => false,
        }
    }

    /// Number of described models.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no model is described.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Request mode
// ---------------------------------------------------------------------------

/// Which mode a provider request was issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// Requested extended capabilities are included.
    Enhanced,
    /// Requested extended capabilities are stripped.
    Baseline,
}

impl std::fmt::Display for RequestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestMode::Enhanced => f.write_str("enhanced"),
            RequestMode::Baseline => f.write_str("baseline"),
        }
    }
}
