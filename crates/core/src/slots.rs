//! Structured slots extracted from a query

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entity categories the domain extractor fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Conditions,
    Symptoms,
    Medications,
    Measurements,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 4] = [
        EntityCategory::Conditions,
        EntityCategory::Symptoms,
        EntityCategory::Medications,
        EntityCategory::Measurements,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCategory::Conditions => "conditions",
            EntityCategory::Symptoms => "symptoms",
            EntityCategory::Medications => "medications",
            EntityCategory::Measurements => "measurements",
        }
    }
}

/// Named entities by category
///
/// Entities within a category are deduplicated and kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitySlots {
    entities: BTreeMap<EntityCategory, Vec<String>>,
}

impl EntitySlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity, ignoring duplicates and blanks
    pub fn insert(&mut self, category: EntityCategory, entity: impl Into<String>) {
        let entity = entity.into();
        let entity = entity.trim();
        if entity.is_empty() {
            return;
        }
        let list = self.entities.entry(category).or_default();
        if !list.iter().any(|e| e == entity) {
            list.push(entity.to_string());
        }
    }

    /// Builder-style insert
    pub fn with(mut self, category: EntityCategory, entity: impl Into<String>) -> Self {
        self.insert(category, entity);
        self
    }

    pub fn get(&self, category: EntityCategory) -> &[String] {
        self.entities
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of concepts across all categories
    pub fn concept_count(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }

    /// Whether any medical entity is present
    pub fn has_entities(&self) -> bool {
        self.concept_count() > 0
    }

    pub fn is_empty(&self) -> bool {
        !self.has_entities()
    }

    /// Iterate non-empty categories
    pub fn iter(&self) -> impl Iterator<Item = (EntityCategory, &[String])> {
        self.entities
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (*k, v.as_slice()))
    }

    /// Render as `category: a, b` lines for prompts
    pub fn describe(&self) -> String {
        self.iter()
            .map(|(category, values)| format!("{}: {}", category.as_str(), values.join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
