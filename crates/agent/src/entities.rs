//! Lexicon entity extractor
//!
//! Fills structured slots from configurable per-category term lists plus a
//! measurement pattern. Matching is case-insensitive substring search, so
//! Korean terms match inside inflected words (`고혈압이` → `고혈압`).

use async_trait::async_trait;
use regex::Regex;

use medirag_config::LexiconConfig;
use medirag_core::{EntityCategory, EntityExtractor, EntitySlots};
use medirag_rag::MEASUREMENT_PATTERN;

use crate::AgentError;

pub struct LexiconEntityExtractor {
    /// (category, original term, lowercased term)
    terms: Vec<(EntityCategory, String, String)>,
    measurement: Regex,
}

impl LexiconEntityExtractor {
    pub fn new(lexicon: &LexiconConfig) -> Result<Self, AgentError> {
        let mut terms = Vec::new();
        let lists = [
            (EntityCategory::Conditions, &lexicon.conditions),
            (EntityCategory::Symptoms, &lexicon.symptoms),
            (EntityCategory::Medications, &lexicon.medications),
        ];
        for (category, list) in lists {
            for term in list {
                let trimmed = term.trim();
                if !trimmed.is_empty() {
                    terms.push((category, trimmed.to_string(), trimmed.to_lowercase()));
                }
            }
        }
        // longer terms first so "type 2 diabetes" is seen before "diabetes"
        terms.sort_by(|a, b| b.2.chars().count().cmp(&a.2.chars().count()));

        let measurement =
            Regex::new(MEASUREMENT_PATTERN).map_err(|e| AgentError::Config(e.to_string()))?;
        Ok(Self { terms, measurement })
    }

    /// Synchronous extraction
    pub fn extract_slots(&self, text: &str) -> EntitySlots {
        let lower = text.to_lowercase();
        let mut slots = EntitySlots::new();
        let mut covered: Vec<String> = Vec::new();

        for (category, term, needle) in &self.terms {
            if !lower.contains(needle.as_str()) {
                continue;
            }
            // skip a term that is only present inside a longer matched term
            if covered.iter().any(|c| c.contains(needle.as_str())) && lower.matches(needle.as_str()).count() == 1 {
                continue;
            }
            covered.push(needle.clone());
            slots.insert(*category, term.clone());
        }

        for m in self.measurement.find_iter(text) {
            slots.insert(EntityCategory::Measurements, m.as_str());
        }
        slots
    }
}

#[async_trait]
impl EntityExtractor for LexiconEntityExtractor {
    async fn extract(&self, text: &str) -> medirag_core::Result<EntitySlots> {
        Ok(self.extract_slots(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> LexiconEntityExtractor {
        LexiconEntityExtractor::new(&LexiconConfig {
            conditions: vec!["고혈압".into(), "당뇨".into(), "type 2 diabetes".into(), "diabetes".into()],
            symptoms: vec!["두통".into(), "headache".into()],
            medications: vec!["메트포르민".into(), "Metformin".into()],
        })
        .unwrap()
    }

    #[test]
    fn test_extracts_korean_inside_words() {
        let slots = extractor().extract_slots("고혈압이 있는데 두통이 심해요");
        assert_eq!(slots.get(EntityCategory::Conditions), ["고혈압"]);
        assert_eq!(slots.get(EntityCategory::Symptoms), ["두통"]);
        assert_eq!(slots.concept_count(), 2);
    }

    #[test]
    fn test_keeps_original_casing_and_measurements() {
        let slots = extractor().extract_slots("Is metformin 500mg ok with BP 150/95 mmHg?");
        assert_eq!(slots.get(EntityCategory::Medications), ["Metformin"]);
        let measurements = slots.get(EntityCategory::Measurements);
        assert!(measurements.iter().any(|m| m == "500mg"));
        assert!(measurements.iter().any(|m| m == "150/95 mmHg"));
    }

    #[test]
    fn test_longer_term_shadows_contained_term() {
        let slots = extractor().extract_slots("type 2 diabetes diet");
        assert_eq!(slots.get(EntityCategory::Conditions), ["type 2 diabetes"]);
    }

    #[test]
    fn test_nothing_found() {
        assert!(extractor().extract_slots("오늘 날씨 어때요").is_empty());
    }

    #[tokio::test]
    async fn test_trait_extract() {
        let e: &dyn EntityExtractor = &extractor();
        let slots = e.extract("당뇨약 메트포르민").await.unwrap();
        assert_eq!(slots.concept_count(), 2);
    }
}
