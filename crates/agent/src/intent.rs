//! Intent triage
//!
//! Rule-based decision of whether a query needs retrieval and how many
//! documents to fetch. Rules run in order and the first match wins:
//!
//! 1. short greeting / acknowledgment: no retrieval, k = 0
//! 2. medical entities present: complexity from concept count and length
//! 3. follow-up pronoun with history: simple; factual-question pattern:
//!    complexity from length alone
//! 4. otherwise conversational, no retrieval
//!
//! Classification never blocks a turn: a failure maps to
//! [`Complexity::ErrorFallback`] with retrieval at the default k.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use medirag_config::constants::intent as defaults;
use medirag_config::IntentConfig;
use medirag_core::{EntityExtractor, EntitySlots, Turn};

use crate::AgentError;

static GREETING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(안녕하세요|안녕하십니까|안녕|반갑습니다|반가워요|처음 뵙겠습니다|좋은 (아침|하루)(이에요|입니다)?|hello|hi|hey|good (morning|afternoon|evening))[\s!.~,^]*(선생님|의사 선생님|there|doctor)?[\s!.~,^]*$",
    )
    .expect("greeting pattern is valid")
});

static ACKNOWLEDGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(감사합니다|감사해요|고마워요|고맙습니다|네|넵|예|알겠습니다|알겠어요|좋아요|그렇군요|이해했어요|ok|okay|thanks|thank you|got it|sure)[\s!.~,^]*$",
    )
    .expect("acknowledgment pattern is valid")
});

static FACTUAL: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // interrogatives
        r"\?|？",
        r"무엇|뭐|뭔가요|어떻게|어떤|왜|언제|어디|얼마|어느|누가|몇",
        r"(인가요|나요|까요|습니까|되나요|있나요|없나요|괜찮나요|가능한가요)\s*$",
        r"(?i)\b(what|how|why|when|where|which|who|is it|can i|should i|does|do i)\b",
        // domain keywords
        r"증상|치료|약물|약국|처방|복용|부작용|진단|검사|수치|혈압|혈당|병원|질환|예방|원인",
        // bare 약 only as its own word, so 약속 and 약간 stay conversational
        r"(?:^|\s)약(?:을|이|은|도|만|의|에|은요|이요)?(?:\s|$|[?.!,])",
        r"(?i)\b(symptoms?|treatment|dose|dosage|side effects?|diagnosis|medication)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("factual pattern is valid"))
    .collect()
});

static FOLLOW_UP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(그거|그것|이거|이것|그건|이건|그럼|그러면|그 약|이 약|\b(that|it|this|those|them)\b)")
        .expect("follow-up pattern is valid")
});

/// Query complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    Conversational,
    Greeting,
    Acknowledgment,
    ErrorFallback,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
            Complexity::Conversational => "conversational",
            Complexity::Greeting => "greeting",
            Complexity::Acknowledgment => "acknowledgment",
            Complexity::ErrorFallback => "error_fallback",
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentDecision {
    pub needs_retrieval: bool,
    /// Documents to fetch; `None` for conversational turns
    pub k: Option<usize>,
    pub complexity: Complexity,
}

impl IntentDecision {
    fn no_retrieval(complexity: Complexity) -> Self {
        Self {
            needs_retrieval: false,
            k: Some(0),
            complexity,
        }
    }

    /// k to use for retrieval, or zero
    pub fn k_or_zero(&self) -> usize {
        self.k.unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
struct Thresholds {
    simple_k: usize,
    moderate_k: usize,
    complex_k: usize,
    default_k: usize,
    greeting_max_chars: usize,
    ack_max_chars: usize,
}

/// Rule-based intent classifier
pub struct IntentClassifier {
    thresholds: Thresholds,
    extra_factual: Vec<Regex>,
    extraction_timeout: Duration,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self {
            thresholds: Thresholds {
                simple_k: defaults::SIMPLE_K,
                moderate_k: defaults::MODERATE_K,
                complex_k: defaults::COMPLEX_K,
                default_k: defaults::DEFAULT_K,
                greeting_max_chars: defaults::GREETING_MAX_CHARS,
                ack_max_chars: defaults::ACK_MAX_CHARS,
            },
            extra_factual: Vec::new(),
            extraction_timeout: Duration::from_millis(medirag_config::constants::timeouts::EXTRACTION_MS),
        }
    }
}

impl IntentClassifier {
    /// Build from settings; an invalid custom pattern is a configuration error
    pub fn new(config: &IntentConfig) -> Result<Self, AgentError> {
        let extra_factual = config
            .extra_factual_patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i){}", p))
                    .map_err(|e| AgentError::Config(format!("intent.extra_factual_patterns '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            thresholds: Thresholds {
                simple_k: config.simple_k,
                moderate_k: config.moderate_k,
                complex_k: config.complex_k,
                default_k: config.default_k,
                greeting_max_chars: config.greeting_max_chars,
                ack_max_chars: config.ack_max_chars,
            },
            extra_factual,
            extraction_timeout: Duration::from_millis(config.extraction_timeout_ms),
        })
    }

    /// Decision used when classification itself fails
    pub fn fallback(&self) -> IntentDecision {
        IntentDecision {
            needs_retrieval: true,
            k: Some(self.thresholds.default_k),
            complexity: Complexity::ErrorFallback,
        }
    }

    /// Classify with already-extracted slots
    pub fn classify(&self, query: &str, slots: &EntitySlots, history: &[Turn]) -> IntentDecision {
        let text = query.trim();
        let length = text.chars().count();
        let t = &self.thresholds;

        if length < t.greeting_max_chars && GREETING.is_match(text) {
            return IntentDecision::no_retrieval(Complexity::Greeting);
        }
        if length < t.ack_max_chars && ACKNOWLEDGMENT.is_match(text) {
            return IntentDecision::no_retrieval(Complexity::Acknowledgment);
        }

        if slots.has_entities() {
            return self.retrieve(self.complexity_for(slots.concept_count(), length));
        }

        if !history.is_empty() && FOLLOW_UP.is_match(text) {
            return self.retrieve(Complexity::Simple);
        }
        if self.is_factual(text) {
            return self.retrieve(self.complexity_for(0, length));
        }

        IntentDecision {
            needs_retrieval: false,
            k: None,
            complexity: Complexity::Conversational,
        }
    }

    /// Extract slots then classify
    ///
    /// Extraction failure or timeout yields the error fallback together with
    /// empty slots.
    pub async fn classify_query(
        &self,
        query: &str,
        extractor: &Arc<dyn EntityExtractor>,
        history: &[Turn],
    ) -> (IntentDecision, EntitySlots) {
        match tokio::time::timeout(self.extraction_timeout, extractor.extract(query)).await {
            Ok(Ok(slots)) => {
                let decision = self.classify(query, &slots, history);
                tracing::debug!(
                    complexity = %decision.complexity,
                    k = ?decision.k,
                    needs_retrieval = decision.needs_retrieval,
                    concepts = slots.concept_count(),
                    "Classified query"
                );
                (decision, slots)
            },
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Entity extraction failed, using fallback intent");
                (self.fallback(), EntitySlots::new())
            },
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.extraction_timeout.as_millis() as u64,
                    "Entity extraction timed out, using fallback intent"
                );
                (self.fallback(), EntitySlots::new())
            },
        }
    }

    fn complexity_for(&self, concepts: usize, length: usize) -> Complexity {
        if concepts <= defaults::SIMPLE_MAX_CONCEPTS && length <= defaults::SIMPLE_MAX_CHARS {
            Complexity::Simple
        } else if concepts <= defaults::MODERATE_MAX_CONCEPTS && length <= defaults::MODERATE_MAX_CHARS {
            Complexity::Moderate
        } else {
            Complexity::Complex
        }
    }

    fn retrieve(&self, complexity: Complexity) -> IntentDecision {
        let k = match complexity {
            Complexity::Simple => self.thresholds.simple_k,
            Complexity::Moderate => self.thresholds.moderate_k,
            Complexity::Complex => self.thresholds.complex_k,
            _ => self.thresholds.default_k,
        };
        IntentDecision {
            needs_retrieval: true,
            k: Some(k),
            complexity,
        }
    }

    fn is_factual(&self, text: &str) -> bool {
        FACTUAL.iter().chain(self.extra_factual.iter()).any(|p| p.is_match(text))
    }
}
