//! Quality feedback, compression stats and the refine audit trail

use serde::{Deserialize, Serialize};

/// Weight of grounding in the overall score
pub const GROUNDING_WEIGHT: f32 = 0.4;
/// Weight of completeness in the overall score
pub const COMPLETENESS_WEIGHT: f32 = 0.4;
/// Weight of accuracy in the overall score
pub const ACCURACY_WEIGHT: f32 = 0.2;

/// Clamp a score into [0, 1]; NaN becomes `fallback`
pub fn clamp_unit(value: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Evaluation of a generated answer
///
/// `overall_score` is always derived from the three component scores; build
/// instances through [`QualityFeedback::new`] or [`QualityFeedback::uniform`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityFeedback {
    pub grounding_score: f32,
    pub completeness_score: f32,
    pub accuracy_score: f32,
    pub overall_score: f32,
    #[serde(default)]
    pub missing_info: Vec<String>,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
    #[serde(default)]
    pub needs_retrieval: bool,
    #[serde(default)]
    pub reason: String,
}

impl QualityFeedback {
    /// Build from component scores (clamped) and derive the overall score
    pub fn new(grounding: f32, completeness: f32, accuracy: f32) -> Self {
        let grounding_score = clamp_unit(grounding, 0.5);
        let completeness_score = clamp_unit(completeness, 0.5);
        let accuracy_score = clamp_unit(accuracy, 0.5);
        Self {
            grounding_score,
            completeness_score,
            accuracy_score,
            overall_score: Self::weighted_overall(
                grounding_score,
                completeness_score,
                accuracy_score,
            ),
            missing_info: Vec::new(),
            improvement_suggestions: Vec::new(),
            needs_retrieval: false,
            reason: String::new(),
        }
    }

    /// All three components equal to `score`, so overall equals `score`
    pub fn uniform(score: f32) -> Self {
        Self::new(score, score, score)
    }

    /// `0.4·grounding + 0.4·completeness + 0.2·accuracy`, clamped
    pub fn weighted_overall(grounding: f32, completeness: f32, accuracy: f32) -> f32 {
        (GROUNDING_WEIGHT * grounding + COMPLETENESS_WEIGHT * completeness + ACCURACY_WEIGHT * accuracy)
            .clamp(0.0, 1.0)
    }

    pub fn with_missing_info(mut self, missing: Vec<String>) -> Self {
        self.missing_info = missing;
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.improvement_suggestions = suggestions;
        self
    }

    pub fn with_needs_retrieval(mut self, needs_retrieval: bool) -> Self {
        self.needs_retrieval = needs_retrieval;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Whether the evaluator asked for nothing specific
    pub fn has_actionable_feedback(&self) -> bool {
        !self.missing_info.is_empty() || !self.improvement_suggestions.is_empty()
    }
}

/// Compression strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStrategy {
    #[default]
    Extractive,
    Abstractive,
    Hybrid,
}

impl std::str::FromStr for CompressionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "extractive" => Ok(Self::Extractive),
            "abstractive" => Ok(Self::Abstractive),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown compression strategy '{}'", other)),
        }
    }
}

impl std::fmt::Display for CompressionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extractive => write!(f, "extractive"),
            Self::Abstractive => write!(f, "abstractive"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Why compression was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    EmptyInput,
    WithinBudget,
    Error,
}

/// Outcome of one compression pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompressionStats {
    /// Nothing was compressed; input returned unchanged
    Skipped { reason: SkipReason },
    Applied {
        strategy: CompressionStrategy,
        original_tokens: usize,
        compressed_tokens: usize,
        ratio: f32,
        tokens_saved: usize,
    },
}

impl CompressionStats {
    pub fn skipped(reason: SkipReason) -> Self {
        CompressionStats::Skipped { reason }
    }

    pub fn applied(
        strategy: CompressionStrategy,
        original_tokens: usize,
        compressed_tokens: usize,
    ) -> Self {
        let ratio = if original_tokens == 0 {
            1.0
        } else {
            compressed_tokens as f32 / original_tokens as f32
        };
        CompressionStats::Applied {
            strategy,
            original_tokens,
            compressed_tokens,
            ratio,
            tokens_saved: original_tokens.saturating_sub(compressed_tokens),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, CompressionStats::Applied { .. })
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            CompressionStats::Skipped { reason } => Some(*reason),
            CompressionStats::Applied { .. } => None,
        }
    }

    pub fn compressed_tokens(&self) -> Option<usize> {
        match self {
            CompressionStats::Applied {
                compressed_tokens, ..
            } => Some(*compressed_tokens),
            CompressionStats::Skipped { .. } => None,
        }
    }
}

/// Why the refine loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Score test did not ask for more retrieval
    QualityAccepted,
    /// Iteration cap reached
    IterationCap,
    /// Retrieved set repeated the previous iteration
    DuplicateResults,
    /// Quality score stopped improving
    Stagnation,
    /// Strategy never refines
    StrategyDisabled,
    /// Classifier decided no retrieval was needed
    NoRetrieval,
    /// Answer generation failed and the apology was returned
    GenerationFailed,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::QualityAccepted => "quality_accepted",
            Self::IterationCap => "iteration_cap",
            Self::DuplicateResults => "duplicate_results",
            Self::Stagnation => "stagnation",
            Self::StrategyDisabled => "strategy_disabled",
            Self::NoRetrieval => "no_retrieval",
            Self::GenerationFailed => "generation_failed",
        };
        f.write_str(s)
    }
}

/// Append-only audit entry for one refine iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub strategy_name: String,
    pub quality_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<QualityFeedback>,
    pub needs_retrieval: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewritten_query: Option<String>,
    pub num_docs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<TerminationReason>,
}
