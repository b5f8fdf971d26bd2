//! Centralized constants
//!
//! Single source of truth for default values used across the workspace.
//! Settings defaults and component `Default` impls read from here so a value
//! is never duplicated between crates.

/// Service endpoints
pub mod endpoints {
    /// Default Ollama endpoint (generation and embeddings)
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// Default Qdrant endpoint
    pub const QDRANT_DEFAULT: &str = "http://127.0.0.1:6334";

    /// Default OpenAI-compatible endpoint
    pub const OPENAI_DEFAULT: &str = "https://api.openai.com/v1";
}

/// Timeouts for external calls
pub mod timeouts {
    /// Answer generation / rewrite / summarization
    pub const LLM_REQUEST_MS: u64 = 30_000;

    /// Each retrieval branch (keyword or vector)
    pub const SEARCH_MS: u64 = 3_000;

    /// Query embedding
    pub const EMBED_MS: u64 = 5_000;

    /// Answer quality evaluation
    pub const EVALUATION_MS: u64 = 15_000;

    /// Entity extraction during classification
    pub const EXTRACTION_MS: u64 = 5_000;

    /// HTTP request handling
    pub const HTTP_REQUEST_SECS: u64 = 120;
}

/// Retrieval and fusion
pub mod rag {
    /// Reciprocal rank fusion constant
    pub const RRF_K: f32 = 60.0;

    /// Expected size of one retrieved document, used to cap k by budget
    pub const AVG_DOC_TOKENS: usize = 150;

    /// Default routing label of the retriever registry
    pub const DEFAULT_ROUTE: &str = "default";

    /// Default embedding dimension (nomic-embed-text)
    pub const EMBEDDING_DIM: usize = 768;

    /// Default Qdrant collection
    pub const QDRANT_COLLECTION: &str = "medical_knowledge";
}

/// Token budget split
pub mod budget {
    /// Total context budget per turn
    pub const MAX_TOTAL_TOKENS: usize = 4096;

    pub const QUERY_RATIO: f32 = 0.10;
    pub const PROFILE_RATIO: f32 = 0.10;
    pub const RECENT_RATIO: f32 = 0.20;
    pub const LONGTERM_RATIO: f32 = 0.10;
}

/// Intent classification
pub mod intent {
    /// Documents for a simple question
    pub const SIMPLE_K: usize = 3;
    /// Documents for a moderate question
    pub const MODERATE_K: usize = 8;
    /// Documents for a complex question
    pub const COMPLEX_K: usize = 15;
    /// Documents when classification itself failed
    pub const DEFAULT_K: usize = 8;

    /// Longest query still treated as a greeting
    pub const GREETING_MAX_CHARS: usize = 30;
    /// Longest query still treated as an acknowledgment
    pub const ACK_MAX_CHARS: usize = 20;

    pub const SIMPLE_MAX_CONCEPTS: usize = 1;
    pub const SIMPLE_MAX_CHARS: usize = 20;
    pub const MODERATE_MAX_CONCEPTS: usize = 3;
    pub const MODERATE_MAX_CHARS: usize = 50;
}

/// Refine loop
pub mod refine {
    pub const STRATEGY: &str = "corrective";
    pub const QUALITY_THRESHOLD: f32 = 0.5;
    pub const MAX_ITERATIONS: usize = 2;
    pub const DUPLICATE_JACCARD: f32 = 0.8;
    pub const STAGNATION_DELTA: f32 = 0.05;

    /// Characters of the answer shown to the evaluator
    pub const ANSWER_PREVIEW_CHARS: usize = 1500;
    /// Characters of evidence shown to the evaluator
    pub const EVIDENCE_PREVIEW_CHARS: usize = 3000;
}

/// Context compression
pub mod compression {
    pub const KEYWORD_WEIGHT: f32 = 0.4;
    pub const ENTITY_WEIGHT: f32 = 0.3;
    pub const POSITION_WEIGHT: f32 = 0.2;
    pub const ENTROPY_WEIGHT: f32 = 0.1;

    /// Sentences shorter than this (in characters) are dropped
    pub const MIN_SENTENCE_CHARS: usize = 6;

    /// Share of the budget the extractive stage of hybrid targets
    pub const HYBRID_EXTRACTIVE_RATIO: f32 = 0.6;
}

/// LLM defaults
pub mod llm {
    pub const MODEL: &str = "qwen2.5:7b";
    pub const EMBEDDING_MODEL: &str = "nomic-embed-text";
    pub const MAX_TOKENS: usize = 1024;
    pub const TEMPERATURE: f32 = 0.3;
    pub const MAX_RETRIES: u32 = 2;
    pub const INITIAL_BACKOFF_MS: u64 = 200;
    pub const CACHE_CAPACITY: usize = 1024;

    /// Returned when answer generation fails outright
    pub const APOLOGY_MESSAGE: &str =
        "죄송합니다. 지금은 답변을 생성할 수 없습니다. 잠시 후 다시 시도해 주세요.";
}
