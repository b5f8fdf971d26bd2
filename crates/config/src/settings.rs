//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{budget, compression, endpoints, intent, llm, rag, refine, timeouts};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Text generation backend
    #[serde(default)]
    pub llm: LlmSettings,

    /// Query/document embedding
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Token budget split
    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub compression: CompressionConfig,

    /// Intent classification and entity lexicon
    #[serde(default)]
    pub intent: IntentConfig,

    /// Refine loop
    #[serde(default)]
    pub refine: RefineConfig,

    /// Per-turn audit trail
    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Knowledge base file (YAML or JSON); empty disables loading
    #[serde(default = "default_knowledge_path")]
    pub knowledge_path: String,
}

fn default_knowledge_path() -> String {
    "knowledge/medical.yaml".to_string()
}

fn default_true() -> bool {
    true
}

fn check_unit(field: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be between 0.0 and 1.0, got {}", value),
        });
    }
    Ok(())
}

fn check_nonzero(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "Must be greater than zero".to_string(),
        });
    }
    Ok(())
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.validate_retrieval()?;
        self.validate_budget()?;
        self.validate_compression()?;
        self.validate_intent()?;
        self.validate_refine()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }
        check_nonzero("server.timeout_seconds", self.server.timeout_seconds)?;

        if self.environment.is_production() && self.server.cors_origins.iter().any(|o| o == "*") {
            return Err(ConfigError::InvalidValue {
                field: "server.cors_origins".to_string(),
                message: "Wildcard origin is not allowed in production".to_string(),
            });
        }
        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;
        if llm.model.trim().is_empty() {
            return Err(ConfigError::MissingField("llm.model".to_string()));
        }
        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", llm.temperature),
            });
        }
        check_nonzero("llm.timeout_ms", llm.timeout_ms)?;
        if llm.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.max_tokens".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }
        if llm.provider == LlmProvider::OpenAi && llm.api_key.is_none() && self.environment.is_strict() {
            return Err(ConfigError::MissingField("llm.api_key".to_string()));
        }
        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;
        if r.rrf_k.is_nan() || r.rrf_k <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.rrf_k".to_string(),
                message: format!("Must be positive, got {}", r.rrf_k),
            });
        }
        if r.avg_doc_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.avg_doc_tokens".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }
        check_nonzero("retrieval.keyword_timeout_ms", r.keyword_timeout_ms)?;
        check_nonzero("retrieval.vector_timeout_ms", r.vector_timeout_ms)?;
        check_nonzero("embedding.timeout_ms", self.embedding.timeout_ms)?;
        if self.embedding.enabled && self.embedding.dimension == 0 {
            return Err(ConfigError::InvalidValue {
                field: "embedding.dimension".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    fn validate_budget(&self) -> Result<(), ConfigError> {
        let b = &self.budget;
        if b.max_total == 0 {
            return Err(ConfigError::InvalidValue {
                field: "budget.max_total".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }
        check_unit("budget.query_ratio", b.query_ratio)?;
        check_unit("budget.profile_ratio", b.profile_ratio)?;
        check_unit("budget.recent_ratio", b.recent_ratio)?;
        check_unit("budget.longterm_ratio", b.longterm_ratio)?;
        let sum = b.query_ratio + b.profile_ratio + b.recent_ratio + b.longterm_ratio;
        if sum > 1.0 + f32::EPSILON {
            return Err(ConfigError::InvalidValue {
                field: "budget".to_string(),
                message: format!("Ratios must sum to at most 1.0, got {}", sum),
            });
        }
        Ok(())
    }

    fn validate_compression(&self) -> Result<(), ConfigError> {
        let c = &self.compression;
        check_unit("compression.keyword_weight", c.keyword_weight)?;
        check_unit("compression.entity_weight", c.entity_weight)?;
        check_unit("compression.position_weight", c.position_weight)?;
        check_unit("compression.entropy_weight", c.entropy_weight)?;
        if c.hybrid_extractive_ratio.is_nan()
            || c.hybrid_extractive_ratio <= 0.0
            || c.hybrid_extractive_ratio > 1.0
        {
            return Err(ConfigError::InvalidValue {
                field: "compression.hybrid_extractive_ratio".to_string(),
                message: format!("Must be in (0.0, 1.0], got {}", c.hybrid_extractive_ratio),
            });
        }
        if c.strategy.parse::<StrategyName>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "compression.strategy".to_string(),
                message: format!("Unknown strategy '{}'", c.strategy),
            });
        }
        check_nonzero("compression.abstractive_timeout_ms", c.abstractive_timeout_ms)
    }

    fn validate_intent(&self) -> Result<(), ConfigError> {
        let i = &self.intent;
        if i.simple_k == 0 || i.moderate_k == 0 || i.complex_k == 0 || i.default_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "intent".to_string(),
                message: "Document counts must be greater than zero".to_string(),
            });
        }
        check_nonzero("intent.extraction_timeout_ms", i.extraction_timeout_ms)
    }

    fn validate_refine(&self) -> Result<(), ConfigError> {
        let r = &self.refine;
        check_unit("refine.quality_threshold", r.quality_threshold)?;
        check_unit("refine.duplicate_jaccard_threshold", r.duplicate_jaccard_threshold)?;
        check_unit("refine.stagnation_delta", r.stagnation_delta)?;
        check_nonzero("refine.evaluation_timeout_ms", r.evaluation_timeout_ms)?;
        check_nonzero("refine.rewrite_timeout_ms", r.rewrite_timeout_ms)
    }
}

/// Compression strategy names accepted in configuration
enum StrategyName {
    Extractive,
    Abstractive,
    Hybrid,
}

impl std::str::FromStr for StrategyName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "extractive" => Ok(Self::Extractive),
            "abstractive" => Ok(Self::Abstractive),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(()),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins; empty allows localhost only
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout() -> u64 {
    timeouts::HTTP_REQUEST_SECS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Text generation provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    /// Any OpenAI-compatible chat completions API (vLLM, OpenAI, ...)
    #[serde(alias = "openai_compatible", alias = "vllm")]
    OpenAi,
}

/// Text generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub provider: LlmProvider,

    /// Base URL; empty picks the provider default
    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries for network errors and 5xx responses
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Keep the model loaded between requests (Ollama)
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,

    /// Cache identical requests
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Maximum cached responses; 0 means unbounded
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Returned to the user when answer generation fails
    #[serde(default = "default_apology_message")]
    pub apology_message: String,

    /// System prompt for answer generation
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_llm_model() -> String {
    llm::MODEL.to_string()
}
fn default_max_tokens() -> usize {
    llm::MAX_TOKENS
}
fn default_temperature() -> f32 {
    llm::TEMPERATURE
}
fn default_llm_timeout_ms() -> u64 {
    timeouts::LLM_REQUEST_MS
}
fn default_max_retries() -> u32 {
    llm::MAX_RETRIES
}
fn default_initial_backoff_ms() -> u64 {
    llm::INITIAL_BACKOFF_MS
}
fn default_keep_alive() -> String {
    "5m".to_string()
}
fn default_cache_capacity() -> usize {
    llm::CACHE_CAPACITY
}
fn default_apology_message() -> String {
    llm::APOLOGY_MESSAGE.to_string()
}
fn default_system_prompt() -> String {
    "당신은 신뢰할 수 있는 의료 정보 도우미입니다. 제공된 근거 문서에 기반해서만 답하고, \
     근거가 부족하면 그렇다고 말하세요. 진단이나 처방을 대신하지 말고 필요하면 전문의 상담을 권하세요."
        .to_string()
}

impl LlmSettings {
    /// Endpoint with the provider default applied
    pub fn resolved_endpoint(&self) -> &str {
        if !self.endpoint.trim().is_empty() {
            return self.endpoint.as_str();
        }
        match self.provider {
            LlmProvider::Ollama => endpoints::OLLAMA_DEFAULT,
            LlmProvider::OpenAi => endpoints::OPENAI_DEFAULT,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            endpoint: String::new(),
            model: default_llm_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_ms: default_llm_timeout_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            keep_alive: default_keep_alive(),
            cache_enabled: true,
            cache_capacity: default_cache_capacity(),
            apology_message: default_apology_message(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Embedding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Vector branch is skipped entirely when disabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dim")]
    pub dimension: usize,

    #[serde(default = "default_embed_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_embedding_endpoint() -> String {
    endpoints::OLLAMA_DEFAULT.to_string()
}
fn default_embedding_model() -> String {
    llm::EMBEDDING_MODEL.to_string()
}
fn default_embedding_dim() -> usize {
    rag::EMBEDDING_DIM
}
fn default_embed_timeout_ms() -> u64 {
    timeouts::EMBED_MS
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            dimension: default_embedding_dim(),
            timeout_ms: default_embed_timeout_ms(),
        }
    }
}

/// Vector index backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Brute-force cosine in process memory
    #[default]
    Memory,
    Qdrant,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    /// Expected tokens per document, caps k by the docs budget
    #[serde(default = "default_avg_doc_tokens")]
    pub avg_doc_tokens: usize,

    #[serde(default = "default_search_timeout_ms")]
    pub keyword_timeout_ms: u64,

    #[serde(default = "default_search_timeout_ms")]
    pub vector_timeout_ms: u64,

    #[serde(default)]
    pub vector_backend: VectorBackend,

    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,

    #[serde(default = "default_qdrant_collection")]
    pub qdrant_collection: String,

    #[serde(default)]
    pub qdrant_api_key: Option<String>,

    /// Directory for the keyword index; unset keeps it in RAM
    #[serde(default)]
    pub index_path: Option<String>,

    /// Routing label used when a request names none or an unknown one
    #[serde(default = "default_route")]
    pub default_route: String,
}

fn default_rrf_k() -> f32 {
    rag::RRF_K
}
fn default_avg_doc_tokens() -> usize {
    rag::AVG_DOC_TOKENS
}
fn default_search_timeout_ms() -> u64 {
    timeouts::SEARCH_MS
}
fn default_qdrant_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.to_string()
}
fn default_qdrant_collection() -> String {
    rag::QDRANT_COLLECTION.to_string()
}
fn default_route() -> String {
    rag::DEFAULT_ROUTE.to_string()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            avg_doc_tokens: default_avg_doc_tokens(),
            keyword_timeout_ms: default_search_timeout_ms(),
            vector_timeout_ms: default_search_timeout_ms(),
            vector_backend: VectorBackend::default(),
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_collection: default_qdrant_collection(),
            qdrant_api_key: None,
            index_path: None,
            default_route: default_route(),
        }
    }
}

/// Token budget split; documents receive the remainder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_max_total")]
    pub max_total: usize,

    #[serde(default = "default_query_ratio")]
    pub query_ratio: f32,

    #[serde(default = "default_profile_ratio")]
    pub profile_ratio: f32,

    #[serde(default = "default_recent_ratio")]
    pub recent_ratio: f32,

    #[serde(default = "default_longterm_ratio")]
    pub longterm_ratio: f32,
}

fn default_max_total() -> usize {
    budget::MAX_TOTAL_TOKENS
}
fn default_query_ratio() -> f32 {
    budget::QUERY_RATIO
}
fn default_profile_ratio() -> f32 {
    budget::PROFILE_RATIO
}
fn default_recent_ratio() -> f32 {
    budget::RECENT_RATIO
}
fn default_longterm_ratio() -> f32 {
    budget::LONGTERM_RATIO
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_total: default_max_total(),
            query_ratio: default_query_ratio(),
            profile_ratio: default_profile_ratio(),
            recent_ratio: default_recent_ratio(),
            longterm_ratio: default_longterm_ratio(),
        }
    }
}

/// Context compression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// extractive | abstractive | hybrid
    #[serde(default = "default_compression_strategy")]
    pub strategy: String,

    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,

    #[serde(default = "default_entity_weight")]
    pub entity_weight: f32,

    #[serde(default = "default_position_weight")]
    pub position_weight: f32,

    #[serde(default = "default_entropy_weight")]
    pub entropy_weight: f32,

    #[serde(default = "default_min_sentence_chars")]
    pub min_sentence_chars: usize,

    #[serde(default = "default_hybrid_ratio")]
    pub hybrid_extractive_ratio: f32,

    #[serde(default = "default_llm_timeout_ms")]
    pub abstractive_timeout_ms: u64,
}

fn default_compression_strategy() -> String {
    "extractive".to_string()
}
fn default_keyword_weight() -> f32 {
    compression::KEYWORD_WEIGHT
}
fn default_entity_weight() -> f32 {
    compression::ENTITY_WEIGHT
}
fn default_position_weight() -> f32 {
    compression::POSITION_WEIGHT
}
fn default_entropy_weight() -> f32 {
    compression::ENTROPY_WEIGHT
}
fn default_min_sentence_chars() -> usize {
    compression::MIN_SENTENCE_CHARS
}
fn default_hybrid_ratio() -> f32 {
    compression::HYBRID_EXTRACTIVE_RATIO
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: default_compression_strategy(),
            keyword_weight: default_keyword_weight(),
            entity_weight: default_entity_weight(),
            position_weight: default_position_weight(),
            entropy_weight: default_entropy_weight(),
            min_sentence_chars: default_min_sentence_chars(),
            hybrid_extractive_ratio: default_hybrid_ratio(),
            abstractive_timeout_ms: default_llm_timeout_ms(),
        }
    }
}

/// Intent classification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    #[serde(default = "default_simple_k")]
    pub simple_k: usize,

    #[serde(default = "default_moderate_k")]
    pub moderate_k: usize,

    #[serde(default = "default_complex_k")]
    pub complex_k: usize,

    /// k when classification itself fails
    #[serde(default = "default_default_k")]
    pub default_k: usize,

    #[serde(default = "default_greeting_max_chars")]
    pub greeting_max_chars: usize,

    #[serde(default = "default_ack_max_chars")]
    pub ack_max_chars: usize,

    /// Additional factual-question regexes, matched case-insensitively
    #[serde(default)]
    pub extra_factual_patterns: Vec<String>,

    #[serde(default = "default_extraction_timeout_ms")]
    pub extraction_timeout_ms: u64,

    /// Terms the lexicon entity extractor recognizes
    #[serde(default)]
    pub lexicon: LexiconConfig,
}

fn default_simple_k() -> usize {
    intent::SIMPLE_K
}
fn default_moderate_k() -> usize {
    intent::MODERATE_K
}
fn default_complex_k() -> usize {
    intent::COMPLEX_K
}
fn default_default_k() -> usize {
    intent::DEFAULT_K
}
fn default_greeting_max_chars() -> usize {
    intent::GREETING_MAX_CHARS
}
fn default_ack_max_chars() -> usize {
    intent::ACK_MAX_CHARS
}
fn default_extraction_timeout_ms() -> u64 {
    timeouts::EXTRACTION_MS
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            simple_k: default_simple_k(),
            moderate_k: default_moderate_k(),
            complex_k: default_complex_k(),
            default_k: default_default_k(),
            greeting_max_chars: default_greeting_max_chars(),
            ack_max_chars: default_ack_max_chars(),
            extra_factual_patterns: Vec::new(),
            extraction_timeout_ms: default_extraction_timeout_ms(),
            lexicon: LexiconConfig::default(),
        }
    }
}

/// Medical term lists per entity category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexiconConfig {
    #[serde(default = "default_conditions")]
    pub conditions: Vec<String>,

    #[serde(default = "default_symptoms")]
    pub symptoms: Vec<String>,

    #[serde(default = "default_medications")]
    pub medications: Vec<String>,
}

fn owned(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_string()).collect()
}

fn default_conditions() -> Vec<String> {
    owned(&[
        "고혈압", "당뇨", "당뇨병", "고지혈증", "천식", "폐렴", "감기", "독감", "위염", "빈혈",
        "관절염", "우울증", "갑상선", "hypertension", "diabetes", "asthma", "pneumonia",
        "influenza", "anemia", "arthritis", "depression", "hyperlipidemia",
    ])
}

fn default_symptoms() -> Vec<String> {
    owned(&[
        "두통", "발열", "열", "기침", "복통", "어지러움", "메스꺼움", "구토", "설사", "피로",
        "가슴 통증", "호흡곤란", "headache", "fever", "cough", "nausea", "dizziness",
        "fatigue", "chest pain", "vomiting",
    ])
}

fn default_medications() -> Vec<String> {
    owned(&[
        "아스피린", "타이레놀", "아세트아미노펜", "이부프로펜", "메트포르민", "인슐린",
        "항생제", "스타틴", "aspirin", "tylenol", "acetaminophen", "ibuprofen", "metformin",
        "insulin", "antibiotic", "statin",
    ])
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            conditions: default_conditions(),
            symptoms: default_symptoms(),
            medications: default_medications(),
        }
    }
}

/// Refine loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineConfig {
    /// basic | corrective; unknown names fall back to corrective
    #[serde(default = "default_refine_strategy")]
    pub strategy: String,

    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,

    /// 0 disables re-retrieval
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_duplicate_jaccard")]
    pub duplicate_jaccard_threshold: f32,

    #[serde(default = "default_stagnation_delta")]
    pub stagnation_delta: f32,

    #[serde(default = "default_evaluation_timeout_ms")]
    pub evaluation_timeout_ms: u64,

    #[serde(default = "default_llm_timeout_ms")]
    pub rewrite_timeout_ms: u64,

    #[serde(default = "default_answer_preview_chars")]
    pub answer_preview_chars: usize,

    #[serde(default = "default_evidence_preview_chars")]
    pub evidence_preview_chars: usize,
}

fn default_refine_strategy() -> String {
    refine::STRATEGY.to_string()
}
fn default_quality_threshold() -> f32 {
    refine::QUALITY_THRESHOLD
}
fn default_max_iterations() -> usize {
    refine::MAX_ITERATIONS
}
fn default_duplicate_jaccard() -> f32 {
    refine::DUPLICATE_JACCARD
}
fn default_stagnation_delta() -> f32 {
    refine::STAGNATION_DELTA
}
fn default_evaluation_timeout_ms() -> u64 {
    timeouts::EVALUATION_MS
}
fn default_answer_preview_chars() -> usize {
    refine::ANSWER_PREVIEW_CHARS
}
fn default_evidence_preview_chars() -> usize {
    refine::EVIDENCE_PREVIEW_CHARS
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            strategy: default_refine_strategy(),
            quality_threshold: default_quality_threshold(),
            max_iterations: default_max_iterations(),
            duplicate_jaccard_threshold: default_duplicate_jaccard(),
            stagnation_delta: default_stagnation_delta(),
            evaluation_timeout_ms: default_evaluation_timeout_ms(),
            rewrite_timeout_ms: default_llm_timeout_ms(),
            answer_preview_chars: default_answer_preview_chars(),
            evidence_preview_chars: default_evidence_preview_chars(),
        }
    }
}

/// Per-turn audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,

    /// JSON-lines file the records are appended to
    #[serde(default = "default_audit_path")]
    pub path: String,
}

fn default_audit_path() -> String {
    "logs/turns.jsonl".to_string()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_audit_path(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (MEDIRAG__SECTION__FIELD)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
/// 4. Built-in defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from("config", env)
}

/// Same as [`load_settings`] with an explicit config directory
pub fn load_settings_from(dir: &str, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name(&format!("{}/default", dir)).required(false));

    if let Some(env_name) = env {
        builder = builder
            .add_source(File::with_name(&format!("{}/{}", dir, env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("MEDIRAG")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(
        environment = ?settings.environment,
        strategy = %settings.refine.strategy,
        max_iterations = settings.refine.max_iterations,
        "Settings loaded"
    );

    Ok(settings)
}
