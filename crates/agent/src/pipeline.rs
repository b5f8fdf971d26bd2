//! Per-turn pipeline
//!
//! classify -> plan -> retrieve -> compress -> generate -> refine, looping
//! back to retrieval with the rewritten query while the refine controller
//! says CONTINUE. Turns that need no retrieval are answered directly.
//!
//! [`TurnProcessor::process`] never fails: every component degrades to its
//! fallback, and a failed generation yields the apology message (or the
//! previous iteration's answer when there is one).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use medirag_config::{LlmSettings, Settings};
use medirag_core::{
    CompressionStats, Document, EntityExtractor, EntitySlots, IterationRecord, TerminationReason,
    TokenCounter, TokenPlan, Turn,
};
use medirag_llm::{LlmBackend, PromptBuilder};
use medirag_rag::{
    CompressorConfig, ContextCompressor, DomainTerms, HybridRetriever, LlmSummarizer,
    select_within_budget, RetrievalResult, RetrieverRegistry, SectionDemand, TokenBudgetAllocator,
};

use crate::audit::{sink_from_settings, AuditSink, TurnAuditRecord};
use crate::entities::LexiconEntityExtractor;
use crate::evaluator::QualityEvaluator;
use crate::intent::{IntentClassifier, IntentDecision};
use crate::refine::{
    RefineController, RefineDecision, RefineInput, RefineState, Safeguards, StrategyDeps,
    StrategyRegistry,
};
use crate::rewriter::QueryRewriter;
use crate::AgentError;

/// Answer generation settings
#[derive(Debug, Clone)]
pub struct TurnProcessorConfig {
    pub system_prompt: String,
    /// Returned when generation fails and no earlier answer exists
    pub apology_message: String,
    pub generation_timeout: Duration,
}

impl Default for TurnProcessorConfig {
    fn default() -> Self {
        Self::from_settings(&LlmSettings::default())
    }
}

impl TurnProcessorConfig {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            system_prompt: settings.system_prompt.clone(),
            apology_message: settings.apology_message.clone(),
            generation_timeout: Duration::from_millis(settings.timeout_ms),
        }
    }
}

/// One user turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub query: String,
    /// Prior turns, oldest first
    #[serde(default)]
    pub history: Vec<Turn>,
    /// Profile / demographic text
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub longterm_summary: Option<String>,
    /// Retriever routing label; the registry default when absent
    #[serde(default)]
    pub route: Option<String>,
}

impl TurnRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    fn profile_text(&self) -> Option<&str> {
        non_blank(self.profile.as_deref())
    }

    fn longterm_text(&self) -> Option<&str> {
        non_blank(self.longterm_summary.as_deref())
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

/// Answer plus the trail of how it was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub answer: String,
    pub intent: IntentDecision,
    pub iterations: Vec<IterationRecord>,
    /// Query used for the last retrieval
    pub final_query: String,
    /// Stats of the last compression pass; absent when nothing was retrieved
    pub compression: Option<CompressionStats>,
    pub termination: TerminationReason,
    pub documents_used: usize,
}

/// Process-scoped collaborators of the pipeline
pub struct TurnComponents {
    pub classifier: IntentClassifier,
    pub extractor: Arc<dyn EntityExtractor>,
    pub allocator: TokenBudgetAllocator,
    pub retrievers: Arc<RetrieverRegistry>,
    pub compressor: Arc<ContextCompressor>,
    pub controller: RefineController,
    pub llm: Arc<dyn LlmBackend>,
    pub counter: Arc<dyn TokenCounter>,
    pub audit: Arc<dyn AuditSink>,
}

/// How a turn ended
struct LoopOutcome {
    answer: String,
    termination: TerminationReason,
    final_query: String,
    compression: Option<CompressionStats>,
    iterations: Vec<IterationRecord>,
    documents_used: usize,
}

/// Full per-turn pipeline
pub struct TurnProcessor {
    config: TurnProcessorConfig,
    components: TurnComponents,
}

impl TurnProcessor {
    pub fn new(config: TurnProcessorConfig, components: TurnComponents) -> Self {
        Self { config, components }
    }

    /// Wire every component from settings
    ///
    /// Configuration errors (bad budget ratios, unknown compression strategy,
    /// invalid custom patterns, unwritable audit path) surface here.
    pub fn from_settings(
        settings: &Settings,
        llm: Arc<dyn LlmBackend>,
        retrievers: Arc<RetrieverRegistry>,
        counter: Arc<dyn TokenCounter>,
    ) -> Result<Self, AgentError> {
        let classifier = IntentClassifier::new(&settings.intent)?;
        let extractor: Arc<dyn EntityExtractor> =
            Arc::new(LexiconEntityExtractor::new(&settings.intent.lexicon)?);
        let allocator = TokenBudgetAllocator::new(&settings.budget)?;

        let compressor = ContextCompressor::new(
            CompressorConfig::from_settings(&settings.compression)?,
            DomainTerms::from_lexicon(&settings.intent.lexicon)?,
            counter.clone(),
        )
        .with_summarizer(Arc::new(LlmSummarizer::new(llm.clone())));

        let deps = StrategyDeps {
            evaluator: Arc::new(QualityEvaluator::new(llm.clone(), &settings.refine)),
            rewriter: Arc::new(QueryRewriter::new(llm.clone(), &settings.refine)),
            config: settings.refine.clone(),
        };
        let strategy = StrategyRegistry::with_defaults().create(&settings.refine.strategy, &deps);
        let controller = RefineController::new(strategy, Safeguards::from_settings(&settings.refine));

        tracing::info!(
            strategy = controller.strategy_name(),
            compression = %settings.compression.strategy,
            max_iterations = settings.refine.max_iterations,
            "Turn processor ready"
        );

        Ok(Self::new(
            TurnProcessorConfig::from_settings(&settings.llm),
            TurnComponents {
                classifier,
                extractor,
                allocator,
                retrievers,
                compressor: Arc::new(compressor),
                controller,
                llm,
                counter,
                audit: sink_from_settings(&settings.audit)?,
            },
        ))
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.components.classifier
    }

    pub fn extractor(&self) -> &Arc<dyn EntityExtractor> {
        &self.components.extractor
    }

    /// Answer one turn
    pub async fn process(&self, request: &TurnRequest) -> TurnResponse {
        let c = &self.components;
        let query = request.query.trim();

        let (intent, slots) = c.classifier.classify_query(query, &c.extractor, &request.history).await;
        let retriever = c.retrievers.get(request.route.as_deref());
        let route = match request.route.as_deref() {
            Some(label) if c.retrievers.contains(label) => label.to_string(),
            _ => c.retrievers.default_label().to_string(),
        };

        let plan = c.allocator.allocate(self.demand(request));
        let mut audit = TurnAuditRecord::new(query, route, intent.clone());
        audit.plan = Some(plan);

        let outcome = if intent.needs_retrieval && intent.k_or_zero() > 0 {
            self.refine_loop(request, &intent, &slots, plan, retriever.as_deref())
                .await
        } else {
            self.answer_directly(request, plan).await
        };

        audit.compression = outcome.compression.clone();
        audit.iterations = outcome.iterations.clone();
        audit.termination = outcome.termination;
        audit.final_query = outcome.final_query.clone();
        audit.answer_chars = outcome.answer.chars().count();

        tracing::info!(
            turn_id = %audit.turn_id,
            complexity = %intent.complexity,
            k = ?intent.k,
            iterations = outcome.iterations.len(),
            documents = outcome.documents_used,
            termination = %outcome.termination,
            "Turn complete"
        );

        // sinks write to disk synchronously
        let sink = Arc::clone(&c.audit);
        let written = tokio::task::spawn_blocking(move || sink.record(&audit))
            .await
            .map_err(|e| AgentError::Audit(format!("audit task failed: {}", e)))
            .and_then(|result| result);
        if let Err(e) = written {
            tracing::warn!(error = %e, "Failed to write audit record");
        }

        TurnResponse {
            answer: outcome.answer,
            intent,
            iterations: outcome.iterations,
            final_query: outcome.final_query,
            compression: outcome.compression,
            termination: outcome.termination,
            documents_used: outcome.documents_used,
        }
    }

    fn demand(&self, request: &TurnRequest) -> SectionDemand {
        let counter = self.components.counter.as_ref();
        let recent = request
            .history
            .iter()
            .map(Turn::render)
            .collect::<Vec<_>>()
            .join("\n");
        SectionDemand {
            query: counter.count_tokens(request.query.trim()),
            profile: request.profile_text().map_or(0, |p| counter.count_tokens(p)),
            recent: counter.count_tokens(&recent),
            longterm: request.longterm_text().map_or(0, |l| counter.count_tokens(l)),
        }
    }

    /// No retrieval: one generation without an evidence section
    async fn answer_directly(&self, request: &TurnRequest, plan: TokenPlan) -> LoopOutcome {
        let (answer, termination) = match self.generate(request, plan, None).await {
            Ok(answer) => (answer, TerminationReason::NoRetrieval),
            Err(e) => {
                tracing::warn!(error = %e, "Generation failed");
                (self.config.apology_message.clone(), TerminationReason::GenerationFailed)
            },
        };
        LoopOutcome {
            answer,
            termination,
            final_query: request.query.trim().to_string(),
            compression: None,
            iterations: Vec::new(),
            documents_used: 0,
        }
    }

    /// Retrieve, compress, generate and refine until the controller stops
    async fn refine_loop(
        &self,
        request: &TurnRequest,
        intent: &IntentDecision,
        slots: &EntitySlots,
        plan: TokenPlan,
        retriever: Option<&HybridRetriever>,
    ) -> LoopOutcome {
        let c = &self.components;
        let query = request.query.trim();
        let k = intent.k_or_zero();

        // with compression on, retrieval fills a wider pool and the compressor fits it to for_docs
        let pool_budget = if c.compressor.config().enabled {
            plan.max_total()
        } else {
            plan.for_docs()
        };

        let mut state = RefineState::new();
        let mut current_query = query.to_string();
        let mut previous_answer: Option<String> = None;

        loop {
            let retrieval = match retriever {
                Some(retriever) => {
                    retriever
                        .search_candidates(&current_query, None, k, &plan, pool_budget)
                        .await
                },
                None => {
                    tracing::warn!("No retriever registered, answering without evidence");
                    RetrievalResult::default()
                },
            };

            let compressed = c
                .compressor
                .compress(&retrieval.documents, &current_query, plan.for_docs())
                .await;
            let documents = if compressed.stats.is_applied() {
                compressed.documents
            } else {
                // skipped or failed: the pool may still exceed the evidence budget
                select_within_budget(compressed.documents, plan.for_docs(), c.counter.as_ref()).0
            };
            let compression = Some(compressed.stats);

            let answer = match self.generate(request, plan, Some(&documents)).await {
                Ok(answer) => answer,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        iteration = state.iteration_count,
                        "Generation failed"
                    );
                    let answer = previous_answer
                        .take()
                        .unwrap_or_else(|| self.config.apology_message.clone());
                    return LoopOutcome {
                        answer,
                        termination: TerminationReason::GenerationFailed,
                        final_query: current_query,
                        compression,
                        iterations: state.iteration_records,
                        documents_used: documents.len(),
                    };
                },
            };

            let input = RefineInput::new(query, &answer, &documents)
                .with_retrieved(&retrieval.documents)
                .with_profile(request.profile_text())
                .with_slots(Some(slots));

            match c.controller.step(&mut state, &input).await {
                RefineDecision::Continue { query: next } => {
                    tracing::debug!(iteration = state.iteration_count, query = %next, "Retrying retrieval");
                    current_query = next;
                    previous_answer = Some(answer);
                },
                RefineDecision::Terminate { reason } => {
                    return LoopOutcome {
                        answer,
                        termination: reason,
                        final_query: current_query,
                        compression,
                        iterations: state.iteration_records,
                        documents_used: documents.len(),
                    };
                },
            }
        }
    }

    /// Generate an answer; `documents: None` omits the evidence section
    async fn generate(
        &self,
        request: &TurnRequest,
        plan: TokenPlan,
        documents: Option<&[Document]>,
    ) -> Result<String, AgentError> {
        let c = &self.components;
        let mut builder = PromptBuilder::new(c.counter.clone(), plan)
            .system_prompt(self.config.system_prompt.clone())
            .with_history(&request.history)
            .question(&request.query);
        if let Some(profile) = request.profile_text() {
            builder = builder.with_profile(profile);
        }
        if let Some(summary) = request.longterm_text() {
            builder = builder.with_longterm(summary);
        }
        builder = match documents {
            Some(documents) => builder.with_documents(documents),
            None => builder.without_evidence(),
        };

        let timeout = self.config.generation_timeout;
        let result = tokio::time::timeout(timeout, c.llm.generate(&builder.build()))
            .await
            .map_err(|_| AgentError::Timeout(timeout.as_millis() as u64))??;
        Ok(result.text.trim().to_string())
    }
}
