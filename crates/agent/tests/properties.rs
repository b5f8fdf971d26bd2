//! Invariants checked over generated inputs

mod support;

use medirag_agent::{EvaluationRequest, QualityEvaluator, TurnRequest};
use medirag_config::{RefineConfig, Settings};
use medirag_core::{Document, DocumentSource, SkipReason, TokenCounter, TokenPlan};
use medirag_rag::{
    select_within_budget, CompressorConfig, ContextCompressor, DomainTerms, RankFuser,
};

use support::{counter, registry, verdict, CallKind, KeywordCorpus, ScriptedLlm};

/// Small deterministic generator so failures reproduce
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }

    fn unit(&mut self) -> f32 {
        self.below(1001) as f32 / 1000.0
    }
}

const PASSAGES: &[&str] = &[
    "고혈압은 수축기 혈압 140 mmHg 이상을 말합니다.",
    "당뇨 환자는 당화혈색소 7% 미만을 목표로 합니다.",
    "메트포르민은 식사와 함께 복용합니다.",
    "암로디핀은 발목 부종을 일으킬 수 있습니다.",
    "규칙적인 유산소 운동은 혈압을 낮춥니다.",
    "저염식은 하루 나트륨 2000mg 이하를 권장합니다.",
    "스타틴은 LDL 콜레스테롤을 낮춥니다.",
    "금연은 심혈관 질환 위험을 줄입니다.",
];

fn ranked_list(rng: &mut Lcg, source: DocumentSource) -> Vec<Document> {
    let len = rng.below(PASSAGES.len() as u64 + 1) as usize;
    let mut picked: Vec<usize> = Vec::new();
    while picked.len() < len {
        let i = rng.below(PASSAGES.len() as u64) as usize;
        if !picked.contains(&i) {
            picked.push(i);
        }
    }
    picked
        .into_iter()
        .enumerate()
        .map(|(rank, i)| Document::new(format!("p{}", i), PASSAGES[i], 1.0, rank + 1, source))
        .collect()
}

fn ids(docs: &[Document]) -> Vec<String> {
    docs.iter().map(|d| d.id.clone()).collect()
}

#[test]
fn test_fusion_is_deterministic_and_order_independent() {
    let fuser = RankFuser::new(60.0).unwrap();
    for seed in 1..200 {
        let mut rng = Lcg(seed);
        let keyword = ranked_list(&mut rng, DocumentSource::Keyword);
        let vector = ranked_list(&mut rng, DocumentSource::Vector);

        let forward = fuser.fuse(&[keyword.clone(), vector.clone()]);
        let again = fuser.fuse(&[keyword.clone(), vector.clone()]);
        let reversed = fuser.fuse(&[vector.clone(), keyword.clone()]);

        assert_eq!(ids(&forward), ids(&again), "seed {}", seed);
        assert_eq!(ids(&forward), ids(&reversed), "seed {}", seed);

        // every passage appears once
        let mut unique = ids(&forward);
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), forward.len(), "seed {}", seed);
    }
}

#[test]
fn test_budget_selection_never_overflows() {
    let counter = counter();
    for seed in 1..200 {
        let mut rng = Lcg(seed);
        let docs = ranked_list(&mut rng, DocumentSource::Keyword);
        let budget = rng.below(80) as usize;

        let (selected, used) = select_within_budget(docs.clone(), budget, counter.as_ref());

        let actual: usize = selected.iter().map(|d| counter.count_tokens(&d.text)).sum();
        assert_eq!(actual, used);
        assert!(used <= budget, "seed {}: {} > {}", seed, used, budget);
        // selection is a prefix of the ranking
        assert_eq!(ids(&selected), ids(&docs[..selected.len()]));
    }
}

#[tokio::test]
async fn test_retrieval_respects_evidence_budget() {
    let retrievers = registry(KeywordCorpus::medical());
    let retriever = retrievers.get(None).unwrap();
    let counter = counter();
    for for_docs in [0, 5, 12, 20, 40, 400] {
        let plan = TokenPlan::docs_only(for_docs);
        let result = retriever.search("고혈압 암로디핀 메트포르민 당뇨", None, 8, &plan).await;
        let used: usize = result.documents.iter().map(|d| counter.count_tokens(&d.text)).sum();
        assert!(used <= for_docs, "{} > {}", used, for_docs);
        assert_eq!(used, result.tokens_used);
    }
}

#[tokio::test]
async fn test_scores_always_within_unit_interval() {
    let garbage = [
        r#"{"grounding_score": 3.5, "completeness_score": -1, "accuracy_score": "9"}"#.to_string(),
        r#"{"grounding_score": "abc", "completeness_score": null}"#.to_string(),
        r#"설명 먼저 {"grounding_score": 1e9, "accuracy_score": -1e9, "needs_retrieval": "yes"} 끝"#
            .to_string(),
        "JSON 아님".to_string(),
        r#"{"grounding_score": NaN}"#.to_string(),
        verdict(1.7, true),
        verdict(-0.3, false),
    ];
    let docs = vec![Document::new("d", PASSAGES[0], 1.0, 1, DocumentSource::Keyword)];
    for reply in garbage {
        let llm = ScriptedLlm::new();
        llm.push_evaluation(reply.clone());
        let evaluator = QualityEvaluator::new(llm, &RefineConfig::default());

        let fb = evaluator
            .evaluate(&EvaluationRequest::new("고혈압 기준?", "140/90 mmHg 입니다.", &docs))
            .await;

        for score in [fb.grounding_score, fb.completeness_score, fb.accuracy_score, fb.overall_score] {
            assert!((0.0..=1.0).contains(&score), "{} from {}", score, reply);
        }
    }
}

#[tokio::test]
async fn test_compression_output_is_a_fixed_point() {
    let compressor = ContextCompressor::new(
        CompressorConfig::default(),
        DomainTerms::new(vec!["고혈압".to_string(), "당뇨".to_string()]).unwrap(),
        counter(),
    );
    let docs: Vec<Document> = PASSAGES
        .iter()
        .enumerate()
        .map(|(i, text)| Document::new(format!("p{}", i), *text, 1.0, i + 1, DocumentSource::Keyword))
        .collect();
    let total: usize = docs.iter().map(|d| counter().count_tokens(&d.text)).sum();

    for budget in [total / 4, total / 2, total, total * 2] {
        let first = compressor.compress(&docs, "고혈압 약", budget).await;
        let second = compressor.compress(&first.documents, "고혈압 약", budget).await;

        assert_eq!(second.documents, first.documents, "budget {}", budget);
        assert!(!second.stats.is_applied(), "budget {}", budget);
        if !first.documents.is_empty() && first.stats.skip_reason() != Some(SkipReason::Error) {
            assert_eq!(second.stats.skip_reason(), Some(SkipReason::WithinBudget));
        }
    }
}

#[tokio::test]
async fn test_refine_loop_always_terminates() {
    let rewrites = ["암로디핀 부종", "메트포르민 용량", "고혈압 치료제", "당뇨 운동"];
    let settings = Settings::default();
    let max_runs = settings.refine.max_iterations + 1;

    for seed in 1..40 {
        let mut rng = Lcg(seed);
        let llm = ScriptedLlm::new();
        for _ in 0..max_runs + 2 {
            llm.push_evaluation(verdict(rng.unit(), rng.below(2) == 0));
            llm.push_rewrite(rewrites[rng.below(rewrites.len() as u64) as usize]);
        }
        let turn = medirag_agent::TurnProcessor::from_settings(
            &settings,
            llm.clone(),
            registry(KeywordCorpus::medical()),
            counter(),
        )
        .unwrap();

        let response = turn.process(&TurnRequest::new("고혈압 약 부작용이 궁금해요?")).await;

        assert!(!response.iterations.is_empty(), "seed {}", seed);
        assert!(response.iterations.len() <= max_runs, "seed {}", seed);
        assert!(llm.count(CallKind::Evaluate) <= max_runs, "seed {}", seed);
        let last = response.iterations.last().unwrap();
        assert_eq!(last.termination, Some(response.termination), "seed {}", seed);
        assert!(!response.answer.is_empty());
    }
}
