//! Prompt Building
//!
//! Assembles the answer-generation prompt. Every section is cut to its
//! [`TokenPlan`] sub-budget with the turn's single token estimator.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use medirag_core::{truncate_to_tokens, Document, TokenCounter, TokenPlan, Turn, TurnRole};

use crate::backend::GenerateRequest;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            TurnRole::User => Message::user(turn.content.clone()),
            TurnRole::Assistant => Message::assistant(turn.content.clone()),
            TurnRole::System => Message::system(turn.content.clone()),
        }
    }
}

/// Prompt builder for grounded answers
pub struct PromptBuilder {
    counter: Arc<dyn TokenCounter>,
    plan: TokenPlan,
    system_prompt: String,
    profile: String,
    longterm: String,
    history: Vec<Turn>,
    documents: Vec<Document>,
    /// false for turns that skipped retrieval
    evidence: bool,
    question: String,
}

impl PromptBuilder {
    pub fn new(counter: Arc<dyn TokenCounter>, plan: TokenPlan) -> Self {
        Self {
            counter,
            plan,
            system_prompt: String::new(),
            profile: String::new(),
            longterm: String::new(),
            history: Vec::new(),
            documents: Vec::new(),
            evidence: true,
            question: String::new(),
        }
    }

    pub fn system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = system.into();
        self
    }

    /// User profile / demographic text
    pub fn with_profile(mut self, profile: &str) -> Self {
        self.profile = profile.trim().to_string();
        self
    }

    /// Long-term conversation summary
    pub fn with_longterm(mut self, summary: &str) -> Self {
        self.longterm = summary.trim().to_string();
        self
    }

    /// Prior turns, oldest first
    pub fn with_history(mut self, history: &[Turn]) -> Self {
        self.history = history.to_vec();
        self
    }

    pub fn with_documents(mut self, documents: &[Document]) -> Self {
        self.documents = documents.to_vec();
        self
    }

    /// Omit the evidence section entirely (no retrieval this turn)
    pub fn without_evidence(mut self) -> Self {
        self.evidence = false;
        self.documents.clear();
        self
    }

    pub fn question(mut self, question: &str) -> Self {
        self.question = question.trim().to_string();
        self
    }

    /// Most recent turns that fit in `budget`, oldest first
    fn recent_section(&self, budget: usize) -> String {
        let mut kept: Vec<String> = Vec::new();
        for turn in self.history.iter().rev() {
            let mut candidate = kept.clone();
            candidate.push(turn.render());
            let text = candidate.iter().rev().cloned().collect::<Vec<_>>().join("\n");
            if self.counter.count_tokens(&text) > budget {
                break;
            }
            kept = candidate;
        }
        kept.reverse();
        kept.join("\n")
    }

    /// Numbered evidence that fits in `budget`; the last entry may be cut
    fn evidence_section(&self, budget: usize) -> String {
        let mut evidence = String::new();
        for (i, doc) in self.documents.iter().enumerate() {
            let label = format!("[{}] ", i + 1);
            let prefix = if evidence.is_empty() {
                label.clone()
            } else {
                format!("{}\n\n{}", evidence, label)
            };
            let candidate = format!("{}{}", prefix, doc.text.trim());
            if self.counter.count_tokens(&candidate) <= budget {
                evidence = candidate;
                continue;
            }
            let cut = truncate_to_tokens(&candidate, budget, self.counter.as_ref());
            // a bare "[n]" label carries nothing
            if cut.len() > prefix.len() {
                evidence = cut.to_string();
            }
            break;
        }
        evidence
    }

    fn cut(&self, text: &str, budget: usize) -> String {
        truncate_to_tokens(text, budget, self.counter.as_ref()).to_string()
    }

    /// Build the generation request
    pub fn build(self) -> GenerateRequest {
        let mut sections: Vec<String> = Vec::new();

        let profile = self.cut(&self.profile, self.plan.for_profile());
        if !profile.is_empty() {
            sections.push(format!("## 사용자 정보\n{}", profile));
        }

        let longterm = self.cut(&self.longterm, self.plan.for_longterm());
        if !longterm.is_empty() {
            sections.push(format!("## 이전 대화 요약\n{}", longterm));
        }

        let recent = self.recent_section(self.plan.for_recent());
        if !recent.is_empty() {
            sections.push(format!("## 최근 대화\n{}", recent));
        }

        if self.evidence {
            let evidence = self.evidence_section(self.plan.for_docs());
            if evidence.is_empty() {
                sections.push("## 근거 문서\n(관련 문서를 찾지 못했습니다)".to_string());
            } else {
                sections.push(format!("## 근거 문서\n{}", evidence));
            }
        }

        let question = self.cut(&self.question, self.plan.for_query());
        sections.push(format!("## 질문\n{}", question));

        let mut request = GenerateRequest::new(sections.join("\n\n"));
        if !self.system_prompt.trim().is_empty() {
            request = request.with_system(self.system_prompt);
        }
        request
    }
}
