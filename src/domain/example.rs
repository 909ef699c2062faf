// ============================================================
// Layer 3 — QA Example Domain Types
// ============================================================
// One extractive QA example as read from a SQuAD-format file:
//   - a question
//   - the context passage
//   - zero or more gold answers (character offsets into context)
//   - the dataset it came from
//
// The dataset matters because training mixes several datasets
// (multi-task learning) and the domain discriminator learns to
// tell them apart. Datasets are split into two groups:
//
//   in-domain      squad, nat_questions, newsqa          ids 0..=2
//   out-of-domain  duorc, race, relation_extraction      ids 3..=5
//
// Reference: Rajpurkar et al. (2016) SQuAD
//            Rust Book §6 (Enums)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// A gold answer span. `answer_start` is a CHARACTER index
/// into the context, not a byte index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text:         String,
    pub answer_start: usize,
}

impl Answer {
    pub fn new(text: impl Into<String>, answer_start: usize) -> Self {
        Self { text: text.into(), answer_start }
    }

    /// Exclusive character end of the answer inside the context
    pub fn answer_end(&self) -> usize {
        self.answer_start + self.text.chars().count()
    }
}

/// One question over one context.
/// All answer entries sharing the same question id are collapsed
/// into `answers`; test splits may have none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaExample {
    pub id:          String,
    pub question:    String,
    pub context:     String,
    pub answers:     Vec<Answer>,
    pub data_set_id: usize,
}

impl QaExample {
    /// The answer used as the training label
    pub fn first_answer(&self) -> Option<&Answer> {
        self.answers.first()
    }

    /// Gold answer texts used for scoring
    pub fn answer_texts(&self) -> Vec<&str> {
        self.answers.iter().map(|a| a.text.as_str()).collect()
    }
}

/// Number of discriminator classes (one per known dataset)
pub const NUM_DOMAINS: usize = 6;

/// Dataset ids below this value are in-domain
pub const IN_DOMAIN_LIMIT: usize = 3;

/// The known datasets and their fixed discriminator class ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetDomain {
    Squad,
    NatQuestions,
    NewsQa,
    DuoRc,
    Race,
    RelationExtraction,
}

impl DatasetDomain {
    pub const ALL: [DatasetDomain; NUM_DOMAINS] = [
        DatasetDomain::Squad,
        DatasetDomain::NatQuestions,
        DatasetDomain::NewsQa,
        DatasetDomain::DuoRc,
        DatasetDomain::Race,
        DatasetDomain::RelationExtraction,
    ];

    /// Resolve a dataset file name (as used on the command line)
    pub fn from_name(name: &str) -> Result<Self> {
        let name = name.trim();
        match Self::ALL.into_iter().find(|d| d.name() == name) {
            Some(domain) => Ok(domain),
            None => bail!(
                "Unknown dataset '{name}'. Expected one of: {}",
                Self::ALL.map(Self::name).join(", ")
            ),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Squad              => "squad",
            Self::NatQuestions       => "nat_questions",
            Self::NewsQa             => "newsqa",
            Self::DuoRc              => "duorc",
            Self::Race               => "race",
            Self::RelationExtraction => "relation_extraction",
        }
    }

    /// Discriminator class id
    pub fn id(self) -> usize {
        match self {
            Self::Squad              => 0,
            Self::NatQuestions       => 1,
            Self::NewsQa             => 2,
            Self::DuoRc              => 3,
            Self::Race               => 4,
            Self::RelationExtraction => 5,
        }
    }

    pub fn is_in_domain(self) -> bool {
        is_in_domain_id(self.id())
    }
}

pub fn is_in_domain_id(data_set_id: usize) -> bool {
    data_set_id < IN_DOMAIN_LIMIT
}
