// ============================================================
// Layer 4 — SQuAD Loader
// ============================================================
// Reads SQuAD-format JSON files into QaExamples.
//
// File layout (one file per dataset, named after the dataset):
//
//   {"data": [
//     {"paragraphs": [
//       {"context": "...",
//        "qas": [
//          {"id": "...", "question": "...",
//           "answers": [{"text": "...", "answer_start": 42}, ...]}
//        ]}
//     ]}
//   ]}
//
// Several answer entries may share one question id (and some
// datasets repeat the same id across paragraphs). All answers
// for an id are collapsed into one example, keeping the first
// question/context seen and the order ids first appeared in.
//
// Out-of-domain datasets can be repeated N times in the
// training mix to counter their small size.
//
// Reference: serde_json documentation
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{collections::HashMap, fs, path::PathBuf};

use crate::domain::example::{Answer, DatasetDomain, QaExample};
use crate::domain::traits::ExampleSource;

// ─── On-disk format ───────────────────────────────────────────────────────────
#[derive(Debug, Deserialize)]
struct SquadFile {
    data: Vec<SquadArticle>,
}

#[derive(Debug, Deserialize)]
struct SquadArticle {
    paragraphs: Vec<SquadParagraph>,
}

#[derive(Debug, Deserialize)]
struct SquadParagraph {
    context: String,
    qas:     Vec<SquadQuestion>,
}

#[derive(Debug, Deserialize)]
struct SquadQuestion {
    id:       String,
    question: String,
    #[serde(default)]
    answers:  Vec<SquadAnswer>,
}

#[derive(Debug, Deserialize)]
struct SquadAnswer {
    text:         String,
    answer_start: usize,
}

/// Loads one dataset file `<dir>/<dataset>`.
pub struct SquadLoader {
    path:   PathBuf,
    domain: DatasetDomain,
    repeat: usize,
}

impl SquadLoader {
    /// `outdomain_repeat` only applies when the dataset is out-of-domain.
    pub fn new(dir: impl Into<PathBuf>, dataset: &str, outdomain_repeat: usize) -> Result<Self> {
        let domain = DatasetDomain::from_name(dataset)?;
        let repeat = if domain.is_in_domain() { 1 } else { outdomain_repeat.max(1) };
        Ok(Self { path: dir.into().join(dataset), domain, repeat })
    }
}

impl ExampleSource for SquadLoader {
    fn load_all(&self) -> Result<Vec<QaExample>> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read dataset '{}'", self.path.display()))?;
        let parsed = parse_squad(&raw, self.domain.id())
            .with_context(|| format!("Malformed SQuAD file '{}'", self.path.display()))?;

        let mut examples = Vec::with_capacity(parsed.len() * self.repeat);
        for _ in 0..self.repeat {
            examples.extend(parsed.iter().cloned());
        }

        tracing::info!(
            "Loaded {} {} examples from '{}' (data_set_id={}, repeat={})",
            examples.len(),
            self.domain.name(),
            self.path.display(),
            self.domain.id(),
            self.repeat,
        );
        Ok(examples)
    }
}

/// Parse SQuAD JSON and collapse answers by question id.
pub fn parse_squad(raw: &str, data_set_id: usize) -> Result<Vec<QaExample>> {
    let file: SquadFile = serde_json::from_str(raw)?;

    let mut examples: Vec<QaExample>       = Vec::new();
    let mut index_of: HashMap<String, usize> = HashMap::new();

    for article in file.data {
        for paragraph in article.paragraphs {
            for qa in paragraph.qas {
                let answers = qa
                    .answers
                    .into_iter()
                    .map(|a| Answer::new(a.text, a.answer_start));

                match index_of.get(&qa.id).copied() {
                    Some(idx) => examples[idx].answers.extend(answers),
                    None => {
                        index_of.insert(qa.id.clone(), examples.len());
                        examples.push(QaExample {
                            id:          qa.id,
                            question:    qa.question,
                            context:     paragraph.context.clone(),
                            answers:     answers.collect(),
                            data_set_id,
                        });
                    }
                }
            }
        }
    }
    Ok(examples)
}

/// Load and merge a comma-separated list of datasets from one directory.
///
/// Returns the merged examples and the cache name used for the
/// encoded features, e.g. `"_squad_nat_questions"`.
pub fn load_datasets(
    dir:              &str,
    datasets:         &str,
    outdomain_repeat: usize,
) -> Result<(Vec<QaExample>, String)> {
    let mut all  = Vec::new();
    let mut name = String::new();
    for dataset in datasets.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        name.push('_');
        name.push_str(dataset);
        let loader = SquadLoader::new(dir, dataset, outdomain_repeat)?;
        all.extend(loader.load_all()?);
    }
    anyhow::ensure!(!name.is_empty(), "No datasets given (got '{datasets}')");
    Ok((all, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
      "data": [{"paragraphs": [
        {"context": "Paris is the capital of France.",
         "qas": [
           {"id": "q1", "question": "What is the capital of France?",
            "answers": [{"text": "Paris", "answer_start": 0}]},
           {"id": "q1", "question": "What is the capital of France?",
            "answers": [{"text": "Paris", "answer_start": 0}]},
           {"id": "q2", "question": "Which country?", "answers": []}
         ]},
        {"context": "Berlin is in Germany.",
         "qas": [{"id": "q3", "question": "Where is Berlin?",
                  "answers": [{"text": "Germany", "answer_start": 13},
                              {"text": "in Germany", "answer_start": 10}]}]}
      ]}]
    }"#;

    #[test]
    fn test_collapses_answers_per_id() {
        let ex = parse_squad(SAMPLE, 2).unwrap();
        assert_eq!(ex.len(), 3);
        assert_eq!(ex[0].id, "q1");
        assert_eq!(ex[0].answers.len(), 2);
        assert_eq!(ex[2].answers.len(), 2);
        assert!(ex.iter().all(|e| e.data_set_id == 2));
    }

    #[test]
    fn test_questions_without_answers_are_kept() {
        let ex = parse_squad(SAMPLE, 0).unwrap();
        assert_eq!(ex[1].id, "q2");
        assert!(ex[1].answers.is_empty());
    }

    #[test]
    fn test_load_datasets_merges_and_repeats_out_of_domain() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("squad"), SAMPLE).unwrap();
        fs::write(dir.path().join("race"), SAMPLE).unwrap();

        let (ex, name) =
            load_datasets(dir.path().to_str().unwrap(), "squad,race", 3).unwrap();
        assert_eq!(name, "_squad_race");
        // 3 squad examples + 3 race examples repeated 3 times
        assert_eq!(ex.len(), 3 + 9);
        assert_eq!(ex.iter().filter(|e| e.data_set_id == 4).count(), 9);
    }

    #[test]
    fn test_in_domain_is_never_repeated() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("newsqa"), SAMPLE).unwrap();
        let (ex, _) = load_datasets(dir.path().to_str().unwrap(), "newsqa", 5).unwrap();
        assert_eq!(ex.len(), 3);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_datasets(dir.path().to_str().unwrap(), "squad", 1).is_err());
    }
}
