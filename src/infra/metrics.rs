// ============================================================
// Layer 6 — Scalar Logger
// ============================================================
// Records training curves and prediction samples next to the
// run's logs so they can be plotted after the fact.
//
// Output files in the run directory:
//
//   scalars.csv     step,tag,value
//                   0,train/NLL,5.912300
//                   0,train/dis_loss,1.790100
//                   5000,val/F1,48.210000
//                   ...
//
//   visuals.jsonl   one JSON object per visualised prediction
//                   {"step":5000,"split":"val","id":"...",
//                    "question":"...","context":"...",
//                    "gold":["..."],"prediction":"..."}
//
// Tags written during training:
//   train/NLL  train/dis_loss  train/dis_loss_on_qa  train/length_loss
//   val/F1     val/EM          val/discriminator_precision
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::example::QaExample;

/// One visualised prediction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Visual {
    pub step:       usize,
    pub split:      String,
    pub id:         String,
    pub question:   String,
    pub context:    String,
    pub gold:       Vec<String>,
    pub prediction: String,
}

pub struct ScalarWriter {
    csv_path:     PathBuf,
    visuals_path: PathBuf,
}

impl ScalarWriter {
    /// Open (or continue) the scalar files inside `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("scalars.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "step,tag,value")?;
            tracing::debug!("Created scalar log '{}'", csv_path.display());
        }

        Ok(Self { csv_path, visuals_path: dir.join("visuals.jsonl") })
    }

    pub fn add_scalar(&self, tag: &str, value: f64, step: usize) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(f, "{step},{tag},{value:.6}")?;
        Ok(())
    }

    /// Log `num_visuals` randomly chosen predictions with their gold answers.
    pub fn visualize(
        &self,
        predictions: &BTreeMap<String, String>,
        examples:    &[QaExample],
        step:        usize,
        split:       &str,
        num_visuals: usize,
    ) -> Result<()> {
        let by_id: HashMap<&str, &QaExample> =
            examples.iter().map(|ex| (ex.id.as_str(), ex)).collect();

        let ids: Vec<&String> = predictions.keys().collect();
        let mut rng = rand::thread_rng();
        let chosen: Vec<&&String> = ids.choose_multiple(&mut rng, num_visuals).collect();

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.visuals_path)
            .with_context(|| format!("Cannot open '{}'", self.visuals_path.display()))?;

        for id in chosen {
            let Some(ex) = by_id.get(id.as_str()) else { continue };
            let visual = Visual {
                step,
                split:      split.to_string(),
                id:         ex.id.clone(),
                question:   ex.question.clone(),
                context:    ex.context.clone(),
                gold:       ex.answer_texts().into_iter().map(str::to_string).collect(),
                prediction: predictions[id.as_str()].clone(),
            };
            writeln!(f, "{}", serde_json::to_string(&visual)?)?;
        }
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn visuals_path(&self) -> &Path {
        &self.visuals_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::example::Answer;

    fn example(id: &str) -> QaExample {
        QaExample {
            id:          id.to_string(),
            question:    format!("question {id}"),
            context:     "some context".to_string(),
            answers:     vec![Answer::new("context", 5)],
            data_set_id: 3,
        }
    }

    #[test]
    fn test_scalars_appended_after_header() {
        let dir = tempfile::tempdir().unwrap();
        let w = ScalarWriter::new(dir.path()).unwrap();
        w.add_scalar("train/NLL", 1.5, 0).unwrap();
        w.add_scalar("val/F1", 42.0, 10).unwrap();

        // reopening keeps the existing rows
        let w = ScalarWriter::new(dir.path()).unwrap();
        w.add_scalar("train/NLL", 1.25, 11).unwrap();

        let text = fs::read_to_string(w.csv_path()).unwrap();
        assert_eq!(
            text,
            "step,tag,value\n0,train/NLL,1.500000\n10,val/F1,42.000000\n11,train/NLL,1.250000\n"
        );
    }

    #[test]
    fn test_visualize_caps_sample_count() {
        let dir = tempfile::tempdir().unwrap();
        let w = ScalarWriter::new(dir.path()).unwrap();
        let examples: Vec<QaExample> = ["a", "b", "c"].iter().map(|id| example(id)).collect();
        let preds: BTreeMap<String, String> = examples
            .iter()
            .map(|ex| (ex.id.clone(), "context".to_string()))
            .collect();

        w.visualize(&preds, &examples, 7, "val", 2).unwrap();

        let text = fs::read_to_string(w.visuals_path()).unwrap();
        let rows: Vec<Visual> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|v| v.step == 7 && v.gold == vec!["context".to_string()]));
    }
}
