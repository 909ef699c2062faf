// ============================================================
// Layer 6 — Submission Writer
// ============================================================
// Leaderboard format:
//
//   Id,Predicted
//   0a1b...,Denver Broncos
//   0c2d...,"Paris, France"
//
// Rows sorted by id. Fields containing a comma, quote or line
// break are quoted and inner quotes doubled (RFC 4180).

use anyhow::{Context, Result};
use std::{
    collections::BTreeMap,
    fs,
    io::{BufWriter, Write},
    path::Path,
};

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Write `predictions` (already id-ordered) to `path`.
pub fn write_submission(path: impl AsRef<Path>, predictions: &BTreeMap<String, String>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create '{}'", parent.display()))?;
    }
    let file = fs::File::create(path)
        .with_context(|| format!("Cannot create submission file '{}'", path.display()))?;
    let mut out = BufWriter::new(file);

    write!(out, "Id,Predicted\r\n")?;
    for (id, answer) in predictions {
        write!(out, "{},{}\r\n", quote_field(id), quote_field(answer))?;
    }
    out.flush()?;

    tracing::info!("Wrote {} predictions to '{}'", predictions.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting() {
        assert_eq!(quote_field("plain"), "plain");
        assert_eq!(quote_field("Paris, France"), "\"Paris, France\"");
        assert_eq!(quote_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_rows_sorted_with_header() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_submission.csv");
        let mut preds = BTreeMap::new();
        preds.insert("b".to_string(), "second, answer".to_string());
        preds.insert("a".to_string(), "first".to_string());

        write_submission(&path, &preds).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Id,Predicted\r\na,first\r\nb,\"second, answer\"\r\n");
    }
}
