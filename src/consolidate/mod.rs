//! Consolidate batch response files into a single CSV.

use tokio::fs;

use crate::{
    prelude::*,
    ui::{ProgressConfig, Ui},
};

pub mod parser;

use self::parser::{ConsolidatedRecord, parse_response};

/// CSV column names, in order.
pub const CSV_HEADER: [&str; 3] = ["image_url", "transcription", "translation"];

/// What [`consolidate`] did.
#[derive(Debug, Default)]
pub struct ConsolidateSummary {
    /// Response files read.
    pub files: usize,

    /// Rows written.
    pub records: usize,
}

/// Find all `batch_*.txt` files in `dir`, sorted by name.
pub async fn list_response_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read response directory {}", dir.display()))?;
    let mut paths = vec![];
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed to list {}", dir.display()))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with("batch_") && name.ends_with(".txt") {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Parse every response file in `input_dir` and write the records to
/// `output_path` as CSV. Missing fields become empty cells.
#[instrument(level = "debug", skip_all, fields(input_dir = %input_dir.display()))]
pub async fn consolidate(
    ui: &Ui,
    input_dir: &Path,
    output_path: &Path,
) -> Result<ConsolidateSummary> {
    let paths = list_response_files(input_dir).await?;
    let pb = ui.new_progress_bar(
        &ProgressConfig {
            emoji: "🧾",
            msg: "Parsing responses",
            done_msg: "Parsed responses",
        },
        paths.len() as u64,
    );

    let mut records = vec![];
    for path in &paths {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let parsed = parse_response(&text);
        debug!(path = %path.display(), records = parsed.len(), "Parsed response file");
        records.extend(parsed);
        pb.inc(1);
    }
    pb.finish();

    write_csv(output_path, &records).await?;
    Ok(ConsolidateSummary {
        files: paths.len(),
        records: records.len(),
    })
}

/// Write `records` to `path` as CSV, header first.
async fn write_csv(path: &Path, records: &[ConsolidatedRecord]) -> Result<()> {
    let file = fs::File::create(path)
        .await
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut wtr = csv_async::AsyncWriterBuilder::new().create_writer(file);
    wtr.write_record(CSV_HEADER)
        .await
        .context("failed to write CSV header")?;
    for record in records {
        wtr.write_record([
            record.image_url.as_deref().unwrap_or_default(),
            record.transcription.as_deref().unwrap_or_default(),
            record.translation.as_deref().unwrap_or_default(),
        ])
        .await
        .context("failed to write CSV record")?;
    }
    wtr.flush()
        .await
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_sorted_records_with_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = dir.path().join("outputs");
        std::fs::create_dir(&outputs).unwrap();
        std::fs::write(
            outputs.join("batch_00003.txt"),
            "Original URL: [c]\nTranscription: third\n---\n",
        )
        .unwrap();
        std::fs::write(
            outputs.join("batch_00001.txt"),
            "Original URL: [a]\nTranscription: first, \"quoted\"\nTranslation: one\n---\n\
             Original URL: [b]\nTranscription: second\nTranslation: two\n",
        )
        .unwrap();
        std::fs::write(outputs.join("notes.txt"), "Original URL: [ignored]\n").unwrap();

        let csv_path = dir.path().join("out.csv");
        let summary = consolidate(&Ui::init_for_tests(), &outputs, &csv_path)
            .await
            .unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.records, 3);

        let mut rdr = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(rdr.headers().unwrap().iter().collect::<Vec<_>>(), CSV_HEADER);
        let rows = rdr
            .records()
            .map(|r| r.unwrap().iter().map(str::to_owned).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        assert_eq!(
            rows,
            [
                ["a", "first, \"quoted\"", "one"],
                ["b", "second", "two"],
                ["c", "third", ""],
            ]
        );
    }

    #[tokio::test]
    async fn empty_directory_still_gets_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("out.csv");
        let summary = consolidate(&Ui::init_for_tests(), dir.path(), &csv_path)
            .await
            .unwrap();
        assert_eq!(summary.records, 0);
        assert_eq!(
            std::fs::read_to_string(&csv_path).unwrap(),
            "image_url,transcription,translation\n"
        );
    }
}
