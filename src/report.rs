use std::io::Write;
use std::path::Path;

use crate::dates::Year;
use crate::extract::PageExtraction;

/// Marker written when no date field carried a recognized form. Absence is
/// always visible in the output, never silently dropped.
pub const UNKNOWN_DATE: &str = "Unknown";

/// One emitted spreadsheet row: a file and its retained template evidence.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub file_url: String,
    pub year: Option<Year>,
    /// `({{Name}}, documentation URL)` pairs, in extraction order.
    pub templates: Vec<(String, String)>,
}

impl ReportRow {
    pub fn new(file_url: String, extraction: &PageExtraction) -> Self {
        Self {
            file_url,
            year: extraction.year,
            templates: extraction
                .templates
                .iter()
                .map(|usage| (usage.display_name(), usage.doc_url()))
                .collect(),
        }
    }

    fn date_cell(&self) -> String {
        match self.year {
            Some(year) => year.to_string(),
            None => UNKNOWN_DATE.to_owned(),
        }
    }

    /// The line mirrored to the console for each emitted file.
    pub fn console_line(&self) -> String {
        let templates = self
            .templates
            .iter()
            .map(|(name, url)| format!("{name} ({url})"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{} - {} - Date: {} - {}",
            self.file_url,
            self.templates.len(),
            self.date_cell(),
            templates
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The output destination could not be opened at all; this aborts the
    /// run, unlike per-row failures.
    #[error("cannot open output destination {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Default output filename in the original tool's naming scheme, with the run
/// date embedded.
pub fn default_output_name(category: &str) -> String {
    let datestamp = chrono::Local::now().format("%d%m%Y");
    format!(
        "{}-Extracted_copyright_templates-{}.csv",
        category.replace(' ', "_"),
        datestamp
    )
}

/// Writes all rows as CSV to `path`.
///
/// Row ordering is preserved. A row that fails to serialize is logged and
/// skipped; the remaining rows are still written, since the spreadsheet is
/// reviewed and cleaned up manually anyway.
pub fn write_csv_file(path: &Path, rows: &[ReportRow]) -> Result<(), ReportError> {
    let file = std::fs::File::create(path).map_err(|source| ReportError::Open {
        path: path.display().to_string(),
        source,
    })?;
    write_csv(file, rows)
}

/// Writes all rows as CSV to an arbitrary writer (separate from
/// `write_csv_file` so tests can target a buffer).
pub fn write_csv<W: Write>(writer: W, rows: &[ReportRow]) -> Result<(), ReportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let widest = rows.iter().map(|row| row.templates.len()).max().unwrap_or(0);

    let mut header = vec![
        "File URL".to_owned(),
        "NumberOfTemplates".to_owned(),
        "DateOfCreation".to_owned(),
    ];
    for i in 1..=widest {
        header.push(format!("Template {i}"));
        header.push(format!("Template {i} URL"));
    }
    csv_writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.file_url.clone(),
            row.templates.len().to_string(),
            row.date_cell(),
        ];
        for (name, url) in &row.templates {
            record.push(name.clone());
            record.push(url.clone());
        }
        record.resize(header.len(), String::new());

        if let Err(error) = csv_writer.write_record(&record) {
            tracing::error!(file = %row.file_url, %error, "skipping row that failed to serialize");
        }
    }

    csv_writer.flush().map_err(csv::Error::from)?;
    Ok(())
}
