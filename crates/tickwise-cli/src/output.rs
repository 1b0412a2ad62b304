use serde::Serialize;
use serde_json::Value;
use tickwise_core::{RunStatus, UtcDateTime};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// A titled block of aligned columns in table output.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub title: Option<String>,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<&'static str>) -> Self {
        Self {
            title: None,
            headers,
            rows: Vec::new(),
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (index, cell) in row.iter().enumerate() {
                let len = cell.chars().count();
                match widths.get_mut(index) {
                    Some(width) => *width = (*width).max(len),
                    None => widths.push(len),
                }
            }
        }

        let mut out = String::new();
        if let Some(title) = &self.title {
            out.push_str(title);
            out.push('\n');
        }
        out.push_str(&aligned(&self.headers, &widths));
        let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
        out.push_str(&aligned(&rule, &widths));
        if self.rows.is_empty() {
            out.push_str("(none)\n");
        }
        for row in &self.rows {
            out.push_str(&aligned(row, &widths));
        }
        out
    }
}

fn aligned<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    let mut line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{:<width$}", cell.as_ref()))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_owned();
    line.push('\n');
    line
}

/// Result of one command, rendered as JSON or as tables.
#[derive(Debug)]
pub struct CommandOutput {
    pub command: &'static str,
    pub status: RunStatus,
    pub data: Value,
    pub tables: Vec<Table>,
    pub summary: Vec<(&'static str, String)>,
    pub warnings: Vec<String>,
}

impl CommandOutput {
    pub fn new(command: &'static str, data: Value) -> Self {
        Self {
            command,
            status: RunStatus::Success,
            data,
            tables: Vec::new(),
            summary: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn with_summary(mut self, label: &'static str, value: impl ToString) -> Self {
        self.summary.push((label, value.to_string()));
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    command: &'a str,
    status: RunStatus,
    generated_at: UtcDateTime,
    data: &'a Value,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    warnings: &'a [String],
}

pub fn render(output: &CommandOutput, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let document = JsonDocument {
                command: output.command,
                status: output.status,
                generated_at: UtcDateTime::now(),
                data: &output.data,
                warnings: &output.warnings,
            };
            let payload = if pretty {
                serde_json::to_string_pretty(&document)?
            } else {
                serde_json::to_string(&document)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => print!("{}", render_table(output)?),
    }
    Ok(())
}

fn render_table(output: &CommandOutput) -> Result<String, CliError> {
    let mut out = String::new();
    let label_width = output
        .summary
        .iter()
        .map(|(label, _)| label.len())
        .max()
        .unwrap_or(0)
        .max("status".len());
    out.push_str(&format!(
        "{:<label_width$}: {}\n",
        "status",
        output.status.as_str()
    ));
    for (label, value) in &output.summary {
        out.push_str(&format!("{label:<label_width$}: {value}\n"));
    }

    if output.tables.is_empty() {
        out.push_str("data:\n");
        for line in serde_json::to_string_pretty(&output.data)?.lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
    for table in &output.tables {
        out.push('\n');
        out.push_str(&table.render());
    }

    if !output.warnings.is_empty() {
        out.push_str("\nwarnings:\n");
        for warning in &output.warnings {
            out.push_str(&format!("  - {warning}\n"));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_columns_are_aligned() {
        let mut table = Table::new(vec!["#", "Ticker", "Score"]);
        table.push(vec!["1".into(), "MSFT".into(), "3".into()]);
        table.push(vec!["2".into(), "GOOGL".into(), "5".into()]);

        assert_eq!(
            table.render(),
            "#  Ticker  Score\n\
             -  ------  -----\n\
             1  MSFT    3\n\
             2  GOOGL   5\n"
        );
    }

    #[test]
    fn falls_back_to_json_data_without_tables() {
        let output = CommandOutput::new("fetch", json!({"price": "187.44"}))
            .with_summary("ticker", "AAPL")
            .with_warning("served from cache");
        let text = render_table(&output).expect("render");
        assert!(text.starts_with("status: success\nticker: AAPL\ndata:\n"));
        assert!(text.contains("\"price\": \"187.44\""));
        assert!(text.ends_with("warnings:\n  - served from cache\n"));
    }
}
