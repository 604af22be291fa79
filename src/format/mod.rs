//! Output formatting for summaries and collection reports (table, JSON, markdown, CSV).

use crate::collector::CollectionReport;
use crate::commands::run::RunOutcome;
use crate::config::OutputFormat;
use crate::summary::ComplexSummary;

/// Formats pipeline results for output.
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Creates a new formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a whole run: the collection report (if any) followed by the summaries.
    pub fn format_run(&self, outcome: &RunOutcome) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(outcome).unwrap_or_else(|_| "{}".to_string())
            }
            // CSV output is a single table; summaries win when there are any.
            OutputFormat::Csv => match &outcome.collection {
                Some(report) if outcome.summaries.is_empty() => self.csv_report(report),
                _ => self.csv_summaries(&outcome.summaries),
            },
            OutputFormat::Table | OutputFormat::Markdown => {
                let mut sections = Vec::new();
                if let Some(report) = &outcome.collection {
                    sections.push(self.format_report(report));
                }
                if outcome.collection.is_none() || !outcome.summaries.is_empty() {
                    sections.push(self.format_summaries(&outcome.summaries));
                }
                sections.join("\n\n")
            }
        }
    }

    /// Formats per-pair collection results.
    pub fn format_report(&self, report: &CollectionReport) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
            }
            OutputFormat::Table => self.table_report(report),
            OutputFormat::Markdown => self.markdown_report(report),
            OutputFormat::Csv => self.csv_report(report),
        }
    }

    /// Formats summaries.
    pub fn format_summaries(&self, summaries: &[ComplexSummary]) -> String {
        if summaries.is_empty() {
            return match self.format {
                OutputFormat::Json => "[]".to_string(),
                OutputFormat::Csv => self.csv_summary_header(),
                _ => "No summaries.".to_string(),
            };
        }

        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(summaries).unwrap_or_else(|_| "[]".to_string())
            }
            OutputFormat::Table => self.table_summaries(summaries),
            OutputFormat::Markdown => self.markdown_summaries(summaries),
            OutputFormat::Csv => self.csv_summaries(summaries),
        }
    }

    // Table formatting

    fn table_report(&self, report: &CollectionReport) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Collection for {}", report.date));
        lines.push(format!(
            "{:<10}  {:<5}  {:>8}  {:>5}  {:>7}  {:>5}  {}",
            "Complex", "Trade", "Listings", "Pages", "Skipped", "Dups", "Status"
        ));
        lines.push(format!(
            "{:-<10}  {:-<5}  {:->8}  {:->5}  {:->7}  {:->5}  {:-<20}",
            "", "", "", "", "", "", ""
        ));

        for pair in &report.pairs {
            lines.push(format!(
                "{:<10}  {:<5}  {:>8}  {:>5}  {:>7}  {:>5}  {}",
                pair.entity_id,
                pair.trade_type.code(),
                pair.listings,
                pair.pages,
                pair.skipped,
                pair.duplicates,
                pair.status
            ));
        }

        lines.push(String::new());
        lines.push(format!(
            "Total: {} listings ({} skipped, {} duplicates, {} incomplete pairs)",
            report.total_listings(),
            report.total_skipped(),
            report.total_duplicates(),
            report.incomplete_pairs().count()
        ));

        lines.join("\n")
    }

    fn table_summaries(&self, summaries: &[ComplexSummary]) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "{:<10}  {:<5}  {:>5}  {:>10}  {:>10}  {:>10}  {:<12}  {}",
            "Complex", "Trade", "Count", "Min", "Median", "Mean", "Change", "Lowest"
        ));
        lines.push(format!(
            "{:-<10}  {:-<5}  {:->5}  {:->10}  {:->10}  {:->10}  {:-<12}  {:-<30}",
            "", "", "", "", "", "", "", ""
        ));

        for summary in summaries {
            let (min, median, mean) = match &summary.stats {
                Some(s) => (s.min.to_string(), format!("{:.0}", s.median), format!("{:.0}", s.mean)),
                None => ("-".to_string(), "-".to_string(), "-".to_string()),
            };

            lines.push(format!(
                "{:<10}  {:<5}  {:>5}  {:>10}  {:>10}  {:>10}  {:<12}  {}",
                summary.entity_id,
                summary.trade_type.label(),
                summary.count,
                min,
                median,
                mean,
                change_label(summary),
                summary.lowest_listing.as_deref().unwrap_or("-")
            ));
        }

        lines.push(String::new());
        lines.push(format!("Prices in 만원. Total: {} summaries", summaries.len()));

        lines.join("\n")
    }

    // Markdown formatting

    fn markdown_report(&self, report: &CollectionReport) -> String {
        let mut lines = Vec::new();

        lines.push(format!("## Collection for {}", report.date));
        lines.push(String::new());
        lines.push("| Complex | Trade | Listings | Pages | Skipped | Status |".to_string());
        lines.push("|---------|-------|---------:|------:|--------:|--------|".to_string());

        for pair in &report.pairs {
            lines.push(format!(
                "| {} | {} | {} | {} | {} | {} |",
                pair.entity_id,
                pair.trade_type.label(),
                pair.listings,
                pair.pages,
                pair.skipped,
                Self::markdown_escape(&pair.status.to_string())
            ));
        }

        lines.push(String::new());
        lines.push(format!("*{} listings collected*", report.total_listings()));

        lines.join("\n")
    }

    fn markdown_summaries(&self, summaries: &[ComplexSummary]) -> String {
        let mut lines = Vec::new();

        lines.push("## Summaries".to_string());
        lines.push(String::new());
        lines.push("| Complex | Trade | Count | Min | Mean | Change | Lowest |".to_string());
        lines.push("|---------|-------|------:|----:|-----:|--------|--------|".to_string());

        for summary in summaries {
            let (min, mean) = match &summary.stats {
                Some(s) => (s.min.to_string(), format!("{:.0}", s.mean)),
                None => ("-".to_string(), "-".to_string()),
            };

            lines.push(format!(
                "| {} | {} | {} | {} | {} | {} | {} |",
                summary.entity_id,
                summary.trade_type.label(),
                summary.count,
                min,
                mean,
                change_label(summary),
                Self::markdown_escape(summary.lowest_listing.as_deref().unwrap_or("-"))
            ));
        }

        lines.push(String::new());
        lines.push("*Prices in 만원*".to_string());

        lines.join("\n")
    }

    fn markdown_escape(s: &str) -> String {
        s.replace('|', "\\|")
    }

    // CSV formatting

    fn csv_summary_header(&self) -> String {
        "entity_id,trade_type,date,count,complete,min,max,median,mean,delta_count,delta_mean,delta_mean_pct,new_listings,removed_listings,lowest_listing"
            .to_string()
    }

    fn csv_summaries(&self, summaries: &[ComplexSummary]) -> String {
        let mut lines = vec![self.csv_summary_header()];

        for summary in summaries {
            let stats = summary.stats.as_ref();
            let delta = summary.delta.as_ref();

            lines.push(format!(
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
                Self::csv_escape(&summary.entity_id),
                summary.trade_type.code(),
                summary.date,
                summary.count,
                summary.complete,
                opt(stats.map(|s| s.min)),
                opt(stats.map(|s| s.max)),
                opt(stats.map(|s| s.median)),
                opt(stats.map(|s| format!("{:.1}", s.mean))),
                opt(delta.map(|d| d.count)),
                opt(delta.and_then(|d| d.mean_price).map(|m| format!("{:.1}", m))),
                opt(delta.and_then(|d| d.mean_price_pct)),
                opt(delta.map(|d| d.new_listings)),
                opt(delta.map(|d| d.removed_listings)),
                Self::csv_escape(summary.lowest_listing.as_deref().unwrap_or(""))
            ));
        }

        lines.join("\n")
    }

    fn csv_report(&self, report: &CollectionReport) -> String {
        let mut lines =
            vec!["entity_id,trade_type,listings,pages,skipped,duplicates,status".to_string()];

        for pair in &report.pairs {
            lines.push(format!(
                "{},{},{},{},{},{},{}",
                Self::csv_escape(&pair.entity_id),
                pair.trade_type.code(),
                pair.listings,
                pair.pages,
                pair.skipped,
                pair.duplicates,
                Self::csv_escape(&pair.status.to_string())
            ));
        }

        lines.join("\n")
    }

    fn csv_escape(s: &str) -> String {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    }
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Short change column: `partial` for cut-short pairs, `new`, or the count
/// change plus the mean move in percent.
fn change_label(summary: &ComplexSummary) -> String {
    if !summary.complete {
        return "partial".to_string();
    }
    match &summary.delta {
        None => "new".to_string(),
        Some(d) => match d.mean_price_pct {
            Some(pct) => format!("{:+} / {:+.1}%", d.count, pct),
            None => format!("{:+}", d.count),
        },
    }
}
