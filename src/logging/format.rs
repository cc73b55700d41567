//! Progress lines on stdout, plain or one JSON object per line (ndjson).

use crate::features::ExtractionReport;
use crate::scopes::ScopeOutcome;
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Final summary of one extraction run.
#[derive(Serialize)]
pub struct ReportLine<'a> {
    pub dump_id: i64,
    pub computed: Vec<&'a str>,
    pub skipped: Vec<ScopeNote<'a>>,
    pub failed: Vec<ScopeNote<'a>>,
}

#[derive(Serialize)]
pub struct ScopeNote<'a> {
    pub scope: &'a str,
    pub reason: &'a str,
}

impl<'a> From<&'a ExtractionReport> for ReportLine<'a> {
    fn from(report: &'a ExtractionReport) -> Self {
        let mut line = ReportLine {
            dump_id: report.row.dump_id(),
            computed: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        };
        for (scope, outcome) in &report.outcomes {
            match outcome {
                ScopeOutcome::Computed => line.computed.push(scope.name()),
                ScopeOutcome::Skipped(reason) => line.skipped.push(ScopeNote {
                    scope: scope.name(),
                    reason,
                }),
                ScopeOutcome::Failed(reason) => line.failed.push(ScopeNote {
                    scope: scope.name(),
                    reason,
                }),
            }
        }
        line
    }
}

pub struct StructuredLogger;

impl StructuredLogger {
    /// Install global subscriber writing to stdout; level from RUST_LOG or `default_level`.
    pub fn init(json: bool, default_level: &str) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        if json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_writer(std::io::stdout);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt)
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stdout))
                .init();
        }
    }

    /// Emit a single JSON line without going through tracing
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) {
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(w, "{}", line);
        }
    }
}
