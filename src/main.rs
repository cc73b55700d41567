//! Entry point: `dump-features <dump_id>` recomputes and stores the feature
//! row for one dump.
//!
//! Exit status: 0 when the row was written (even if some scopes were skipped
//! or failed), 1 when the dump is unknown or the history store is unreachable,
//! 2 on bad usage.

use dump_features::{
    config::AppConfig,
    features::FeatureExtractor,
    logging::{ReportLine, StructuredLogger},
    storage::SqliteHistory,
};
use std::process::ExitCode;
use tracing::{error, info, warn};

fn usage() -> ExitCode {
    eprintln!("usage: dump-features <dump_id>");
    ExitCode::from(2)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [arg] = args.as_slice() else {
        return usage();
    };
    let Ok(dump_id) = arg.parse::<i64>() else {
        return usage();
    };

    let config_path = AppConfig::path_from_env();
    let (config, config_error) = match AppConfig::read(&config_path) {
        Ok(c) => (c, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    StructuredLogger::init(config.log.json, &config.log.level);
    if let Some(e) = config_error {
        warn!(path = %config_path.display(), error = %e, "ignoring config file, using defaults");
    }

    info!(database = ?config.database_path, dump_id, "dump-features starting");

    let store = match SqliteHistory::open(&config.database_path) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot open history store");
            return ExitCode::FAILURE;
        }
    };

    let extractor = FeatureExtractor::new(&store, &config);
    match extractor.extract(dump_id) {
        Ok(report) => {
            if config.log.json {
                StructuredLogger::emit_json(&ReportLine::from(&report), &mut std::io::stdout());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(dump_id, error = %e, "feature extraction aborted");
            ExitCode::FAILURE
        }
    }
}
