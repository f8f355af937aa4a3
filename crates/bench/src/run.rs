use std::fs::File;
use std::io::Read;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use tsbench_core::{CsvSource, QueryFormat, QueryHandler};
use tsbench_engine::{reduce, BenchOptions, StopSignal};
use tsbench_postgres::{DbConfig, Repository};

use crate::cli::RunArgs;
use crate::report;
use crate::shutdown::spawn_signal_handler;

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let workers = args.workers as usize;
    info!(workers, "concurrent worker count");

    let db = DbConfig {
        host: args.host,
        port: args.port,
        user: args.user,
        password: args.password,
        database: args.database,
    };
    let repository = Repository::connect(&db, workers as u32)
        .await
        .context("unable to connect to database")?;
    if args.migrate {
        repository
            .migrate()
            .await
            .context("failed to apply migrations")?;
    }

    let input: Box<dyn Read + Send> = if args.input == "-" {
        Box::new(std::io::stdin())
    } else {
        let file = File::open(&args.input)
            .with_context(|| format!("failed to open {:?}", args.input))?;
        Box::new(file)
    };
    let source = CsvSource::open(input)
        .await
        .context("failed to read csv header")?;

    let format = QueryFormat {
        host: args.csv_host_hdr,
        start: args.csv_start_hdr,
        end: args.csv_end_hdr,
        timestamp_format: args.csv_ts_fmt,
    };

    let stop = StopSignal::new();
    spawn_signal_handler(stop.clone())?;

    let handler: Arc<dyn QueryHandler> = Arc::new(repository.clone());
    let outcome =
        tsbench_engine::run(BenchOptions { workers }, source, format, handler, stop).await;
    repository.close().await;
    let outcome = outcome?;

    if outcome.interrupted {
        warn!("run interrupted; partial statistics are not printed");
        return Ok(());
    }
    if outcome.samples.is_empty() {
        warn!(
            failed_jobs = outcome.failed_jobs,
            "no samples collected; nothing to report"
        );
        return Ok(());
    }
    if outcome.failed_jobs > 0 {
        warn!(
            failed_jobs = outcome.failed_jobs,
            "failed jobs are missing from the statistics"
        );
    }

    let report = reduce(&outcome.samples).context("failed to reduce samples")?;
    report::print(&report);
    Ok(())
}
