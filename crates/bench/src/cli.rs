use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tsbench", version, about = "TimescaleDB query latency benchmark harness")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a benchmark run.
    Run(RunArgs),
    /// Show the application version and exit.
    Version,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Query parameters as CSV: a file path, or `-` to read standard input.
    pub input: String,

    /// Number of concurrent workers.
    #[arg(
        short = 'w',
        long,
        env = "TSBENCH_WORKERS",
        default_value_t = 3,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub workers: u16,

    /// Database host.
    #[arg(long, env = "TSBENCH_DB_HOST", default_value = "localhost")]
    pub host: String,

    /// Database port.
    #[arg(long, env = "TSBENCH_DB_PORT", default_value_t = 5432)]
    pub port: u16,

    /// Database login role.
    #[arg(long, env = "TSBENCH_DB_USER", default_value = "postgres")]
    pub user: String,

    /// Database login password.
    #[arg(long, env = "TSBENCH_DB_PASSWORD", default_value = "password")]
    pub password: String,

    /// Database name.
    #[arg(long, env = "TSBENCH_DB_NAME", default_value = "homework")]
    pub database: String,

    /// CSV column holding the host identifier.
    #[arg(long = "csv-host-hdr", env = "TSBENCH_CSV_HOST_HDR", default_value = "hostname")]
    pub csv_host_hdr: String,

    /// CSV column holding the window start.
    #[arg(long = "csv-start-hdr", env = "TSBENCH_CSV_START_HDR", default_value = "start_time")]
    pub csv_start_hdr: String,

    /// CSV column holding the window end.
    #[arg(long = "csv-end-hdr", env = "TSBENCH_CSV_END_HDR", default_value = "end_time")]
    pub csv_end_hdr: String,

    /// strftime pattern for the timestamp columns.
    #[arg(long = "csv-ts-fmt", env = "TSBENCH_CSV_TS_FMT", default_value = "%Y-%m-%d %H:%M:%S")]
    pub csv_ts_fmt: String,

    /// Apply the embedded schema migrations before running.
    #[arg(long, env = "TSBENCH_MIGRATE", default_value_t = false)]
    pub migrate: bool,
}
