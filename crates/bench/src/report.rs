use comfy_table::Table;

use tsbench_engine::{Report, Summary};

const PER_HOST_HEADER: [&str; 7] = [
    "HOSTNAME",
    "TOTAL_RUN",
    "TOTAL_TIME",
    "MIN",
    "MAX",
    "MEDIAN",
    "AVG",
];

fn fmt_ms(value: f64) -> String {
    format!("{value:.4}ms")
}

fn summary_cells(summary: &Summary) -> Vec<String> {
    vec![
        summary.total_run.to_string(),
        fmt_ms(summary.total_time),
        fmt_ms(summary.min),
        fmt_ms(summary.max),
        fmt_ms(summary.median),
        fmt_ms(summary.mean),
    ]
}

fn per_host_table(report: &Report) -> Table {
    let mut table = Table::new();
    table.set_header(PER_HOST_HEADER);
    for host in &report.per_host {
        let mut row = vec![host.host_id.clone()];
        row.extend(summary_cells(&host.summary));
        table.add_row(row);
    }
    table
}

fn overall_table(report: &Report) -> Table {
    let mut table = Table::new();
    table.set_header(&PER_HOST_HEADER[1..]);
    table.add_row(summary_cells(&report.overall));
    table
}

/// Render both statistics tables to standard output.
pub fn print(report: &Report) {
    println!("{}", per_host_table(report));
    println!();
    println!("{}", overall_table(report));
}
