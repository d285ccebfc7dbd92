use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::record::WorkloadRecord;

pub fn colorize(value: &str, code: &str, enabled: bool) -> String {
    if enabled {
        format!("\u{1b}[{code}m{value}\u{1b}[0m")
    } else {
        value.to_string()
    }
}

/// ANSI color for a runtime status string.
pub fn status_color(status: &str) -> &'static str {
    match status {
        "running" => "32",
        "exited" | "dead" | "removing" => "31",
        _ => "33",
    }
}

/// Millisecond epoch timestamp as RFC 3339, or `-` when unset.
pub fn format_millis(millis: i64) -> String {
    if millis <= 0 {
        return "-".to_string();
    }
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|at| at.format(&Rfc3339).ok())
        .unwrap_or_else(|| millis.to_string())
}

pub fn print_record_table(records: &[WorkloadRecord], color: bool) {
    if records.is_empty() {
        println!("No workloads.");
        return;
    }

    let name_width = records
        .iter()
        .map(|record| record.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let status_width = records
        .iter()
        .map(|record| record.status.len())
        .max()
        .unwrap_or(0)
        .max("STATUS".len());

    println!(
        "{:<name_width$}  {:<status_width$}  {:<8}  {}",
        "NAME", "STATUS", "RELAY", "MODIFIED"
    );
    for record in records {
        // Pad before coloring so escape codes do not skew the columns.
        let status = format!("{:<status_width$}", record.status);
        println!(
            "{:<name_width$}  {}  {:<8}  {}",
            record.name,
            colorize(&status, status_color(&record.status), color),
            relay_label(record),
            format_millis(record.modified),
        );
    }
}

pub fn print_record_detail(record: &WorkloadRecord, color: bool) {
    println!("Name:      {}", record.name);
    println!(
        "Status:    {}",
        colorize(&record.status, status_color(&record.status), color)
    );
    println!("RTSP:      {}", record.rtsp_endpoint);
    println!("RTMP:      {}", record.relay_endpoint().unwrap_or("-"));
    println!("Image:     {}", record.image_tag.as_deref().unwrap_or("-"));
    println!("Container: {}", record.container_id.as_deref().unwrap_or("-"));
    if let Some(state) = &record.state {
        println!("Started:   {}", non_empty_or_dash(&state.started_at));
        if !state.running {
            println!("Exit code: {}", state.exit_code);
            if !state.error.is_empty() {
                println!("Error:     {}", state.error);
            }
        }
    }
    println!("Created:   {}", format_millis(record.created));
    println!("Modified:  {}", format_millis(record.modified));
    println!("Log lines: {}", record.logs.len());
}

fn relay_label(record: &WorkloadRecord) -> &'static str {
    match (record.relay_endpoint(), record.streaming_status) {
        (None, _) => "-",
        (Some(_), Some(status)) if status.streaming => "on",
        (Some(_), _) => "off",
    }
}

fn non_empty_or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}
