use crate::cli::NameArgs;
use crate::config::IngestConfig;
use crate::error::Result;

use super::common::build_manager;

/// Logs come from the same refresh as `info`, so the record is updated too.
pub fn handle_logs(args: NameArgs, config: &IngestConfig) -> Result<()> {
    let record = build_manager(config)?.info(&args.name)?;
    if record.logs.is_empty() {
        eprintln!("No log lines captured for `{}`.", record.name);
    }
    for line in &record.logs {
        println!("{line}");
    }
    Ok(())
}
