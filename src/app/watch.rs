use std::time::Duration;

use crate::cli::WatchArgs;
use crate::config::IngestConfig;
use crate::core::context::CallContext;
use crate::error::{Error, Result};

use super::common::{build_manager, stdout_is_terminal};
use super::display::{colorize, format_millis, status_color};

/// Stream refreshed records as they arrive. Vanished workloads are skipped and
/// nothing is deleted, unlike `list`.
pub fn handle_watch(args: WatchArgs, config: &IngestConfig) -> Result<()> {
    let manager = build_manager(config)?;
    let ctx = match args.timeout_secs {
        Some(secs) => CallContext::with_timeout(Duration::from_secs(secs)),
        None => CallContext::new(),
    };
    let color = stdout_is_terminal();

    let mut delivered = 0usize;
    manager.list_stream(&ctx, |record| {
        delivered += 1;
        if args.json {
            let line = serde_json::to_string(&record).map_err(|source| Error::EncodeRecord {
                name: record.name.clone(),
                source,
            })?;
            println!("{line}");
        } else {
            println!(
                "{}  {}  {}",
                record.name,
                colorize(&record.status, status_color(&record.status), color),
                format_millis(record.modified)
            );
        }
        Ok(())
    })?;

    if ctx.err().is_some() {
        eprintln!("Watch ended early after {delivered} workload(s).");
    }
    Ok(())
}
