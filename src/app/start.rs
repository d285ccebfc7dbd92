use crate::cli::StartArgs;
use crate::config::IngestConfig;
use crate::core::record::WorkloadRecord;
use crate::error::Result;

use super::common::build_manager;

pub fn handle_start(args: StartArgs, config: &IngestConfig) -> Result<()> {
    let manager = build_manager(config)?;

    let mut record = WorkloadRecord::new(args.name, args.rtsp);
    if let Some(rtmp) = args.rtmp {
        record = record.with_rtmp(rtmp);
    }
    if let Some(image) = args.image {
        record = record.with_image(image);
    }

    let started = manager.start(record)?;
    println!(
        "Started `{}` using {}.",
        started.name,
        started.image_tag.as_deref().unwrap_or("-")
    );
    if let Some(relay) = started.relay_endpoint() {
        println!("Relaying to {relay}.");
    }
    Ok(())
}
