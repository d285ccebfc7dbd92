use crate::cli::UpdateArgs;
use crate::config::IngestConfig;
use crate::core::record::WorkloadRecord;
use crate::error::{Error, Result};

use super::common::{build_manager, read_input};

pub fn handle_update(args: UpdateArgs, config: &IngestConfig) -> Result<()> {
    let body = read_input(&args.file)?;
    let record: WorkloadRecord =
        serde_json::from_str(&body).map_err(|source| Error::DecodeRecord {
            key: args.file.display().to_string(),
            source,
        })?;
    if record.name.trim().is_empty() {
        return Err(Error::InvalidArgument {
            message: "workload record must carry a name".to_string(),
        });
    }

    let stored = build_manager(config)?.update_process_info(record)?;
    println!("Updated `{}`.", stored.name);
    Ok(())
}
