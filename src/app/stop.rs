use crate::cli::NameArgs;
use crate::config::IngestConfig;
use crate::error::Result;

use super::common::build_manager;

pub fn handle_stop(args: NameArgs, config: &IngestConfig) -> Result<()> {
    build_manager(config)?.stop(&args.name)?;
    println!("Stopped `{}`.", args.name);
    Ok(())
}
