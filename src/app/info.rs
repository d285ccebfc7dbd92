use crate::cli::InfoArgs;
use crate::config::IngestConfig;
use crate::error::{Error, Result};

use super::common::{build_manager, stdout_is_terminal};
use super::display::print_record_detail;

pub fn handle_info(args: InfoArgs, config: &IngestConfig) -> Result<()> {
    let record = build_manager(config)?.info(&args.name)?;

    if args.json {
        let rendered =
            serde_json::to_string_pretty(&record).map_err(|source| Error::EncodeRecord {
                name: record.name.clone(),
                source,
            })?;
        println!("{rendered}");
    } else {
        print_record_detail(&record, stdout_is_terminal());
    }
    Ok(())
}
