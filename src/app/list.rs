use crate::cli::ListArgs;
use crate::config::IngestConfig;
use crate::error::{Error, Result};

use super::common::{build_manager, stdout_is_terminal};
use super::display::print_record_table;

pub fn handle_list(args: ListArgs, config: &IngestConfig) -> Result<()> {
    let records = build_manager(config)?.list()?;

    if args.json {
        let rendered =
            serde_json::to_string_pretty(&records).map_err(|source| Error::EncodeRecord {
                name: "list".to_string(),
                source,
            })?;
        println!("{rendered}");
    } else {
        print_record_table(&records, stdout_is_terminal());
    }
    Ok(())
}
