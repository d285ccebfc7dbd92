use crate::cli::{SettingsArgs, SettingsCommand};
use crate::config::IngestConfig;
use crate::error::{Error, Result};

use super::common::{build_settings, read_input};

pub fn handle_settings(args: SettingsArgs, config: &IngestConfig) -> Result<()> {
    let settings = build_settings(config);

    match args.command {
        SettingsCommand::Get => {
            let current = settings.get()?;
            let rendered =
                serde_json::to_string_pretty(&current).map_err(|source| Error::EncodeRecord {
                    name: "settings".to_string(),
                    source,
                })?;
            println!("{rendered}");
        }
        SettingsCommand::Set(set) => {
            let body = match (set.json, set.file) {
                (Some(inline), _) => inline,
                (None, Some(path)) => read_input(&path)?,
                (None, None) => {
                    return Err(Error::InvalidArgument {
                        message: "settings set needs --json or --file".to_string(),
                    });
                }
            };
            let saved = settings.overwrite_json(&body)?;
            println!("Settings for `{}` saved.", saved.name);
        }
    }
    Ok(())
}
