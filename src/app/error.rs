use std::process::ExitCode;

use crate::Error;
use crate::core::runtime::RuntimeError;
use crate::core::store::StoreError;

pub fn exit_code(err: &Error) -> ExitCode {
    match err {
        Error::InvalidArgument { .. } => ExitCode::from(65),
        Error::InvalidSettings { .. } => ExitCode::from(65),
        Error::DecodeRecord { .. } => ExitCode::from(65),
        Error::ParseConfig { .. } => ExitCode::from(65),
        Error::InvalidConfig { .. } => ExitCode::from(65),
        Error::ExplicitConfigMissing { .. } => ExitCode::from(66),
        Error::ProcessNotFound { .. } => ExitCode::from(69),
        Error::ProcessNotFoundDatastore { .. } => ExitCode::from(69),
        Error::Runtime(RuntimeError::NotFound { .. }) => ExitCode::from(69),
        Error::Store(StoreError::NotFound { .. }) => ExitCode::from(69),
        Error::Runtime(_) => ExitCode::from(70),
        Error::Store(_) => ExitCode::from(70),
        Error::Cache(_) => ExitCode::from(70),
        Error::EncodeRecord { .. } => ExitCode::from(70),
        Error::WorkingDirectoryUnavailable { .. } => ExitCode::from(70),
        Error::ReadConfig { .. } => ExitCode::from(74),
        Error::ReadInput { .. } => ExitCode::from(74),
    }
}
