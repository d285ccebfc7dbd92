pub mod common;
pub mod display;
pub mod error;
pub mod info;
pub mod list;
pub mod logs;
pub mod settings;
pub mod start;
pub mod stop;
pub mod update;
pub mod watch;

pub use info::handle_info;
pub use list::handle_list;
pub use logs::handle_logs;
pub use settings::handle_settings;
pub use start::handle_start;
pub use stop::handle_stop;
pub use update::handle_update;
pub use watch::handle_watch;
