//! CLI command implementations.

pub mod init;
pub mod mutate;
pub mod query;
pub mod scan;
pub mod watch;

pub use init::init_project;
pub use mutate::{complete_task, set_task_time};
pub use query::{query_records, QueryOptions};
pub use scan::scan_vault;
pub use watch::watch_vault;
