//! Record parsers for task lines and delimited blocks.

pub mod block;
pub mod line;

pub use block::{parse_block, BlockContext, BLOCK_TITLE_BUDGET};
pub use line::{parse_task_line, task_status, LineContext};
