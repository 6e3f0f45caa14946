//! CLI command implementations.

mod job;
mod memory;
mod profiles;
mod render;
mod status;

pub use job::{execute_resume_command, execute_run_command};
pub use memory::execute_memory_list_command;
pub use profiles::execute_profiles_command;
pub use status::execute_status_command;
