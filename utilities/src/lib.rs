pub mod command_executor;
pub mod retry;
