pub mod config_cmd;
pub mod count;
pub mod init;
pub mod render;
pub mod runtime;
