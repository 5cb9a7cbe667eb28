pub mod config;
pub mod helpers;
pub mod journal;
pub mod pid;
pub mod process;
pub mod supervisor;

pub use supervisor::{Supervisor, SupervisorError};
