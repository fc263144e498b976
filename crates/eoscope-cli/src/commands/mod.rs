pub mod config;
pub mod describe;
pub mod list;
pub mod run;
