pub mod error;
pub mod consts;
pub mod frame;
pub mod io;
pub mod fit;
pub mod bias;
pub mod stack;
pub mod table;
pub mod cell;
pub mod paths;
pub mod reference;
pub mod config;
pub mod figures;
pub mod catalog;
pub mod task;
pub mod iterate;
pub mod registry;
pub mod tasks;
