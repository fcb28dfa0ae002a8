pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod outline;
pub mod path_chain;
pub mod product;
pub mod protocol;
pub mod session;
pub mod symbols;
pub mod sync;
