pub mod config;
pub mod constants;
pub mod cycles;
pub mod dates;
pub mod ensemble;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod model;
pub mod pages;
