pub mod awp_config;
pub mod chapter;
pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod export;
pub mod logging;
pub mod orchestrator;
pub mod review;
pub mod ui;
pub mod util;
pub mod worker;
