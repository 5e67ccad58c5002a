pub mod boot_state;
pub mod cli;
pub mod config;
pub mod decide;
pub mod detect;
pub mod device;
pub mod error;
pub mod logging;
pub mod offload;
pub mod output;
pub mod platform;
pub mod preference;
pub mod prime;
pub mod run;
pub mod status;
pub mod sysfs;
