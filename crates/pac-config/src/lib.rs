pub mod config;
pub mod constants;
pub mod keys;

pub use config::{ControllerInfo, Settings, load_settings};
