pub mod config;
pub mod error;
pub mod events;
pub mod loader;
pub mod manifest;
pub mod stage;
pub mod timer;
pub mod util;
pub mod tasks {
    pub mod control;
    pub mod panel;
}
