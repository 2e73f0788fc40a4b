pub mod burst;
pub mod camera;
pub mod clock;
pub mod config;
pub mod controller;
pub mod countdown;
pub mod error;
pub mod paths;
pub mod permissions;
pub mod photos;
pub mod plan;
pub mod presets;
pub mod sequencer;
pub mod share;
pub mod storage;
pub mod store;
