pub mod app;
pub mod atlas;
pub mod camera3d;
pub mod cli;
pub mod config;
pub mod engine;
pub mod events;
pub mod input;
pub mod instance;
pub mod movement;
pub mod picking;
pub mod renderer;
pub mod scene;
pub mod selection;
pub mod targeting;
pub mod time;

pub use app::{load_scene, run, App};
pub use engine::{AvailabilitySource, FrameIntent, FrameReport, ShowroomEngine, StaticAvailability};
