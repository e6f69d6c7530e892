pub mod constants;
pub mod demo_map;
pub mod graph;
pub mod layout;
pub mod map;
pub mod pathfinder;
pub mod rng;
pub mod session;
pub mod slots;
pub mod structured_log;
pub mod types;
