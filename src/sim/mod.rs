/// Simulation: level loading, the world model, the step pipeline and
/// everything that outlives a single step (session, progress).

pub mod anim;
pub mod event;
pub mod level;
pub mod progress;
pub mod session;
pub mod step;
pub mod world;
