// Control algorithms and system models.
// Algorithms are pure state machines consumed by the loop scheduler once per tick.

pub mod algorithm;
pub mod state_space;
