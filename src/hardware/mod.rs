// Sensor/actuator access: the collaborator trait plus the random stub and the
// simulated plant used when no hardware is attached.

pub mod io;
pub mod plant;

pub use io::{ChannelId, Direction, RandomIo, SensorActuator, SensorReading};
pub use plant::SimulatedPlant;
