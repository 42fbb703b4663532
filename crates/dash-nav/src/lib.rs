pub mod acquire;
pub mod doctor;
pub mod gnss;
pub mod store;
pub mod ubx;

pub use acquire::{AcquireConfig, AcquireStats, Acquisition, PositionSink};
pub use gnss::{compass_direction, FixParser, FixResult, FixType, NmeaReplay};
pub use store::JsonlSink;
pub use ubx::{DynamicsProfile, Frame, FrameError, ReceiverConfigurator, ReceiverSettings};
