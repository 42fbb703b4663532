pub mod headunit;

pub use headunit::{DisplayUpdate, HeadUnitEvent};
