pub mod channel;
mod device;
pub mod error;
pub mod hal;
pub mod timebase;
pub mod toggle;

pub use channel::{ChannelState, Direction};
pub use device::SimulatedDaq;
pub use error::DaqError;
pub use hal::DigitalIo;
pub use timebase::{Schedule, TimeBase};
pub use toggle::{ToggleBinding, ToggleStats};
