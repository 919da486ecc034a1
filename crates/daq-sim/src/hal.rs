use crate::channel::Direction;
use crate::error::DaqError;
use std::sync::Arc;

/// Direction-checked digital I/O, implemented by simulated and real devices alike.
pub trait DigitalIo: Send + Sync {
    fn configure(&self, channel: &str, direction: Direction) -> Result<(), DaqError>;
    fn read(&self, channel: &str) -> Result<bool, DaqError>;
    fn write(&self, channel: &str, value: bool) -> Result<(), DaqError>;

    /// Failure pins are ordinary output channels.
    fn set_failure_pin(&self, channel: &str, value: bool) -> Result<(), DaqError> {
        self.write(channel, value)
    }
}

impl<T: DigitalIo + ?Sized> DigitalIo for Arc<T> {
    fn configure(&self, channel: &str, direction: Direction) -> Result<(), DaqError> {
        (**self).configure(channel, direction)
    }

    fn read(&self, channel: &str) -> Result<bool, DaqError> {
        (**self).read(channel)
    }

    fn write(&self, channel: &str, value: bool) -> Result<(), DaqError> {
        (**self).write(channel, value)
    }

    fn set_failure_pin(&self, channel: &str, value: bool) -> Result<(), DaqError> {
        (**self).set_failure_pin(channel, value)
    }
}
