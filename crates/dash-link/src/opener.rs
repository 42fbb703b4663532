use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Opens the byte stream behind a link. Real links use [`SerialOpener`].
pub trait Opener: Send + Sync + 'static {
    type Port: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    fn open(&self, dev: &str, baud: u32) -> io::Result<Self::Port>;
}

impl<O: Opener> Opener for Arc<O> {
    type Port = O::Port;

    fn open(&self, dev: &str, baud: u32) -> io::Result<Self::Port> {
        (**self).open(dev, baud)
    }
}

/// 8N1, no flow control. Must be called from inside a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOpener;

impl Opener for SerialOpener {
    type Port = SerialStream;

    fn open(&self, dev: &str, baud: u32) -> io::Result<SerialStream> {
        let port = tokio_serial::new(dev, baud)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()?;
        Ok(port)
    }
}
