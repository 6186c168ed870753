//! Result publishers. The loop never looks at what `send` returns.

use std::io::Write;

use crossbeam_channel::Sender;
use log::warn;
use retro_targets_finder::VisionMessage;

/// Hands finished messages to whatever consumes them.
pub trait Publisher: Send {
    /// Blocking send; `false` when a message could not be delivered.
    fn send(&mut self, messages: &[VisionMessage]) -> bool;
}

/// One JSON object per line.
#[derive(Debug)]
pub struct JsonLinesPublisher<W> {
    writer: W,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, message: &VisionMessage) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")
    }
}

impl<W: Write + Send> Publisher for JsonLinesPublisher<W> {
    fn send(&mut self, messages: &[VisionMessage]) -> bool {
        for message in messages {
            if let Err(err) = self.write_line(message) {
                warn!("failed to write message: {err}");
                return false;
            }
        }
        match self.writer.flush() {
            Ok(()) => true,
            Err(err) => {
                warn!("failed to flush messages: {err}");
                false
            }
        }
    }
}

/// Forwards messages into a channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: Sender<VisionMessage>,
}

impl ChannelPublisher {
    pub fn new(tx: Sender<VisionMessage>) -> Self {
        Self { tx }
    }
}

impl Publisher for ChannelPublisher {
    fn send(&mut self, messages: &[VisionMessage]) -> bool {
        messages
            .iter()
            .all(|message| self.tx.send(message.clone()).is_ok())
    }
}
