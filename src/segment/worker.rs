//! Transmux worker channel
//!
//! The transmuxer runs on its own thread and only ever talks to the
//! media source through two unbounded channels: commands going in,
//! messages coming out. Nothing is shared between the two sides.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::types::{ByteView, Segment, TrackPresence};
use crate::config::WorkerConfig;
use crate::error::{MediaSourceError, Result};

/// Instructions sent to the transmuxer
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCommand {
    /// Transport stream bytes; only the view's window is consumed
    Push(ByteView),
    /// Emit everything buffered so far, followed by `Done`
    Flush,
    /// Realign the output timeline to this offset (seconds)
    SetTimestampOffset(f64),
    /// Audio already buffered up to this time can be trimmed
    SetAudioAppendStart(f64),
    /// Drop all partially transmuxed data
    Reset,
}

impl WorkerCommand {
    /// Action name as used on the wire
    pub fn action(&self) -> &'static str {
        match self {
            WorkerCommand::Push(_) => "push",
            WorkerCommand::Flush => "flush",
            WorkerCommand::SetTimestampOffset(_) => "setTimestampOffset",
            WorkerCommand::SetAudioAppendStart(_) => "setAudioAppendStart",
            WorkerCommand::Reset => "reset",
        }
    }
}

/// Messages produced by the transmuxer
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// One transmuxed fragment
    Data(Segment),
    /// End of a flush cycle
    Done,
    /// Elementary streams present in the input
    TrackInfo(TrackPresence),
}

impl WorkerMessage {
    pub fn action(&self) -> &'static str {
        match self {
            WorkerMessage::Data(_) => "data",
            WorkerMessage::Done => "done",
            WorkerMessage::TrackInfo(_) => "trackinfo",
        }
    }
}

/// The opaque MPEG-TS to fMP4 transmuxer
pub trait Transmuxer: Send + 'static {
    fn handle(&mut self, command: WorkerCommand) -> Vec<WorkerMessage>;
}

impl<T: Transmuxer + ?Sized> Transmuxer for Box<T> {
    fn handle(&mut self, command: WorkerCommand) -> Vec<WorkerMessage> {
        (**self).handle(command)
    }
}

/// The caller's end of a worker connection
pub trait WorkerPort: Send {
    /// Queue a command; never blocks
    fn post(&mut self, command: WorkerCommand) -> Result<()>;

    /// Next message, if one is ready
    fn try_recv(&mut self) -> Option<WorkerMessage>;

    /// Close the connection. Idempotent.
    fn terminate(&mut self);

    fn is_terminated(&self) -> bool;
}

/// A transmuxer running on a dedicated OS thread
pub struct ThreadWorker {
    commands: Option<UnboundedSender<WorkerCommand>>,
    messages: UnboundedReceiver<WorkerMessage>,
}

impl ThreadWorker {
    pub fn spawn<T: Transmuxer>(name: &str, transmuxer: T) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(transmuxer, command_rx, message_tx))
            .map_err(MediaSourceError::WorkerSpawn)?;

        tracing::debug!("Spawned transmux worker {:?}", name);
        Ok(Self {
            commands: Some(command_tx),
            messages: message_rx,
        })
    }

    /// Wait for the next message.
    ///
    /// Blocks the calling thread, so this is for hosts that drive the
    /// worker from a thread of their own.
    pub fn recv_blocking(&mut self) -> Option<WorkerMessage> {
        self.messages.blocking_recv()
    }
}

fn run_worker<T: Transmuxer>(
    mut transmuxer: T,
    mut commands: UnboundedReceiver<WorkerCommand>,
    messages: UnboundedSender<WorkerMessage>,
) {
    while let Some(command) = commands.blocking_recv() {
        for message in transmuxer.handle(command) {
            if messages.send(message).is_err() {
                tracing::debug!("Message channel closed, stopping transmux worker");
                return;
            }
        }
    }
    tracing::debug!("Command channel closed, stopping transmux worker");
}

impl WorkerPort for ThreadWorker {
    fn post(&mut self, command: WorkerCommand) -> Result<()> {
        let sender = self.commands.as_ref().ok_or(MediaSourceError::WorkerClosed)?;
        sender
            .send(command)
            .map_err(|_| MediaSourceError::WorkerClosed)
    }

    fn try_recv(&mut self) -> Option<WorkerMessage> {
        if self.commands.is_none() {
            return None;
        }
        self.messages.try_recv().ok()
    }

    fn terminate(&mut self) {
        if self.commands.take().is_some() {
            self.messages.close();
        }
    }

    fn is_terminated(&self) -> bool {
        self.commands.is_none()
    }
}

impl Drop for ThreadWorker {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Creates one worker per virtual buffer
pub trait WorkerFactory: Send {
    fn create(&self, config: &WorkerConfig) -> Result<Box<dyn WorkerPort>>;
}

impl<F> WorkerFactory for F
where
    F: Fn(&WorkerConfig) -> Result<Box<dyn WorkerPort>> + Send,
{
    fn create(&self, config: &WorkerConfig) -> Result<Box<dyn WorkerPort>> {
        self(config)
    }
}

/// Spawns a [`ThreadWorker`] around a fresh transmuxer for every buffer
pub struct TransmuxerFactory {
    make: Box<dyn Fn() -> Box<dyn Transmuxer> + Send>,
}

impl TransmuxerFactory {
    pub fn new<F, T>(make: F) -> Self
    where
        F: Fn() -> T + Send + 'static,
        T: Transmuxer,
    {
        Self {
            make: Box::new(move || Box::new(make()) as Box<dyn Transmuxer>),
        }
    }
}

impl WorkerFactory for TransmuxerFactory {
    fn create(&self, config: &WorkerConfig) -> Result<Box<dyn WorkerPort>> {
        let worker = ThreadWorker::spawn(&config.thread_name, (self.make)())?;
        Ok(Box::new(worker))
    }
}
