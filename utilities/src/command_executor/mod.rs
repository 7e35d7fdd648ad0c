use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

pub trait Command: Send + 'static {
    type Response: Send + 'static;
    type Handler: DeviceHandler<Command = Self>;

    fn execute(self, handler: &mut Self::Handler) -> Self::Response;
}

pub trait DeviceHandler: Send + 'static {
    type Command: Command<Handler = Self>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("command executor is not running")]
    Closed,

    #[error("command executor dropped the response")]
    NoResponse,
}

pub struct GenericCommand<C: Command> {
    command: C,
    response_ch: oneshot::Sender<C::Response>,
}

impl<C: Command> GenericCommand<C> {
    pub fn new(command: C, response_ch: oneshot::Sender<C::Response>) -> Self {
        Self {
            command,
            response_ch,
        }
    }

    pub fn execute(self, handler: &mut C::Handler) -> Result<(), ExecutorError> {
        let result = self.command.execute(handler);

        self.response_ch
            .send(result)
            .map_err(|_| ExecutorError::NoResponse)
    }
}

pub struct CommandExecutor<H: DeviceHandler> {
    handler: H,
    commands_ch: mpsc::UnboundedReceiver<GenericCommand<H::Command>>,
    sender: mpsc::UnboundedSender<GenericCommand<H::Command>>,
}

impl<H: DeviceHandler> CommandExecutor<H> {
    pub fn new(handler: H) -> Self {
        let (sender, commands_ch) = mpsc::unbounded_channel();

        Self {
            handler,
            commands_ch,
            sender,
        }
    }

    pub fn sender(&self) -> CommandSender<H::Command> {
        CommandSender::new(self.sender.clone())
    }

    /// Runs until every sender is gone and returns the handler.
    pub async fn run(mut self) -> H {
        // Only external senders may keep the executor alive.
        drop(self.sender);

        while let Some(command) = self.commands_ch.recv().await {
            if let Err(e) = command.execute(&mut self.handler) {
                warn!("Command response was not delivered: {}", e);
            }
        }

        debug!("Command channel closed, executor stopping");
        self.handler
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<H> {
        tokio::spawn(self.run())
    }
}

pub struct CommandSender<C: Command> {
    commands_ch: mpsc::UnboundedSender<GenericCommand<C>>,
}

impl<C: Command> Clone for CommandSender<C> {
    fn clone(&self) -> Self {
        Self {
            commands_ch: self.commands_ch.clone(),
        }
    }
}

impl<C: Command> CommandSender<C> {
    pub fn new(commands_ch: mpsc::UnboundedSender<GenericCommand<C>>) -> Self {
        Self { commands_ch }
    }

    pub async fn send_command(&self, command: C) -> Result<C::Response, ExecutorError> {
        let (response_ch, response_rx) = oneshot::channel();
        let command = GenericCommand::new(command, response_ch);

        self.commands_ch
            .send(command)
            .map_err(|_| ExecutorError::Closed)?;

        response_rx.await.map_err(|_| ExecutorError::NoResponse)
    }
}
