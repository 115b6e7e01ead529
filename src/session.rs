//! Routing session
//!
//! Binds one [`Router`] to one output sink and applies everything the event
//! loop receives: inbound messages from the merged input queue, operator
//! commands and reloaded configuration. All of it runs on the event loop's
//! task, so the router is never touched concurrently.

use tracing::{debug, info, warn};

use crate::cli::{Command, HELP};
use crate::config::AppConfig;
use crate::midi::decode;
use crate::ports::InboundEvent;
use crate::router::{send_all, MessageSink, Router};

/// What the event loop does after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    /// Write [`Session::config`] back to the config file
    Save,
    Quit,
}

pub struct Session<S: MessageSink> {
    router: Router,
    sink: S,
    config: AppConfig,
}

impl<S: MessageSink> Session<S> {
    /// Start a session with `config` already applied
    pub fn new(config: AppConfig, sink: S) -> anyhow::Result<Self> {
        let mut router = Router::new();
        // A fresh router holds no notes, nothing to send
        config.routing.apply(&mut router)?;

        Ok(Self {
            router,
            sink,
            config,
        })
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Route one message from the input queue
    pub fn on_inbound(&mut self, event: InboundEvent) {
        debug!("RX <- {}: {}", event.port, decode(event.message));
        self.router.route(event.message, &mut self.sink);
    }

    /// Apply an operator command
    pub fn on_command(&mut self, command: Command) -> CommandOutcome {
        match command {
            Command::SetInputFilter(filter) => {
                self.router.set_input_filter(filter);
                self.config.routing.input_channel = filter.into();
                info!("Input channel: {}", filter);
            }
            Command::SetOutputChannel(channel) => {
                self.router.set_output_channel(channel);
                self.config.routing.output_channel = channel.number();
                info!("Output channel: {}", channel);
            }
            Command::SetSustainMode(mode) => {
                let released = self.router.set_sustain_mode(mode);
                send_all(&mut self.sink, &released);
                self.config.routing.sustain = mode;
                info!("Sustain mode: {}", mode);
            }
            Command::Status => println!("{}", self.router.status()),
            Command::Panic => {
                let released = self.router.release_all();
                let sent = send_all(&mut self.sink, &released);
                info!("Panic: released {} held note(s)", sent);
            }
            Command::Save => return CommandOutcome::Save,
            Command::Help => println!("{}", HELP),
            Command::Quit => return CommandOutcome::Quit,
        }
        CommandOutcome::Continue
    }

    /// Apply a reloaded configuration file
    ///
    /// Routing settings take effect immediately. Port changes only take
    /// effect on restart.
    pub fn on_config(&mut self, new_config: AppConfig) -> anyhow::Result<()> {
        if new_config.midi != self.config.midi {
            warn!(
                "MIDI port settings changed (input '{}', output '{}'); restart to apply",
                new_config.midi.input_port, new_config.midi.output_port
            );
        }

        let released = new_config.routing.apply(&mut self.router)?;
        send_all(&mut self.sink, &released);

        info!("Routing updated: {}", self.router.status());
        self.config = new_config;
        Ok(())
    }

    /// End the session, releasing held notes so nothing stays stuck
    pub fn finish(mut self) -> S {
        let released = self.router.release_all();
        if !released.is_empty() {
            info!("Releasing {} held note(s) before shutdown", released.len());
            send_all(&mut self.sink, &released);
        }
        self.sink
    }
}
