// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Server entry: CLI parsing, config loading and task wiring.

use std::collections::HashMap;
use std::path::Path;

use clap::{Arg, ArgAction};
use tokio::runtime::Runtime;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::constants;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, ErrorKind};
use crate::listener::Listener;
use crate::log::init_log;
use crate::types::ListenerId;

pub const DEFAULT_CONFIG: &str = "/etc/weir/weir.toml";
const OPT_CONFIG: &str = "config";
const OPT_TEST: &str = "test";

/// Entry point of server.
///
/// # Errors
///
/// Returns error if config is invalid or server fails to bind.
pub fn run_server() -> Result<(), Error> {
    let matches = clap::Command::new("Weir")
        .version(env!("CARGO_PKG_VERSION"))
        .about("High performance MQTT broker")
        .arg(
            Arg::new(OPT_CONFIG)
                .short('c')
                .long(OPT_CONFIG)
                .value_name("config_file")
                .help("Specify config file path"),
        )
        .arg(
            Arg::new(OPT_TEST)
                .short('t')
                .long(OPT_TEST)
                .action(ArgAction::SetTrue)
                .help("Test config file and exit"),
        )
        .get_matches();

    let config_file = matches.get_one::<String>(OPT_CONFIG).map_or_else(
        || {
            if Path::new(DEFAULT_CONFIG).exists() {
                Some(DEFAULT_CONFIG.to_string())
            } else {
                None
            }
        },
        |config_file| Some(config_file.clone()),
    );

    let config = if let Some(config_file) = &config_file {
        let config_content = std::fs::read_to_string(config_file)?;
        let config: Config = toml::from_str(&config_content).map_err(|err| {
            Error::from_string(ErrorKind::ConfigError, format!("Invalid config: {err:?}"))
        })?;

        config.validate()?;

        if matches.get_flag(OPT_TEST) {
            println!("The configuration file {config_file} syntax is Ok");
            return Ok(());
        }
        config
    } else {
        Config::default()
    };

    init_log(config.log())?;

    let mut server = ServerContext::new(config);
    let runtime = Runtime::new()?;
    server.run_loop(&runtime)
}

/// Run server with predefined config.
///
/// Useful for integration tests.
///
/// # Errors
///
/// Returns error if server fails to bind.
pub fn run_server_with_config(config: Config) -> Result<(), Error> {
    init_log(config.log())?;
    let mut server = ServerContext::new(config);
    let runtime = Runtime::new()?;
    server.run_loop(&runtime)
}

/// Holds the dispatcher and listener tasks of one broker process.
#[derive(Debug)]
pub struct ServerContext {
    config: Config,
}

impl ServerContext {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Block on the server until SIGINT arrives.
    ///
    /// # Errors
    ///
    /// Returns error if binding a listener fails.
    pub fn run_loop(&mut self, runtime: &Runtime) -> Result<(), Error> {
        runtime.block_on(async {
            let (listener_handles, dispatcher_handle, shutdown_sender) = self.start().await?;

            tokio::signal::ctrl_c().await?;
            log::info!("server: Got SIGINT, shutting down");
            Self::shutdown(listener_handles, dispatcher_handle, &shutdown_sender).await;
            Ok(())
        })
    }

    /// Bind all listeners and spawn every task.
    ///
    /// # Errors
    ///
    /// Returns error if binding a listener fails.
    pub async fn start(
        &mut self,
    ) -> Result<(Vec<JoinHandle<()>>, JoinHandle<()>, broadcast::Sender<()>), Error> {
        let (dispatcher_sender, dispatcher_receiver) = mpsc::channel(constants::CHANNEL_CAPACITY);
        let (shutdown_sender, _shutdown_receiver) = broadcast::channel(4);

        let mut listener_senders = HashMap::new();
        let mut listener_handles = Vec::new();
        #[allow(clippy::cast_possible_truncation)]
        for (index, listener_config) in self.config.listeners().iter().enumerate() {
            let listener_id = index as ListenerId + 1;
            let (to_listener_sender, to_listener_receiver) =
                mpsc::channel(constants::CHANNEL_CAPACITY);
            listener_senders.insert(listener_id, to_listener_sender);

            let mut listener = Listener::bind(
                listener_id,
                listener_config.clone(),
                self.config.security(),
                dispatcher_sender.clone(),
                to_listener_receiver,
                shutdown_sender.subscribe(),
            )
            .await?;
            listener_handles.push(tokio::spawn(async move {
                listener.run_loop().await;
            }));
        }

        let mut dispatcher = Dispatcher::new(
            dispatcher_receiver,
            listener_senders,
            self.config.general().sys_interval(),
        );
        let dispatcher_handle = tokio::spawn(async move {
            dispatcher.run_loop().await;
        });

        Ok((listener_handles, dispatcher_handle, shutdown_sender))
    }

    async fn shutdown(
        listener_handles: Vec<JoinHandle<()>>,
        dispatcher_handle: JoinHandle<()>,
        shutdown_sender: &broadcast::Sender<()>,
    ) {
        if shutdown_sender.send(()).is_err() {
            log::warn!("server: No listener received the shutdown signal");
        }
        for handle in listener_handles {
            if let Err(err) = handle.await {
                log::warn!("server: Listener task failed: {err:?}");
            }
        }
        // Sessions flush their DISCONNECT packets before the dispatcher
        // channel drains; give them a moment.
        tokio::time::sleep(constants::TICK_INTERVAL).await;
        dispatcher_handle.abort();
        let _ = dispatcher_handle.await;
    }
}
