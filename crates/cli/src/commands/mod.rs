// CLI subcommand dispatch.

use std::future::Future;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::client::RelayClient;
use crate::config::{CliConfig, Settings};
use crate::output::OutputFormat;

pub mod heartbeat;
pub mod peers;
pub mod register;
pub mod reset;
pub mod select;
pub mod unregister;
pub mod watch;

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Relay base URL. Overrides `relay_url` from the config file.
    #[arg(long, global = true, value_name = "URL")]
    pub relay: Option<String>,
    /// Collaborator identity. Defaults to the config file, then $USER.
    #[arg(long = "as", global = true, value_name = "NAME")]
    pub collaborator: Option<String>,
    /// Force JSON output.
    #[arg(long, global = true)]
    pub json: bool,
}

impl GlobalArgs {
    pub fn format(&self) -> OutputFormat {
        OutputFormat::detect(self.json)
    }

    pub fn settings(&self) -> Result<Settings> {
        let file = CliConfig::load()?;
        Settings::resolve(self.relay.as_deref(), self.collaborator.as_deref(), &file)
    }

    pub fn client(&self) -> Result<RelayClient> {
        RelayClient::new(&self.settings()?)
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Open a document for collaboration
    Register(register::RegisterArgs),
    /// Leave a document, or every document with --all
    Unregister(unregister::UnregisterArgs),
    /// Report liveness and show how many collaborators are online
    Heartbeat(heartbeat::HeartbeatArgs),
    /// Publish your cursor or selection in a document
    Select(select::SelectArgs),
    /// Show who is in a document and where their cursors are
    Peers(peers::PeersArgs),
    /// Clear selections or relay-side document state
    Reset(reset::ResetArgs),
    /// Keep a local file in sync with everyone editing it
    Watch(watch::WatchArgs),
}

pub fn run(cmd: Command, globals: &GlobalArgs) -> Result<()> {
    match cmd {
        Command::Register(args) => register::run(args, globals),
        Command::Unregister(args) => unregister::run(args, globals),
        Command::Heartbeat(args) => heartbeat::run(args, globals),
        Command::Select(args) => select::run(args, globals),
        Command::Peers(args) => peers::run(args, globals),
        Command::Reset(args) => reset::run(args, globals),
        Command::Watch(args) => watch::run(args, globals),
    }
}

/// Runs a command future on a fresh single-threaded runtime.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}
