// `tandem peers`: list other collaborators' selections in a document.

use anyhow::Result;
use clap::Args;
use tandem_common::protocol::actions::PeerSelections;

use super::{block_on, GlobalArgs};
use crate::output;

#[derive(Debug, Args)]
pub struct PeersArgs {
    /// Document to inspect.
    path: String,
}

pub fn run(args: PeersArgs, globals: &GlobalArgs) -> Result<()> {
    let client = globals.client()?;
    let peers = block_on(client.peers(&args.path))??;
    output::print_output(globals.format(), &peers, format_human)?;
    Ok(())
}

fn format_human(peers: &PeerSelections) -> String {
    if peers.is_empty() {
        return "No other collaborators have a selection here.".into();
    }

    let mut lines = vec![format!("{} collaborator(s)", peers.len())];
    for (name, peer) in peers {
        let start = peer.selection.start;
        let end = peer.selection.end;
        let at = if peer.selection.is_cursor() {
            format!("{}:{}", start.row, start.column)
        } else {
            format!("{}:{}-{}:{}", start.row, start.column, end.row, end.column)
        };
        lines.push(format!("  {name} {} at {at}", peer.color));
    }
    lines.join("\n")
}
