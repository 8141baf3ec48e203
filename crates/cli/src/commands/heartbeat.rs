// `tandem heartbeat`: report liveness once.

use anyhow::Result;
use clap::Args;
use tandem_common::protocol::actions::HeartbeatResult;

use super::{block_on, GlobalArgs};
use crate::output;

#[derive(Debug, Args)]
pub struct HeartbeatArgs {}

pub fn run(_args: HeartbeatArgs, globals: &GlobalArgs) -> Result<()> {
    let client = globals.client()?;
    let result = block_on(client.heartbeat())??;
    output::print_output(globals.format(), &result, format_human)?;
    Ok(())
}

fn format_human(result: &HeartbeatResult) -> String {
    match result.collaborator_count {
        1 => "1 collaborator online.".to_owned(),
        count => format!("{count} collaborators online."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_format_pluralizes() {
        assert_eq!(
            format_human(&HeartbeatResult { collaborator_count: 1, newly_connected: true }),
            "1 collaborator online."
        );
        assert_eq!(
            format_human(&HeartbeatResult { collaborator_count: 4, newly_connected: false }),
            "4 collaborators online."
        );
    }
}
