// `tandem reset`: clear selections or relay-side document state.

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;

use super::{block_on, GlobalArgs};
use crate::output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResetTarget {
    /// Your published selection.
    Selection,
    /// The relay's working text and your shadow.
    File,
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    /// What to reset.
    #[arg(value_enum)]
    target: ResetTarget,
    /// Document to reset.
    path: Option<String>,
    /// Reset across every document instead of one.
    #[arg(long, conflicts_with = "path")]
    all: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetOutput {
    pub target: ResetTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub all: bool,
}

pub fn run(args: ResetArgs, globals: &GlobalArgs) -> Result<()> {
    if args.path.is_none() && !args.all {
        bail!("pass a document path or --all");
    }
    let client = globals.client()?;
    let path = args.path.as_deref();
    match args.target {
        ResetTarget::Selection => block_on(client.reset_selection(path, args.all))??,
        ResetTarget::File => block_on(client.reset_file(path, args.all))??,
    }
    let result = ResetOutput {
        target: args.target,
        path: args.path,
        all: args.all,
    };
    output::print_output(globals.format(), &result, format_human)?;
    Ok(())
}

fn format_human(result: &ResetOutput) -> String {
    let what = match result.target {
        ResetTarget::Selection => "selection",
        ResetTarget::File => "relay state",
    };
    match (&result.path, result.all) {
        (_, true) => format!("Reset {what} for all documents."),
        (Some(path), false) => format!("Reset {what} for {path}."),
        (None, false) => format!("Reset {what}."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_format_single_and_all() {
        let one = ResetOutput {
            target: ResetTarget::File,
            path: Some("notes.md".into()),
            all: false,
        };
        assert_eq!(format_human(&one), "Reset relay state for notes.md.");

        let all = ResetOutput { target: ResetTarget::Selection, path: None, all: true };
        assert_eq!(format_human(&all), "Reset selection for all documents.");
    }

    #[test]
    fn json_uses_lowercase_target() {
        let json = serde_json::to_value(ResetOutput {
            target: ResetTarget::Selection,
            path: None,
            all: true,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"target": "selection", "all": true}));
    }
}
