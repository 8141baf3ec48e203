// `tandem unregister`: leave one document or all of them.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;

use super::{block_on, GlobalArgs};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct UnregisterArgs {
    /// Document to leave.
    path: Option<String>,
    /// Leave every document you are registered to.
    #[arg(long, conflicts_with = "path")]
    all: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnregisterOutput {
    pub left: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

pub fn run(args: UnregisterArgs, globals: &GlobalArgs) -> Result<()> {
    if args.path.is_none() && !args.all {
        bail!("pass a document path or --all");
    }
    let format = globals.format();
    let client = globals.client()?;
    let reply = block_on(client.unregister(args.path.as_deref(), args.all))??;

    if let Some(notice) = &reply.notice {
        output::print_warning(format, "NOT_REGISTERED", notice);
    }
    let result = UnregisterOutput {
        left: args.path.unwrap_or_else(|| "*".to_owned()),
        notice: reply.notice,
    };
    if format == OutputFormat::Json || result.notice.is_none() {
        output::print_output(format, &result, format_human)?;
    }
    Ok(())
}

fn format_human(result: &UnregisterOutput) -> String {
    if result.left == "*" {
        "Left all documents.".to_owned()
    } else {
        format!("Left {}.", result.left)
    }
}
