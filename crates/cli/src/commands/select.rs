// `tandem select`: publish a cursor or selection range.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tandem_common::types::{Position, Selection};

use super::{block_on, GlobalArgs};
use crate::output;

#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Document the selection belongs to.
    path: String,
    /// Zero-based row of the cursor or selection start.
    #[arg(long)]
    row: u32,
    /// Zero-based column of the cursor or selection start.
    #[arg(long)]
    column: u32,
    /// Row where the selection ends. Defaults to `--row`.
    #[arg(long)]
    to_row: Option<u32>,
    /// Column where the selection ends. Defaults to `--column`.
    #[arg(long)]
    to_column: Option<u32>,
}

impl SelectArgs {
    fn selection(&self) -> Selection {
        let start = Position { row: self.row, column: self.column };
        let end = Position {
            row: self.to_row.unwrap_or(self.row),
            column: self.to_column.unwrap_or(self.column),
        };
        Selection { start, end }.normalized()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectOutput {
    pub path: String,
    pub selection: Selection,
}

pub fn run(args: SelectArgs, globals: &GlobalArgs) -> Result<()> {
    let selection = args.selection();
    let client = globals.client()?;
    block_on(client.send_selection(&args.path, selection))??;
    let result = SelectOutput { path: args.path, selection };
    output::print_output(globals.format(), &result, format_human)?;
    Ok(())
}

fn format_human(result: &SelectOutput) -> String {
    let Selection { start, end } = result.selection;
    if result.selection.is_cursor() {
        format!("Cursor at {}:{} in {}.", start.row, start.column, result.path)
    } else {
        format!(
            "Selected {}:{}-{}:{} in {}.",
            start.row, start.column, end.row, end.column, result.path
        )
    }
}
