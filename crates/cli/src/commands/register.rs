// `tandem register`: open a document and report the shared text, if any.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::{block_on, GlobalArgs};
use crate::output;

#[derive(Debug, Args)]
pub struct RegisterArgs {
    /// Document path relative to the relay's workspace.
    path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOutput {
    pub path: String,
    pub hash: String,
    /// Text shared by collaborators who were already in the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

pub fn run(args: RegisterArgs, globals: &GlobalArgs) -> Result<()> {
    let client = globals.client()?;
    let registered = block_on(client.register(&args.path))??;
    let result = RegisterOutput {
        path: args.path,
        hash: registered.hash,
        content: registered.content,
    };
    output::print_output(globals.format(), &result, format_human)?;
    Ok(())
}

fn format_human(result: &RegisterOutput) -> String {
    match &result.content {
        Some(content) => format!(
            "Joined {} ({}).\n--- shared text ---\n{content}",
            result.path, result.hash
        ),
        None => format!("Registered {} ({}). You are the only collaborator.", result.path, result.hash),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_format_without_content() {
        let output = format_human(&RegisterOutput {
            path: "notes.md".into(),
            hash: "abc123".into(),
            content: None,
        });
        assert!(output.contains("Registered notes.md (abc123)"));
        assert!(output.contains("only collaborator"));
    }

    #[test]
    fn human_format_shows_shared_text() {
        let output = format_human(&RegisterOutput {
            path: "notes.md".into(),
            hash: "abc123".into(),
            content: Some("shared line".into()),
        });
        assert!(output.starts_with("Joined notes.md"));
        assert!(output.ends_with("shared line"));
    }

    #[test]
    fn json_omits_missing_content() {
        let json = serde_json::to_value(RegisterOutput {
            path: "notes.md".into(),
            hash: "abc123".into(),
            content: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"path": "notes.md", "hash": "abc123"}));
    }
}
