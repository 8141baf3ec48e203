use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tandem_common::diff::Patch;
use tandem_common::protocol::actions::{
    self, DocumentParams, HeartbeatResult, PeerSelections, RegisterResult, ResetParams,
    SelectionChangeParams, SelectionPayload, SendShadowParams, SyncTextParams, SyncTextResult,
    UnregisterParams,
};
use tandem_common::protocol::{Envelope, Status};
use tandem_common::types::Selection;
use tracing::debug;
use url::Url;

use crate::config::Settings;

const COLLABORATOR_HEADER: &str = "x-collaborator";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// An error envelope returned by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayError {
    pub action: String,
    pub status: u16,
    pub code: Option<String>,
    pub message: String,
    pub retryable: bool,
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "relay rejected `{}` ({}): {}", self.action, self.status, self.message)
    }
}

impl std::error::Error for RelayError {}

impl RelayError {
    fn from_envelope(action: &str, status: u16, envelope: &Envelope) -> Self {
        let data = envelope.data.as_ref();
        Self {
            action: action.to_owned(),
            status,
            code: data
                .and_then(|data| data.get("code"))
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
            message: envelope
                .message
                .clone()
                .unwrap_or_else(|| "unknown relay error".to_owned()),
            retryable: data
                .and_then(|data| data.get("retryable"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

/// The relay error behind `error`, if any.
pub fn relay_error(error: &anyhow::Error) -> Option<&RelayError> {
    error.chain().find_map(|cause| cause.downcast_ref::<RelayError>())
}

/// Whether the failed action can simply be retried on the next tick.
pub fn is_retryable(error: &anyhow::Error) -> bool {
    relay_error(error).is_some_and(|relay| relay.retryable)
}

/// Outcome of an action that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub notice: Option<String>,
    pub data: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct RelayClient {
    base_url: Url,
    collaborator: String,
    client: reqwest::Client,
}

impl RelayClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            base_url: settings.relay_url.clone(),
            collaborator: settings.collaborator.clone(),
            client,
        })
    }

    pub fn collaborator(&self) -> &str {
        &self.collaborator
    }

    fn action_url(&self, action: &str) -> Result<Url> {
        self.base_url
            .join(&format!("v1/actions/{action}"))
            .with_context(|| format!("invalid action url for `{action}`"))
    }

    /// Sends one action and unwraps the envelope.
    pub async fn call<P: Serialize>(&self, action: &str, params: &P) -> Result<Reply> {
        let url = self.action_url(action)?;
        let response = self
            .client
            .post(url.clone())
            .header(COLLABORATOR_HEADER, &self.collaborator)
            .json(params)
            .send()
            .await
            .with_context(|| format!("failed to reach relay at {url}"))?;

        let status = response.status().as_u16();
        let envelope: Envelope = response
            .json()
            .await
            .with_context(|| format!("relay returned a malformed envelope for `{action}`"))?;
        debug!(action, status, envelope_status = ?envelope.status, "relay replied");

        match envelope.status {
            Status::Error => Err(anyhow!(RelayError::from_envelope(action, status, &envelope))),
            Status::Notice => Ok(Reply {
                notice: envelope.message,
                data: envelope.data,
            }),
            Status::Success => Ok(Reply {
                notice: None,
                data: envelope.data,
            }),
        }
    }

    async fn call_for<P: Serialize, R: DeserializeOwned>(
        &self,
        action: &str,
        params: &P,
    ) -> Result<R> {
        let reply = self.call(action, params).await?;
        let data = reply
            .data
            .with_context(|| format!("relay reply to `{action}` carried no data"))?;
        serde_json::from_value(data)
            .with_context(|| format!("failed to decode relay reply to `{action}`"))
    }

    pub async fn register(&self, path: &str) -> Result<RegisterResult> {
        self.call_for(
            actions::REGISTER,
            &DocumentParams {
                document_path: Some(path.to_owned()),
            },
        )
        .await
    }

    pub async fn unregister(&self, path: Option<&str>, remove_all: bool) -> Result<Reply> {
        self.call(
            actions::UNREGISTER,
            &UnregisterParams {
                document_path: path.map(ToOwned::to_owned),
                remove_all,
            },
        )
        .await
    }

    pub async fn heartbeat(&self) -> Result<HeartbeatResult> {
        self.call_for(actions::SEND_HEARTBEAT, &serde_json::json!({})).await
    }

    pub async fn send_selection(&self, path: &str, selection: Selection) -> Result<()> {
        self.call(
            actions::SEND_SELECTION_CHANGE,
            &SelectionChangeParams {
                document_path: Some(path.to_owned()),
                selection: Some(SelectionPayload::Structured(selection)),
            },
        )
        .await?;
        Ok(())
    }

    pub async fn peers(&self, path: &str) -> Result<PeerSelections> {
        self.call_for(
            actions::GET_USERS_AND_SELECTIONS_FOR_FILE,
            &DocumentParams {
                document_path: Some(path.to_owned()),
            },
        )
        .await
    }

    pub async fn send_shadow(&self, path: &str, text: &str) -> Result<()> {
        self.call(
            actions::SEND_SHADOW,
            &SendShadowParams {
                document_path: Some(path.to_owned()),
                shadow_text: Some(text.to_owned()),
            },
        )
        .await?;
        Ok(())
    }

    /// One sync round. Returns the relay's patch for the sent shadow.
    pub async fn sync_text(&self, document_hash: &str, patch: &Patch) -> Result<Patch> {
        let result: SyncTextResult = self
            .call_for(
                actions::SYNC_TEXT,
                &SyncTextParams {
                    document_hash: Some(document_hash.to_owned()),
                    patch: Some(patch.to_text()),
                },
            )
            .await?;
        Patch::from_text(&result.patch).context("relay returned an unparseable patch")
    }

    pub async fn reset_selection(&self, path: Option<&str>, reset_all: bool) -> Result<()> {
        self.call(actions::RESET_SELECTION, &reset_params(path, reset_all)).await?;
        Ok(())
    }

    pub async fn reset_file(&self, path: Option<&str>, reset_all: bool) -> Result<()> {
        self.call(actions::RESET_FILE, &reset_params(path, reset_all)).await?;
        Ok(())
    }
}

fn reset_params(path: Option<&str>, reset_all: bool) -> ResetParams {
    ResetParams {
        document_path: path.map(ToOwned::to_owned),
        reset_all,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tandem_common::protocol::Envelope;
    use url::Url;

    use super::{is_retryable, relay_error, RelayClient, RelayError};
    use crate::config::Settings;

    fn client(base: &str) -> RelayClient {
        RelayClient::new(&Settings {
            relay_url: Url::parse(base).expect("url"),
            collaborator: "ada".to_owned(),
        })
        .expect("client")
    }

    #[test]
    fn action_urls_join_onto_base() {
        assert_eq!(
            client("http://relay.test:8080").action_url("syncText").expect("url").as_str(),
            "http://relay.test:8080/v1/actions/syncText"
        );
        assert_eq!(
            client("http://relay.test/tandem/").action_url("register").expect("url").as_str(),
            "http://relay.test/tandem/v1/actions/register"
        );
    }

    #[test]
    fn relay_error_reads_code_and_retryable() {
        let envelope = Envelope {
            data: Some(json!({"code": "LOCK_UNAVAILABLE", "retryable": true})),
            ..Envelope::error("document abc is busy, retry the sync")
        };
        let error = RelayError::from_envelope("syncText", 409, &envelope);
        assert_eq!(error.code.as_deref(), Some("LOCK_UNAVAILABLE"));
        assert!(error.retryable);

        let wrapped = anyhow::anyhow!(error).context("sync round failed");
        assert!(is_retryable(&wrapped));
        assert_eq!(relay_error(&wrapped).map(|e| e.status), Some(409));
    }

    #[test]
    fn bare_error_envelope_is_not_retryable() {
        let error = RelayError::from_envelope("explode", 404, &Envelope::error("Invalid action."));
        assert_eq!(error.code, None);
        assert!(!error.retryable);
        assert_eq!(error.to_string(), "relay rejected `explode` (404): Invalid action.");
    }
}
