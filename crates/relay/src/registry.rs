// Which collaborators have which documents open.

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tandem_common::path::DocumentPath;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::locks::DocumentLocks;
use crate::shadow::ShadowStore;
use crate::store::{DocumentRecord, Filter, RecordStore, Stores, WorkingCopies};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// First collaborator; the working copy was seeded from the source file.
    Created { fingerprint: String },
    /// Others already had the document open; `content` is the shared text.
    Joined { fingerprint: String, content: String },
    /// The caller was already the only collaborator.
    AlreadyRegistered { fingerprint: String },
}

impl RegisterOutcome {
    pub fn fingerprint(&self) -> &str {
        match self {
            Self::Created { fingerprint }
            | Self::Joined { fingerprint, .. }
            | Self::AlreadyRegistered { fingerprint } => fingerprint,
        }
    }
}

#[derive(Clone)]
pub struct SessionRegistry {
    documents: Arc<dyn RecordStore<DocumentRecord>>,
    shadows: ShadowStore,
    working_copies: WorkingCopies,
    locks: DocumentLocks,
    workspace_root: PathBuf,
}

impl SessionRegistry {
    pub fn new(
        stores: &Stores,
        shadows: ShadowStore,
        working_copies: WorkingCopies,
        locks: DocumentLocks,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            documents: Arc::clone(&stores.documents),
            shadows,
            working_copies,
            locks,
            workspace_root: workspace_root.into(),
        }
    }

    pub async fn register(
        &self,
        path: &DocumentPath,
        caller: &str,
    ) -> Result<RegisterOutcome, SyncError> {
        self.register_at(path, caller, Utc::now()).await
    }

    pub async fn register_at(
        &self,
        path: &DocumentPath,
        caller: &str,
        now: DateTime<Utc>,
    ) -> Result<RegisterOutcome, SyncError> {
        let fingerprint = path.fingerprint();
        let _guard = self.locks.acquire(&fingerprint).await;

        let Some(mut document) = self.documents.find(&Filter::Key(fingerprint.clone())).await?
        else {
            let source = self.read_source(path).await?;
            self.working_copies.write(&fingerprint, &source).await?;
            self.documents
                .insert(DocumentRecord {
                    fingerprint: fingerprint.clone(),
                    path: path.to_string(),
                    collaborators: vec![caller.to_owned()],
                    created_at: now,
                })
                .await?;
            info!(%fingerprint, path = %path, collaborator = caller, "document opened");
            return Ok(RegisterOutcome::Created { fingerprint });
        };

        let others = document
            .collaborators
            .iter()
            .any(|collaborator| collaborator != caller);
        if !document.has_collaborator(caller) {
            document.collaborators.push(caller.to_owned());
            self.documents.update(document).await?.ok_or_else(|| {
                SyncError::StorageFailure(format!("document {fingerprint} vanished during register"))
            })?;
            info!(%fingerprint, collaborator = caller, "collaborator joined document");
        }

        if !others {
            return Ok(RegisterOutcome::AlreadyRegistered { fingerprint });
        }

        let content = match self.shadows.server_text(&fingerprint).await? {
            Some(text) => text,
            None => self
                .working_copies
                .read(&fingerprint)
                .await?
                .unwrap_or_default(),
        };
        Ok(RegisterOutcome::Joined {
            fingerprint,
            content,
        })
    }

    /// Registers the caller unless it already is. Returns the fingerprint.
    pub async fn ensure_registered(
        &self,
        path: &DocumentPath,
        caller: &str,
    ) -> Result<String, SyncError> {
        let fingerprint = path.fingerprint();
        if self.is_registered(&fingerprint, caller).await? {
            return Ok(fingerprint);
        }
        let outcome = self.register(path, caller).await?;
        Ok(outcome.fingerprint().to_owned())
    }

    /// Removes the caller from a document. Returns `false` when there was
    /// nothing to remove.
    pub async fn unregister(&self, path: &DocumentPath, caller: &str) -> Result<bool, SyncError> {
        self.unregister_fingerprint(&path.fingerprint(), caller).await
    }

    pub async fn unregister_fingerprint(
        &self,
        fingerprint: &str,
        caller: &str,
    ) -> Result<bool, SyncError> {
        let _guard = self.locks.acquire(fingerprint).await;

        let Some(mut document) = self
            .documents
            .find(&Filter::Key(fingerprint.to_owned()))
            .await?
        else {
            return Ok(false);
        };
        if !document.has_collaborator(caller) {
            return Ok(false);
        }

        document.collaborators.retain(|collaborator| collaborator != caller);
        self.shadows.delete_shadow(fingerprint, caller).await?;

        let closed = document.collaborators.is_empty();
        if closed {
            self.documents
                .delete(&Filter::Key(fingerprint.to_owned()))
                .await?;
            self.working_copies.remove(fingerprint).await?;
            self.shadows.delete_server_text(fingerprint).await?;
            self.shadows.delete_shadows(fingerprint).await?;
            info!(fingerprint, collaborator = caller, "document closed");
        } else {
            self.documents.update(document).await?.ok_or_else(|| {
                SyncError::StorageFailure(format!("document {fingerprint} vanished during unregister"))
            })?;
            info!(fingerprint, collaborator = caller, "collaborator left document");
        }

        Ok(true)
    }

    /// Removes the caller from every document it belongs to. Returns the
    /// affected fingerprints.
    pub async fn unregister_all(&self, caller: &str) -> Result<Vec<String>, SyncError> {
        let member = caller.to_owned();
        let mut fingerprints: Vec<String> = self
            .documents
            .find_all(&Filter::matching(move |document: &DocumentRecord| {
                document.has_collaborator(&member)
            }))
            .await?
            .into_iter()
            .map(|document| document.fingerprint)
            .collect();
        fingerprints.sort();

        let mut removed = Vec::with_capacity(fingerprints.len());
        for fingerprint in fingerprints {
            if self.unregister_fingerprint(&fingerprint, caller).await? {
                removed.push(fingerprint);
            }
        }
        Ok(removed)
    }

    pub async fn document(&self, fingerprint: &str) -> Result<Option<DocumentRecord>, SyncError> {
        Ok(self
            .documents
            .find(&Filter::Key(fingerprint.to_owned()))
            .await?)
    }

    /// Collaborators in registration order; empty for unknown documents.
    pub async fn collaborators(&self, fingerprint: &str) -> Result<Vec<String>, SyncError> {
        Ok(self
            .document(fingerprint)
            .await?
            .map(|document| document.collaborators)
            .unwrap_or_default())
    }

    pub async fn is_registered(&self, fingerprint: &str, caller: &str) -> Result<bool, SyncError> {
        Ok(self
            .document(fingerprint)
            .await?
            .is_some_and(|document| document.has_collaborator(caller)))
    }

    pub async fn open_fingerprints(&self) -> Result<HashSet<String>, SyncError> {
        Ok(self
            .documents
            .find_all(&Filter::All)
            .await?
            .into_iter()
            .map(|document| document.fingerprint)
            .collect())
    }

    async fn read_source(&self, path: &DocumentPath) -> Result<String, SyncError> {
        let source_path = self.workspace_root.join(path.as_str());
        match tokio::fs::read(&source_path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %source_path.display(), "source document missing, starting empty");
                Ok(String::new())
            }
            Err(err) => Err(SyncError::WorkingCopy(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tandem_common::path::DocumentPath;

    use super::{RegisterOutcome, SessionRegistry};
    use crate::locks::DocumentLocks;
    use crate::shadow::ShadowStore;
    use crate::store::{Stores, WorkingCopies};

    struct Fixture {
        _workspace: tempfile::TempDir,
        copies: WorkingCopies,
        shadows: ShadowStore,
        locks: DocumentLocks,
        registry: SessionRegistry,
    }

    fn fixture() -> Fixture {
        let workspace = tempfile::tempdir().expect("tempdir");
        std::fs::write(workspace.path().join("notes.md"), "original text").expect("seed file");

        let stores = Stores::in_memory();
        let copies = WorkingCopies::new(workspace.path().join(".copies"));
        let shadows = ShadowStore::new(&stores, copies.clone());
        let locks = DocumentLocks::default();
        let registry = SessionRegistry::new(
            &stores,
            shadows.clone(),
            copies.clone(),
            locks.clone(),
            workspace.path(),
        );
        Fixture {
            _workspace: workspace,
            copies,
            shadows,
            locks,
            registry,
        }
    }

    fn notes() -> DocumentPath {
        DocumentPath::parse("notes.md").expect("valid path")
    }

    #[tokio::test]
    async fn first_register_seeds_working_copy_from_source() {
        let fx = fixture();
        let outcome = fx.registry.register(&notes(), "ada").await.expect("register");
        let fingerprint = notes().fingerprint();

        assert_eq!(outcome, RegisterOutcome::Created { fingerprint: fingerprint.clone() });
        assert_eq!(
            fx.copies.read(&fingerprint).await.expect("read").as_deref(),
            Some("original text")
        );
        assert_eq!(fx.registry.collaborators(&fingerprint).await.expect("list"), vec!["ada"]);
    }

    #[tokio::test]
    async fn joining_returns_shared_content_and_avoids_duplicates() {
        let fx = fixture();
        let fingerprint = notes().fingerprint();
        fx.registry.register(&notes(), "ada").await.expect("register");
        fx.shadows
            .set_server_text(&fingerprint, "merged text".into(), Utc::now())
            .await
            .expect("server text");

        let joined = fx.registry.register(&notes(), "grace").await.expect("register");
        assert_eq!(
            joined,
            RegisterOutcome::Joined {
                fingerprint: fingerprint.clone(),
                content: "merged text".into()
            }
        );

        fx.registry.register(&notes(), "grace").await.expect("re-register");
        assert_eq!(
            fx.registry.collaborators(&fingerprint).await.expect("list"),
            vec!["ada", "grace"]
        );
    }

    #[tokio::test]
    async fn sole_collaborator_re_registering_gets_no_content() {
        let fx = fixture();
        fx.registry.register(&notes(), "ada").await.expect("register");
        let again = fx.registry.register(&notes(), "ada").await.expect("register");
        assert!(matches!(again, RegisterOutcome::AlreadyRegistered { .. }));
    }

    #[tokio::test]
    async fn last_unregister_closes_document() {
        let fx = fixture();
        let fingerprint = notes().fingerprint();
        fx.registry.register(&notes(), "ada").await.expect("register");
        fx.registry.register(&notes(), "grace").await.expect("register");
        fx.shadows
            .set_shadow(&fingerprint, "ada", "shadow".into(), Utc::now())
            .await
            .expect("shadow");

        assert!(fx.registry.unregister(&notes(), "ada").await.expect("unregister"));
        assert_eq!(fx.shadows.shadow(&fingerprint, "ada").await.expect("get"), None);
        assert!(fx.copies.exists(&fingerprint).await.expect("exists"));

        assert!(fx.registry.unregister(&notes(), "grace").await.expect("unregister"));
        assert!(fx.registry.document(&fingerprint).await.expect("get").is_none());
        assert!(!fx.copies.exists(&fingerprint).await.expect("exists"));
        assert_eq!(fx.locks.len(), 0);

        assert!(!fx.registry.unregister(&notes(), "grace").await.expect("idempotent"));
    }

    #[tokio::test]
    async fn missing_source_starts_empty() {
        let fx = fixture();
        let path = DocumentPath::parse("drafts/new.md").expect("valid path");
        fx.registry.register(&path, "ada").await.expect("register");
        assert_eq!(
            fx.copies.read(&path.fingerprint()).await.expect("read").as_deref(),
            Some("")
        );
    }

    #[tokio::test]
    async fn unregister_all_leaves_every_document() {
        let fx = fixture();
        let other = DocumentPath::parse("other.md").expect("valid path");
        fx.registry.register(&notes(), "ada").await.expect("register");
        fx.registry.register(&other, "ada").await.expect("register");
        fx.registry.register(&other, "grace").await.expect("register");

        let mut expected = vec![notes().fingerprint(), other.fingerprint()];
        expected.sort();
        assert_eq!(fx.registry.unregister_all("ada").await.expect("unregister all"), expected);
        assert_eq!(
            fx.registry.collaborators(&other.fingerprint()).await.expect("list"),
            vec!["grace"]
        );
        assert!(fx.registry.unregister_all("ada").await.expect("no-op").is_empty());
    }

    #[tokio::test]
    async fn ensure_registered_registers_implicitly() {
        let fx = fixture();
        let fingerprint = fx.registry.ensure_registered(&notes(), "ada").await.expect("ensure");
        assert!(fx.registry.is_registered(&fingerprint, "ada").await.expect("check"));
        let again = fx.registry.ensure_registered(&notes(), "ada").await.expect("ensure");
        assert_eq!(again, fingerprint);
    }
}
