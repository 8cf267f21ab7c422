//! Kubeconfig credentials and their resolution to cluster connections
//!
//! Credentials live in a YAML store scoped by owner. Resolution never logs
//! or persists kubeconfig content.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConnectionError;

/// Identity a credential lookup is performed as
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Trusted system identity; sees every credential
    System,
    /// A named user; sees credentials listing them as an owner
    User(String),
}

/// Kubeconfig text, redacted from debug output
#[derive(Clone, PartialEq, Eq)]
pub struct KubeconfigContent(String);

impl KubeconfigContent {
    pub fn new(content: impl Into<String>) -> Self {
        Self(content.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for KubeconfigContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KubeconfigContent(<redacted>)")
    }
}

/// Where a cluster client gets its configuration from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterConnection {
    /// In-cluster service account or the default kubeconfig
    Ambient,
    /// Explicit kubeconfig from the credential store
    Kubeconfig(KubeconfigContent),
}

/// Kubeconfig source as stored: `{inline: ...}` or `{path: ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KubeconfigSource {
    Inline { inline: String },
    Path { path: PathBuf },
}

/// A stored kubeconfig credential
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeconfigCredential {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Owners allowed to use this credential. Empty means everyone.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<String>,

    pub kubeconfig: KubeconfigSource,
}

impl KubeconfigCredential {
    pub fn inline(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            owners: Vec::new(),
            kubeconfig: KubeconfigSource::Inline {
                inline: content.into(),
            },
        }
    }

    pub fn from_path(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            description: None,
            owners: Vec::new(),
            kubeconfig: KubeconfigSource::Path { path: path.into() },
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owners.push(owner.into());
        self
    }

    /// Whether `principal` may use this credential on behalf of `owner`
    pub fn visible_to(&self, owner: &str, principal: &Principal) -> bool {
        let owned = self.owners.is_empty() || self.owners.iter().any(|o| o == owner);
        match principal {
            Principal::System => owned,
            Principal::User(user) => owned && self.owners.iter().any(|o| o == user),
        }
    }

    /// The kubeconfig text, reading path-based credentials from disk
    pub fn content(&self) -> Result<KubeconfigContent, ConnectionError> {
        match &self.kubeconfig {
            KubeconfigSource::Inline { inline: content } => Ok(KubeconfigContent::new(content.clone())),
            KubeconfigSource::Path { path } => std::fs::read_to_string(path)
                .map(KubeconfigContent::new)
                .map_err(|e| {
                    ConnectionError::Store(format!(
                        "cannot read kubeconfig for credential '{}' from {}: {}",
                        self.id,
                        path.display(),
                        e
                    ))
                }),
        }
    }
}

impl std::fmt::Debug for KubeconfigCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.kubeconfig {
            KubeconfigSource::Inline { .. } => "inline".to_string(),
            KubeconfigSource::Path { path } => path.display().to_string(),
        };
        f.debug_struct("KubeconfigCredential")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("owners", &self.owners)
            .field("kubeconfig", &source)
            .finish()
    }
}

/// Pick the first credential with the given id, in store order
pub fn first_with_id<'a>(
    credentials: &'a [KubeconfigCredential],
    id: &str,
) -> Option<&'a KubeconfigCredential> {
    credentials.iter().find(|c| c.id == id)
}

/// Source of kubeconfig credentials
pub trait CredentialStore: Send + Sync {
    /// Credentials visible to `principal` for `owner`, in stable store order
    fn lookup(
        &self,
        owner: &str,
        principal: &Principal,
    ) -> Result<Vec<KubeconfigCredential>, ConnectionError>;
}

/// Credential store persisted as YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileCredentialStore {
    #[serde(default)]
    credentials: Vec<KubeconfigCredential>,
}

impl FileCredentialStore {
    pub fn new(credentials: Vec<KubeconfigCredential>) -> Self {
        Self { credentials }
    }

    /// Load `path`, or an empty store if there is no such file
    pub fn load_or_default(path: &Path) -> Result<Self, ConnectionError> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConnectionError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConnectionError::Store(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            ConnectionError::Store(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Save with owner-only permissions on Unix
    pub fn save_to(&self, path: &Path) -> Result<(), ConnectionError> {
        let store_err =
            |e: std::io::Error| ConnectionError::Store(format!("cannot write {}: {}", path.display(), e));

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(store_err)?;
        }
        let content =
            serde_yaml::to_string(self).map_err(|e| ConnectionError::Store(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            use std::os::unix::fs::PermissionsExt;
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true).mode(0o600);
            let mut file = options.open(path).map_err(store_err)?;
            std::io::Write::write_all(&mut file, content.as_bytes()).map_err(store_err)?;
            // mode() only applies to newly created files
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(store_err)
        }

        #[cfg(not(unix))]
        {
            std::fs::write(path, content).map_err(store_err)
        }
    }

    pub fn default_path() -> Result<PathBuf, ConnectionError> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            ConnectionError::Store("could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("berth").join("credentials.yaml"))
    }

    pub fn credentials(&self) -> &[KubeconfigCredential] {
        &self.credentials
    }

    /// Add a credential, replacing any with the same id in place
    pub fn set(&mut self, credential: KubeconfigCredential) {
        match self.credentials.iter_mut().find(|c| c.id == credential.id) {
            Some(existing) => *existing = credential,
            None => self.credentials.push(credential),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<KubeconfigCredential> {
        let index = self.credentials.iter().position(|c| c.id == id)?;
        Some(self.credentials.remove(index))
    }
}

impl CredentialStore for FileCredentialStore {
    fn lookup(
        &self,
        owner: &str,
        principal: &Principal,
    ) -> Result<Vec<KubeconfigCredential>, ConnectionError> {
        Ok(self
            .credentials
            .iter()
            .filter(|c| c.visible_to(owner, principal))
            .cloned()
            .collect())
    }
}

/// Credential store file that is read again on every lookup
#[derive(Debug, Clone, Default)]
pub struct CredentialFile {
    path: Option<PathBuf>,
}

impl CredentialFile {
    /// `None` means the default location under the user config directory
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Result<PathBuf, ConnectionError> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => FileCredentialStore::default_path(),
        }
    }

    pub fn load(&self) -> Result<FileCredentialStore, ConnectionError> {
        FileCredentialStore::load_or_default(&self.path()?)
    }
}

impl CredentialStore for CredentialFile {
    fn lookup(
        &self,
        owner: &str,
        principal: &Principal,
    ) -> Result<Vec<KubeconfigCredential>, ConnectionError> {
        self.load()?.lookup(owner, principal)
    }
}

/// Turns a credential reference into connection material
pub trait CredentialResolver: Send + Sync {
    fn resolve(
        &self,
        id: Option<&str>,
        owner: &str,
        principal: &Principal,
    ) -> Result<ClusterConnection, ConnectionError>;
}

/// Resolver backed by a [`CredentialStore`]
#[derive(Debug, Clone)]
pub struct StoreCredentialResolver<S> {
    store: S,
}

impl<S: CredentialStore> StoreCredentialResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: CredentialStore> CredentialResolver for StoreCredentialResolver<S> {
    fn resolve(
        &self,
        id: Option<&str>,
        owner: &str,
        principal: &Principal,
    ) -> Result<ClusterConnection, ConnectionError> {
        let Some(id) = id.map(str::trim).filter(|id| !id.is_empty()) else {
            tracing::debug!("no credential id, using ambient cluster configuration");
            return Ok(ClusterConnection::Ambient);
        };

        let visible = self.store.lookup(owner, principal)?;
        let credential =
            first_with_id(&visible, id).ok_or_else(|| ConnectionError::CredentialNotFound {
                id: id.to_string(),
            })?;

        tracing::debug!(credential = %credential.id, "resolved kubeconfig credential");
        Ok(ClusterConnection::Kubeconfig(credential.content()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> FileCredentialStore {
        FileCredentialStore::new(vec![
            KubeconfigCredential::inline("prod", "first").with_owner("team-a"),
            KubeconfigCredential::inline("prod", "second"),
            KubeconfigCredential::inline("staging", "staging-config").with_owner("team-b"),
        ])
    }

    #[test]
    fn test_blank_id_is_ambient() {
        let resolver = StoreCredentialResolver::new(store());

        for id in [None, Some(""), Some("  ")] {
            let connection = resolver.resolve(id, "team-a", &Principal::System).unwrap();
            assert_eq!(connection, ClusterConnection::Ambient);
        }
    }

    #[test]
    fn test_first_matching_credential_wins() {
        let resolver = StoreCredentialResolver::new(store());

        let connection = resolver
            .resolve(Some("prod"), "team-a", &Principal::System)
            .unwrap();
        assert_eq!(
            connection,
            ClusterConnection::Kubeconfig(KubeconfigContent::new("first"))
        );
    }

    #[test]
    fn test_owner_scoping() {
        let resolver = StoreCredentialResolver::new(store());

        // staging belongs to team-b only
        let err = resolver
            .resolve(Some("staging"), "team-a", &Principal::System)
            .unwrap_err();
        assert!(matches!(err, ConnectionError::CredentialNotFound { ref id } if id == "staging"));

        // unowned entries are visible to any owner
        let connection = resolver
            .resolve(Some("prod"), "team-c", &Principal::System)
            .unwrap();
        assert_eq!(
            connection,
            ClusterConnection::Kubeconfig(KubeconfigContent::new("second"))
        );
    }

    #[test]
    fn test_user_principal_needs_ownership() {
        let resolver = StoreCredentialResolver::new(store());

        let connection = resolver
            .resolve(Some("prod"), "team-a", &Principal::User("team-a".to_string()))
            .unwrap();
        assert_eq!(
            connection,
            ClusterConnection::Kubeconfig(KubeconfigContent::new("first"))
        );

        let err = resolver
            .resolve(Some("staging"), "team-b", &Principal::User("mallory".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConnectionError::CredentialNotFound { .. }));
    }

    #[test]
    fn test_path_credential_is_read_at_resolution() {
        let dir = TempDir::new().unwrap();
        let kubeconfig = dir.path().join("config");
        std::fs::write(&kubeconfig, "apiVersion: v1\nkind: Config\n").unwrap();

        let resolver = StoreCredentialResolver::new(FileCredentialStore::new(vec![
            KubeconfigCredential::from_path("local", &kubeconfig),
        ]));

        match resolver.resolve(Some("local"), "any", &Principal::System).unwrap() {
            ClusterConnection::Kubeconfig(content) => {
                assert!(content.expose().contains("kind: Config"))
            }
            other => panic!("unexpected connection: {other:?}"),
        }

        std::fs::remove_file(&kubeconfig).unwrap();
        let err = resolver
            .resolve(Some("local"), "any", &Principal::System)
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Store(_)));
    }

    #[test]
    fn test_debug_output_redacts_content() {
        let credential = KubeconfigCredential::inline("prod", "token: hunter2");
        let connection = ClusterConnection::Kubeconfig(KubeconfigContent::new("token: hunter2"));

        assert!(!format!("{credential:?}").contains("hunter2"));
        assert!(!format!("{connection:?}").contains("hunter2"));
    }

    #[test]
    fn test_store_yaml_format() {
        let yaml = r#"
credentials:
  - id: prod
    description: Production cluster
    owners: [team-a]
    kubeconfig:
      inline: "apiVersion: v1"
  - id: local
    kubeconfig:
      path: /home/ci/.kube/config
"#;
        let store: FileCredentialStore = serde_yaml::from_str(yaml).unwrap();
        let credentials = store.credentials();

        assert_eq!(credentials.len(), 2);
        assert_eq!(credentials[0].owners, vec!["team-a"]);
        assert_eq!(
            credentials[0].kubeconfig,
            KubeconfigSource::Inline {
                inline: "apiVersion: v1".to_string()
            }
        );
        assert_eq!(
            credentials[1].kubeconfig,
            KubeconfigSource::Path {
                path: PathBuf::from("/home/ci/.kube/config")
            }
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("berth").join("credentials.yaml");

        let mut store = store();
        store.set(KubeconfigCredential::inline("staging", "replaced"));
        assert_eq!(store.credentials().len(), 3);
        store.save_to(&path).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let mut loaded = FileCredentialStore::load_from(&path).unwrap();
        assert_eq!(loaded.credentials(), store.credentials());
        assert!(loaded.remove("staging").is_some());
        assert!(loaded.remove("staging").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_save_tightens_existing_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.yaml");
        std::fs::write(&path, "credentials: []\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        store().save_to(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_credential_file_reads_lazily() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.yaml");
        std::fs::write(&path, "credentials: [not: {valid").unwrap();

        // Constructing the resolver never touches the file
        let resolver = StoreCredentialResolver::new(CredentialFile::new(Some(path.clone())));
        assert_eq!(
            resolver.resolve(None, "team-a", &Principal::System).unwrap(),
            ClusterConnection::Ambient
        );
        assert!(matches!(
            resolver.resolve(Some("prod"), "team-a", &Principal::System),
            Err(ConnectionError::Store(_))
        ));

        store().save_to(&path).unwrap();
        let connection = resolver
            .resolve(Some("staging"), "team-b", &Principal::System)
            .unwrap();
        assert_eq!(
            connection,
            ClusterConnection::Kubeconfig(KubeconfigContent::new("staging-config"))
        );
    }

    #[test]
    fn test_missing_credential_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let file = CredentialFile::new(Some(dir.path().join("absent.yaml")));

        assert!(file.load().unwrap().credentials().is_empty());
        assert!(matches!(
            StoreCredentialResolver::new(file).resolve(Some("prod"), "team-a", &Principal::System),
            Err(ConnectionError::CredentialNotFound { .. })
        ));
    }
}
