use std::path::PathBuf;

pub const ARCHIVE_FILE: &str = "conversations.json";
pub const SECRETS_FILE: &str = "secrets.toml";
pub const STORE_FILE: &str = "embeddings.db";

/// Locations of everything the tool reads or writes
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
    pub archive: PathBuf,
    pub secrets: PathBuf,
    pub store: PathBuf,
}

impl DataPaths {
    pub fn from_root(root: PathBuf) -> Self {
        Self {
            archive: root.join(ARCHIVE_FILE),
            secrets: root.join(SECRETS_FILE),
            store: root.join(STORE_FILE),
            root,
        }
    }

    pub fn with_archive(mut self, archive: Option<PathBuf>) -> Self {
        if let Some(path) = archive {
            self.archive = path;
        }
        self
    }

    pub fn with_secrets(mut self, secrets: Option<PathBuf>) -> Self {
        if let Some(path) = secrets {
            self.secrets = path;
        }
        self
    }

    pub fn with_store(mut self, store: Option<PathBuf>) -> Self {
        if let Some(path) = store {
            self.store = path;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let paths = DataPaths::from_root(PathBuf::from("data"))
            .with_store(Some(PathBuf::from("/tmp/vectors.db")))
            .with_archive(None);
        assert_eq!(paths.archive, PathBuf::from("data/conversations.json"));
        assert_eq!(paths.secrets, PathBuf::from("data/secrets.toml"));
        assert_eq!(paths.store, PathBuf::from("/tmp/vectors.db"));
    }
}
