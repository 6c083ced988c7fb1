use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".eldercare"))
            .unwrap_or_else(|| PathBuf::from(".eldercare"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base.join("data")
    }

    pub fn default_db_file(&self) -> PathBuf {
        self.data_dir().join("eldercare.db")
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.base.join("audit")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
