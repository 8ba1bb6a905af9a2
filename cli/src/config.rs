use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

/// Coach endpoint settings, resolved from the environment.
///
/// `WATERBAR_COACH_KEY` (or `OPENAI_API_KEY`) selects the key;
/// `WATERBAR_COACH_URL` and `WATERBAR_COACH_MODEL` override the defaults.
pub struct CoachSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

impl CoachSettings {
    /// Returns `None` when no key is configured; callers then fall back to
    /// the built-in plan.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("WATERBAR_COACH_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        let base_url = std::env::var("WATERBAR_COACH_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = std::env::var("WATERBAR_COACH_MODEL")
            .unwrap_or_else(|_| "gpt-3.5-turbo".to_string());
        Some(Self {
            base_url,
            model,
            api_key,
        })
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "waterbar").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("waterbar.db");

        Ok(Config { db_path, data_dir })
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Generated new API key: {key}");
        eprintln!("Include in requests: Authorization: Bearer {key}");
        Ok((key, true))
    }

    /// The profile used when `--profile` is not given.
    #[must_use]
    pub fn default_profile_id(&self) -> String {
        let path = self.data_dir.join("profile_id");
        if let Ok(id) = std::fs::read_to_string(&path) {
            let id = id.trim().to_string();
            if !id.is_empty() {
                return id;
            }
        }
        "default".to_string()
    }

    pub fn set_default_profile_id(&self, id: &str) -> Result<()> {
        let path = self.data_dir.join("profile_id");
        std::fs::write(&path, id).context("Failed to write profile id file")?;
        Ok(())
    }
}
