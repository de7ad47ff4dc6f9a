use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from("document"));
    name.push(suffix);
    path.with_file_name(name)
}

/// Writes the content to a sibling temp file and renames it over `path`,
/// keeping the previous version as `<name>.bak` (`config.json` -> `config.json.bak`).
pub async fn write_with_backup(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(parent, e))?;
    }

    match fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => {
            fs::copy(path, sibling(path, ".bak"))
                .await
                .map_err(|e| Error::io(path, e))?;
        }
        _ => {}
    }

    let tmp = sibling(path, ".tmp");
    fs::write(&tmp, content)
        .await
        .map_err(|e| Error::io(&tmp, e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::io(path, e))
}

/// `Ok(None)` when the file does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })
}

pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    write_with_backup(path, &content).await
}

/// Trait for configuration handling.
pub trait Config {
    type ConfigType: Serialize + DeserializeOwned + Send + Sync;

    async fn load_config(path: &Path) -> Result<Self::ConfigType> {
        read_json(path).await?.ok_or_else(|| Error::NotFound {
            what: "config file",
            path: path.to_path_buf(),
        })
    }

    async fn save_config(path: &Path, config: &Self::ConfigType) -> Result<()> {
        write_json(path, config).await
    }

    async fn load_config_or_default<F: FnOnce() -> Self::ConfigType + Send>(
        path: &Path,
        default: F,
    ) -> Result<Self::ConfigType> {
        match Self::load_config(path).await {
            Err(Error::NotFound { .. }) => {
                let config = default();
                Self::save_config(path, &config).await?;
                Ok(config)
            }
            loaded => loaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let value: Option<Value> = read_json(&dir.path().join("absent.json")).await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn write_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        write_json(&path, &json!({ "v": 1 })).await.unwrap();
        write_json(&path, &json!({ "v": 2 })).await.unwrap();

        let current: Value = read_json(&path).await.unwrap().unwrap();
        assert_eq!(current["v"], 2);
        let backup: Value = read_json(&dir.path().join("config.json.bak"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(backup["v"], 1);
        assert!(!dir.path().join("config.bak").exists());
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[tokio::test]
    async fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = read_json::<Value>(&path).await.unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    struct Settings;

    impl Config for Settings {
        type ConfigType = Value;
    }

    #[tokio::test]
    async fn load_or_default_writes_default_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");

        let created = Settings::load_config_or_default(&path, || json!({ "v": 1 }))
            .await
            .unwrap();
        assert_eq!(created["v"], 1);

        let loaded = Settings::load_config_or_default(&path, || json!({ "v": 2 }))
            .await
            .unwrap();
        assert_eq!(loaded["v"], 1);

        std::fs::write(&path, "{").unwrap();
        let err = Settings::load_config_or_default(&path, || json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
