use async_trait::async_trait;
use std::path::PathBuf;

use crate::Result;
use crate::legacy::models::LegacyExport;

/// Where legacy vote documents come from
#[async_trait]
pub trait LegacyVoteSource: Send + Sync {
    fn describe(&self) -> String;

    async fn load(&self) -> Result<LegacyExport>;
}

/// A JSON export on disk
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LegacyVoteSource for JsonFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<LegacyExport> {
        let json_content = tokio::fs::read_to_string(&self.path).await?;
        let export: LegacyExport = serde_json::from_str(&json_content)?;
        Ok(export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RepairCliError;

    #[tokio::test]
    async fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("legacy-votes-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            r#"{"format_version": "1.0.0", "votes": [
                {"user_id": "judge-1", "presentation_id": "6f0c2a5e-2b1d-4c44-9a53-8c7d0e3f1a10", "role": "judge"}
            ]}"#,
        )
        .await
        .unwrap();

        let export = JsonFileSource::new(&path).load().await.unwrap();
        assert_eq!(export.votes.len(), 1);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file() {
        let source = JsonFileSource::new("/nonexistent/legacy.json");
        assert!(matches!(source.load().await, Err(RepairCliError::IoError(_))));
    }
}
