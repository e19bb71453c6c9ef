//! §4.9 `file` observer: `exists` mode reports presence as `"true"`/
//! `"false"`; `content` mode reports trimmed content, or the first capture
//! group of a multi-line regex match when a pattern is configured.

use async_trait::async_trait;
use regex::RegexBuilder;

use super::GetObservedValue;
use crate::manifest::FileObserverMode;

pub struct FileObserver {
  pub path: String,
  pub mode: FileObserverMode,
  pub content_pattern: Option<String>,
}

#[async_trait]
impl GetObservedValue for FileObserver {
  async fn get_observed_value(&self) -> anyhow::Result<String> {
    match self.mode {
      FileObserverMode::Exists => {
        Ok(tokio::fs::try_exists(&self.path).await.unwrap_or(false).to_string())
      }
      FileObserverMode::Content => {
        let content = tokio::fs::read_to_string(&self.path).await?;
        match &self.content_pattern {
          Some(pattern) => {
            let re = RegexBuilder::new(pattern)
              .multi_line(true)
              .build()
              .map_err(|e| anyhow::anyhow!("invalid content pattern '{pattern}': {e}"))?;
            let captures = re
              .captures(&content)
              .ok_or_else(|| anyhow::anyhow!("content pattern '{pattern}' did not match"))?;
            Ok(
              captures
                .get(1)
                .or_else(|| captures.get(0))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            )
          }
          None => Ok(content.trim().to_string()),
        }
      }
    }
  }
}
