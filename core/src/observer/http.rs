//! §4.9 `http` observer: issues the configured request within its timeout;
//! extracts via JSONPath when configured, otherwise uses the raw body.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;

use super::GetObservedValue;

pub struct HttpObserver<'a> {
  pub client: &'a reqwest::Client,
  pub url: String,
  pub method: String,
  pub headers: BTreeMap<String, String>,
  pub timeout: Duration,
  pub json_path: Option<String>,
}

#[async_trait]
impl GetObservedValue for HttpObserver<'_> {
  async fn get_observed_value(&self) -> anyhow::Result<String> {
    let method = Method::from_bytes(self.method.to_uppercase().as_bytes())
      .map_err(|_| anyhow::anyhow!("invalid HTTP method '{}'", self.method))?;
    let mut request = self.client.request(method, &self.url).timeout(self.timeout);
    for (name, value) in &self.headers {
      request = request.header(name, value);
    }
    let response = request.send().await?.error_for_status()?;
    let body = response.text().await?;

    let Some(path) = &self.json_path else {
      return Ok(body);
    };
    extract_json_path(&body, path)
  }
}

fn extract_json_path(body: &str, path: &str) -> anyhow::Result<String> {
  let value: serde_json::Value = serde_json::from_str(body)?;
  let matches = jsonpath_lib::select(&value, path)
    .map_err(|e| anyhow::anyhow!("invalid JSONPath '{path}': {e}"))?;
  let first = matches
    .first()
    .ok_or_else(|| anyhow::anyhow!("JSONPath '{path}' matched nothing"))?;
  Ok(match first {
    serde_json::Value::String(s) => s.clone(),
    other => other.to_string(),
  })
}
