//! C3 — Registry Access Probe.
//!
//! Classifies a `(host, namespace, repo)` as public / auth-required /
//! unknown using the Docker Registry v2 bearer-token flow, with a token
//! verification step (§4.3). Timeouts, connection failures, and any other
//! exception map to `Unknown` — the probe never throws out.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::image_ref::DOCKER_HUB_HOST;

#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessClassification {
  Public,
  AuthRequired,
  Unknown,
}

#[derive(Debug, Clone, Default)]
pub struct RegistryCredentials {
  pub username: String,
  pub password: String,
}

struct BearerChallenge {
  realm: String,
  service: Option<String>,
}

fn v2_host(host: &str) -> String {
  if host == DOCKER_HUB_HOST {
    "registry-1.docker.io".to_string()
  } else {
    host.to_string()
  }
}

fn parse_www_authenticate(header: &str) -> Option<BearerChallenge> {
  let rest = header.strip_prefix("Bearer ")?;
  let mut realm = None;
  let mut service = None;
  for part in rest.split(',') {
    let part = part.trim();
    if let Some(v) = part.strip_prefix("realm=") {
      realm = Some(v.trim_matches('"').to_string());
    } else if let Some(v) = part.strip_prefix("service=") {
      service = Some(v.trim_matches('"').to_string());
    }
  }
  Some(BearerChallenge { realm: realm?, service })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  token: Option<String>,
  access_token: Option<String>,
}

/// Runs the full classification flow. Never returns `Err` to the caller —
/// every failure path collapses to `Unknown` per §4.3.
#[instrument("CheckAccess", skip_all, fields(host = %host, repo = %format!("{namespace}/{repo}")))]
pub async fn check_access(
  client: &reqwest::Client,
  host: &str,
  namespace: &str,
  repo: &str,
  credentials: Option<&RegistryCredentials>,
) -> AccessClassification {
  let base = format!("https://{}", v2_host(host));
  match check_access_inner(client, &base, namespace, repo, credentials).await {
    Ok(classification) => {
      info!("registry access for '{namespace}/{repo}' on '{host}' classified {classification:?}");
      classification
    }
    Err(e) => {
      warn!("registry probe for '{namespace}/{repo}' on '{host}' failed, classifying Unknown: {e}");
      AccessClassification::Unknown
    }
  }
}

async fn check_access_inner(
  client: &reqwest::Client,
  base: &str,
  namespace: &str,
  repo: &str,
  credentials: Option<&RegistryCredentials>,
) -> reqwest::Result<AccessClassification> {
  // 1-2. GET /v2/
  debug!("probing {base}/v2/");
  let resp = client
    .get(format!("{base}/v2/"))
    .timeout(Duration::from_secs(10))
    .send()
    .await?;
  if resp.status() == StatusCode::OK {
    return Ok(AccessClassification::Public);
  }
  if resp.status() != StatusCode::UNAUTHORIZED {
    return Ok(AccessClassification::Unknown);
  }

  // 3. Parse WWW-Authenticate.
  let challenge = resp
    .headers()
    .get(reqwest::header::WWW_AUTHENTICATE)
    .and_then(|v| v.to_str().ok())
    .and_then(parse_www_authenticate);
  let Some(challenge) = challenge else {
    return Ok(AccessClassification::Unknown);
  };

  // 4. GET {realm}?service=...&scope=repository:{ns}/{repo}:pull
  debug!("fetching bearer token from realm '{}'", challenge.realm);
  let mut req = client.get(&challenge.realm).timeout(Duration::from_secs(10)).query(&[
    ("service", challenge.service.as_deref().unwrap_or_default()),
    ("scope", &format!("repository:{namespace}/{repo}:pull")),
  ]);
  if let Some(creds) = credentials {
    req = req.basic_auth(&creds.username, Some(&creds.password));
  }
  let token_resp = req.send().await?;
  if !token_resp.status().is_success() {
    return Ok(AccessClassification::AuthRequired);
  }

  // 5. Extract token.
  let body: TokenResponse = match token_resp.json().await {
    Ok(b) => b,
    Err(_) => return Ok(AccessClassification::Unknown),
  };
  let Some(token) = body.token.or(body.access_token) else {
    return Ok(AccessClassification::Unknown);
  };

  // 6. Verify against tags/list.
  debug!("verifying token against {base}/v2/{namespace}/{repo}/tags/list");
  let verify = client
    .get(format!("{base}/v2/{namespace}/{repo}/tags/list"))
    .query(&[("n", "1")])
    .bearer_auth(&token)
    .timeout(Duration::from_secs(10))
    .send()
    .await?;

  if verify.status().is_success() {
    Ok(AccessClassification::Public)
  } else {
    Ok(AccessClassification::AuthRequired)
  }
}

#[cfg(test)]
async fn check_access_at(
  client: &reqwest::Client,
  base: &str,
  namespace: &str,
  repo: &str,
) -> AccessClassification {
  match check_access_inner(client, base, namespace, repo, None).await {
    Ok(classification) => classification,
    Err(_) => AccessClassification::Unknown,
  }
}
