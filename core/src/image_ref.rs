//! C2 — Image Reference Parser.
//!
//! Splits an image string into `(host, namespace, repository, tag, digest)`,
//! normalises Docker Hub host aliases, and groups references sharing a
//! `(host, namespace)` pair into a "registry area" (§4.2).

use serde::{Deserialize, Serialize};
use typeshare::typeshare;

pub const DOCKER_HUB_HOST: &str = "docker.io";
const DOCKER_HUB_ALIASES: &[&str] = &[
  "docker.io",
  "index.docker.io",
  "registry-1.docker.io",
  "registry.hub.docker.com",
];

#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
  pub host: String,
  pub namespace: String,
  pub repository: String,
  pub tag: Option<String>,
  pub digest: Option<String>,
}

fn normalize_host(host: &str) -> String {
  if DOCKER_HUB_ALIASES.contains(&host) {
    DOCKER_HUB_HOST.to_string()
  } else {
    host.to_string()
  }
}

fn looks_like_host(segment: &str) -> bool {
  segment.contains('.') || segment.contains(':')
}

/// Parses `[host[:port]/](namespace/)*repository[:tag][@digest]`.
pub fn parse_image_reference(image: &str) -> ImageReference {
  // 1. Strip everything from `@` onward into `digest`.
  let (rest, digest) = match image.split_once('@') {
    Some((rest, digest)) => (rest, Some(digest.to_string())),
    None => (image, None),
  };

  // 2. Find the last `:` strictly after the last `/`; split off `tag`.
  let last_slash = rest.rfind('/');
  let (rest, tag) = match rest.rfind(':') {
    Some(colon_idx)
      if last_slash.map(|s| colon_idx > s).unwrap_or(true)
        && colon_idx + 1 < rest.len() =>
    {
      (&rest[..colon_idx], Some(rest[colon_idx + 1..].to_string()))
    }
    _ => (rest, None),
  };

  // 3. Split remainder on `/`.
  let segments: Vec<&str> = rest.split('/').collect();
  let (host, namespace, repository) = match segments.len() {
    1 => (DOCKER_HUB_HOST.to_string(), "library".to_string(), segments[0].to_string()),
    2 => {
      if looks_like_host(segments[0]) {
        (normalize_host(segments[0]), "library".to_string(), segments[1].to_string())
      } else {
        (DOCKER_HUB_HOST.to_string(), segments[0].to_string(), segments[1].to_string())
      }
    }
    _ => {
      if looks_like_host(segments[0]) {
        let ns = segments[1..segments.len() - 1].join("/");
        (
          normalize_host(segments[0]),
          ns,
          segments[segments.len() - 1].to_string(),
        )
      } else {
        let ns = segments[..segments.len() - 1].join("/");
        (
          DOCKER_HUB_HOST.to_string(),
          ns,
          segments[segments.len() - 1].to_string(),
        )
      }
    }
  };

  ImageReference {
    host,
    namespace,
    repository,
    tag,
    digest,
  }
}

/// A `(host, namespace)` grouping, used for credential assignment (§4.2).
#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryArea {
  pub host: String,
  pub namespace: String,
  pub suggested_glob: String,
  pub is_likely_public: bool,
}

impl RegistryArea {
  fn from_reference(r: &ImageReference) -> Self {
    let is_docker_hub = r.host == DOCKER_HUB_HOST;
    let suggested_glob = if is_docker_hub {
      format!("{}/*", r.namespace)
    } else {
      format!("{}/{}/*", r.host, r.namespace)
    };
    RegistryArea {
      host: r.host.clone(),
      namespace: r.namespace.clone(),
      suggested_glob,
      is_likely_public: is_docker_hub && r.namespace == "library",
    }
  }
}

/// Groups image references by equal `(host, namespace)` pairs.
pub fn group_by_registry_area(
  images: &[ImageReference],
) -> Vec<RegistryArea> {
  let mut areas: Vec<RegistryArea> = Vec::new();
  for image in images {
    let area = RegistryArea::from_reference(image);
    if !areas
      .iter()
      .any(|a| a.host == area.host && a.namespace == area.namespace)
    {
      areas.push(area);
    }
  }
  areas
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn canonical_nginx_forms() {
    for input in [
      "docker.io/library/nginx:latest",
      "nginx",
      "nginx:latest",
    ] {
      let r = parse_image_reference(input);
      assert_eq!(r.host, "docker.io", "input: {input}");
      assert_eq!(r.namespace, "library", "input: {input}");
      assert_eq!(r.repository, "nginx", "input: {input}");
    }
  }

  #[test]
  fn ghcr_two_segment() {
    let r = parse_image_reference("ghcr.io/org/x");
    assert_eq!(r.host, "ghcr.io");
    assert_eq!(r.namespace, "org");
    assert_eq!(r.repository, "x");
    assert_eq!(r.tag, None);
  }

  #[test]
  fn localhost_with_port_and_tag() {
    let r = parse_image_reference("localhost:5000/img:v1");
    assert_eq!(r.host, "localhost:5000");
    assert_eq!(r.namespace, "library");
    assert_eq!(r.repository, "img");
    assert_eq!(r.tag.as_deref(), Some("v1"));
  }

  #[test]
  fn docker_hub_user_namespace() {
    let r = parse_image_reference("user/img");
    assert_eq!(r.host, "docker.io");
    assert_eq!(r.namespace, "user");
    assert_eq!(r.repository, "img");
    assert_eq!(r.tag, None);
  }

  #[test]
  fn digest_is_stripped_before_tag_parsing() {
    let r = parse_image_reference(
      "ghcr.io/org/x@sha256:abcdef1234567890",
    );
    assert_eq!(r.digest.as_deref(), Some("sha256:abcdef1234567890"));
    assert_eq!(r.repository, "x");
    assert_eq!(r.tag, None);
  }

  #[test]
  fn nested_namespace_on_private_host() {
    let r = parse_image_reference("registry.example.com/a/b/c:v2");
    assert_eq!(r.host, "registry.example.com");
    assert_eq!(r.namespace, "a/b");
    assert_eq!(r.repository, "c");
    assert_eq!(r.tag.as_deref(), Some("v2"));
  }

  #[test]
  fn docker_hub_aliases_normalise() {
    let r = parse_image_reference("index.docker.io/library/redis:7");
    assert_eq!(r.host, "docker.io");
  }

  #[test]
  fn registry_area_grouping_and_public_guess() {
    let images = vec![
      parse_image_reference("nginx"),
      parse_image_reference("redis:7"),
      parse_image_reference("user/img"),
      parse_image_reference("ghcr.io/org/x"),
    ];
    let areas = group_by_registry_area(&images);
    assert_eq!(areas.len(), 3);
    let hub_library = areas
      .iter()
      .find(|a| a.host == "docker.io" && a.namespace == "library")
      .unwrap();
    assert!(hub_library.is_likely_public);
    assert_eq!(hub_library.suggested_glob, "library/*");
    let ghcr = areas.iter().find(|a| a.host == "ghcr.io").unwrap();
    assert!(!ghcr.is_likely_public);
    assert_eq!(ghcr.suggested_glob, "ghcr.io/org/*");
  }
}
