//! Opaque 128-bit identifiers, strongly distinguished by entity type.
//!
//! Each id is a newtype over [`uuid::Uuid`] so a `DeploymentId` can never be
//! passed where an `EnvironmentId` is expected, even though both are plain
//! UUIDs underneath.

use std::fmt;

use serde::{Deserialize, Serialize};
use typeshare::typeshare;
use uuid::Uuid;

macro_rules! opaque_id {
  ($name:ident) => {
    #[typeshare]
    #[derive(
      Debug,
      Clone,
      Copy,
      PartialEq,
      Eq,
      PartialOrd,
      Ord,
      Hash,
      Serialize,
      Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(pub Uuid);

    impl $name {
      pub fn new() -> Self {
        Self(Uuid::new_v4())
      }
    }

    impl Default for $name {
      fn default() -> Self {
        Self::new()
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
      }
    }

    impl From<Uuid> for $name {
      fn from(id: Uuid) -> Self {
        Self(id)
      }
    }
  };
}

opaque_id!(DeploymentId);
opaque_id!(EnvironmentId);
opaque_id!(OrganizationId);
opaque_id!(StackId);
opaque_id!(UserId);
opaque_id!(HealthSnapshotId);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ids_are_distinct_types_but_same_repr() {
    let d = DeploymentId::new();
    let e = EnvironmentId::new();
    // Different newtypes, but both wrap a Uuid of the same shape.
    assert_ne!(d.0, Uuid::nil());
    assert_ne!(e.0, Uuid::nil());
  }

  #[test]
  fn display_matches_inner_uuid() {
    let u = Uuid::new_v4();
    let id = DeploymentId::from(u);
    assert_eq!(id.to_string(), u.to_string());
  }
}
