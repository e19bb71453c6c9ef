//! §4.9 `sqlExtendedProperty` observer: opens a connection, reads one
//! named extended property.

use async_trait::async_trait;

use super::{GetObservedValue, SqlConnector};

pub struct SqlExtendedPropertyObserver<'a> {
  pub sql: &'a dyn SqlConnector,
  pub connection_string: String,
  pub property_name: String,
}

#[async_trait]
impl GetObservedValue for SqlExtendedPropertyObserver<'_> {
  async fn get_observed_value(&self) -> anyhow::Result<String> {
    self
      .sql
      .read_extended_property(&self.connection_string, &self.property_name)
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct FakeSql;

  #[async_trait]
  impl SqlConnector for FakeSql {
    async fn read_extended_property(
      &self,
      _connection_string: &str,
      property_name: &str,
    ) -> anyhow::Result<String> {
      Ok(format!("value-of-{property_name}"))
    }
    async fn run_scalar_query(&self, _: &str, _: &str) -> anyhow::Result<String> {
      unreachable!()
    }
  }

  #[tokio::test]
  async fn delegates_to_connector_with_property_name() {
    let sql = FakeSql;
    let observer = SqlExtendedPropertyObserver {
      sql: &sql,
      connection_string: "conn".into(),
      property_name: "maintenance_mode".into(),
    };
    let value = observer.get_observed_value().await.unwrap();
    assert_eq!(value, "value-of-maintenance_mode");
  }
}
