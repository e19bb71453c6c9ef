//! §4.9 `sqlQuery` observer: runs a scalar query, takes the first column
//! of the first row.

use async_trait::async_trait;

use super::{GetObservedValue, SqlConnector};

pub struct SqlQueryObserver<'a> {
  pub sql: &'a dyn SqlConnector,
  pub connection_string: String,
  pub query: String,
}

#[async_trait]
impl GetObservedValue for SqlQueryObserver<'_> {
  async fn get_observed_value(&self) -> anyhow::Result<String> {
    self.sql.run_scalar_query(&self.connection_string, &self.query).await
  }
}
