//! Account overview and metrics aggregation
//!
//! Both fan out one management call per item and join the results. The first hard
//! error fails the whole aggregation. The only soft failure is a "not found"
//! throughput lookup, which just means the database has no shared throughput.

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CollectionInfo, DatabaseAccount, ManagementPlane, MetricValue, MetricsPlane, Throughput};
use crate::engine::ApiKind;
use crate::error::Result;
use crate::resource::ResourceIdentity;

/// Default metrics shown for an account
pub const DEFAULT_METRICS: &[&str] = &["TotalRequests", "TotalRequestUnits", "DocumentCount", "DataUsage"];

/// One database with its collections and shared throughput
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseOverview {
    pub name: String,
    pub collections: Vec<CollectionInfo>,
    /// `None` when the database has no database-level throughput
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput: Option<Throughput>,
}

/// Account metadata plus every database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOverview {
    pub api: ApiKind,
    pub api_label: String,
    pub account: DatabaseAccount,
    pub databases: Vec<DatabaseOverview>,
}

/// Describe an account: metadata, databases, collections and throughput
pub async fn describe_account(
    plane: &dyn ManagementPlane,
    resource: &ResourceIdentity,
    api: ApiKind,
) -> Result<AccountOverview> {
    let group = resource.resource_group.as_str();
    let name = resource.account_name.as_str();

    let account = plane.get_account(group, name).await?;
    let databases = plane.list_databases(group, name).await?;
    debug!(account = name, databases = databases.len(), "describing databases");

    let databases =
        try_join_all(databases.iter().map(|db| describe_database(plane, group, name, &db.name))).await?;

    Ok(AccountOverview { api, api_label: api.variant().label().to_string(), account, databases })
}

async fn describe_database(
    plane: &dyn ManagementPlane,
    group: &str,
    account: &str,
    database: &str,
) -> Result<DatabaseOverview> {
    let (collections, throughput) = futures::try_join!(
        plane.list_collections(group, account, database),
        optional_throughput(plane, group, account, database),
    )?;
    Ok(DatabaseOverview { name: database.to_string(), collections, throughput })
}

/// Throughput lookup where "not found" is recorded as unknown
pub async fn optional_throughput(
    plane: &dyn ManagementPlane,
    group: &str,
    account: &str,
    database: &str,
) -> Result<Option<Throughput>> {
    match plane.get_throughput(group, account, database).await {
        Ok(throughput) => Ok(Some(throughput)),
        Err(e) if e.is_not_found() => {
            debug!(database, "no database-level throughput");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Fetch `metric_names` for every resource and flatten the results in input order
pub async fn collect_metrics(
    plane: &dyn MetricsPlane,
    resource_uris: &[String],
    filter: Option<&str>,
    metric_names: &[&str],
) -> Result<Vec<MetricValue>> {
    let per_resource =
        try_join_all(resource_uris.iter().map(|uri| plane.list_metrics(uri, filter, metric_names))).await?;
    Ok(per_resource.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CosmoError;
    use crate::management::{ConnectionStringCandidate, DatabaseInfo};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    struct FakePlane {
        databases: Vec<&'static str>,
        throughput: HashMap<&'static str, Result<Throughput>>,
    }

    fn clone_result(r: &Result<Throughput>) -> Result<Throughput> {
        match r {
            Ok(t) => Ok(*t),
            Err(CosmoError::RemoteRequestFailed { service, status, detail }) => {
                Err(CosmoError::remote(service.clone(), *status, detail.clone()))
            }
            Err(e) => Err(CosmoError::invalid_input(e.message())),
        }
    }

    #[async_trait]
    impl ManagementPlane for FakePlane {
        async fn list_connection_strings(&self, _: &str, _: &str) -> Result<Option<Vec<ConnectionStringCandidate>>> {
            Ok(None)
        }

        async fn get_account(&self, _: &str, name: &str) -> Result<DatabaseAccount> {
            Ok(DatabaseAccount {
                id: format!("/subscriptions/s/resourceGroups/g/providers/Microsoft.DocumentDB/databaseAccounts/{name}"),
                name: name.to_string(),
                location: Some("westeurope".to_string()),
                kind: Some("MongoDB".to_string()),
                document_endpoint: None,
            })
        }

        async fn list_databases(&self, _: &str, _: &str) -> Result<Vec<DatabaseInfo>> {
            Ok(self.databases.iter().map(|d| DatabaseInfo { name: d.to_string() }).collect())
        }

        async fn list_collections(&self, _: &str, _: &str, database: &str) -> Result<Vec<CollectionInfo>> {
            Ok(vec![CollectionInfo { name: format!("{database}-items"), shard_key: Some("id".to_string()) }])
        }

        async fn get_throughput(&self, _: &str, _: &str, database: &str) -> Result<Throughput> {
            clone_result(&self.throughput[database])
        }
    }

    fn resource() -> ResourceIdentity {
        let id = "/subscriptions/s/resourceGroups/g/providers/Microsoft.DocumentDB/databaseAccounts/acct";
        ResourceIdentity::parse(id).unwrap()
    }

    #[tokio::test]
    async fn test_describe_account_not_found_throughput_is_soft() {
        let plane = FakePlane {
            databases: vec!["shared", "dedicated"],
            throughput: HashMap::from([
                ("shared", Ok(Throughput { throughput: Some(400), autoscale_max_throughput: None })),
                ("dedicated", Err(CosmoError::remote("management plane", Some(404), "NotFound"))),
            ]),
        };

        let overview = describe_account(&plane, &resource(), ApiKind::Mongo).await.unwrap();
        assert_eq!(overview.account.name, "acct");
        assert_eq!(overview.api_label, "Azure Cosmos DB for MongoDB");
        assert_eq!(overview.databases.len(), 2);
        assert_eq!(overview.databases[0].throughput.and_then(|t| t.throughput), Some(400));
        assert_eq!(overview.databases[1].throughput, None);
        assert_eq!(overview.databases[1].collections[0].name, "dedicated-items");
    }

    #[tokio::test]
    async fn test_describe_account_hard_error_propagates() {
        let plane = FakePlane {
            databases: vec!["ok", "broken"],
            throughput: HashMap::from([
                ("ok", Ok(Throughput { throughput: Some(400), autoscale_max_throughput: None })),
                ("broken", Err(CosmoError::remote("management plane", Some(500), "InternalServerError"))),
            ]),
        };

        let err = describe_account(&plane, &resource(), ApiKind::Mongo).await.unwrap_err();
        assert!(matches!(err, CosmoError::RemoteRequestFailed { status: Some(500), .. }));
    }

    struct FakeMetrics;

    #[async_trait]
    impl MetricsPlane for FakeMetrics {
        async fn list_metrics(&self, uri: &str, _: Option<&str>, names: &[&str]) -> Result<Vec<MetricValue>> {
            if uri.ends_with("bad") {
                return Err(CosmoError::remote("metrics plane", Some(403), "denied"));
            }
            Ok(names
                .iter()
                .map(|n| MetricValue {
                    resource_uri: uri.to_string(),
                    name: n.to_string(),
                    unit: None,
                    value: Some(1.0),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_collect_metrics_preserves_order() {
        let uris = vec!["/r/a".to_string(), "/r/b".to_string()];
        let values = collect_metrics(&FakeMetrics, &uris, None, &["TotalRequests", "DocumentCount"]).await.unwrap();
        let keys: Vec<(String, String)> = values.into_iter().map(|v| (v.resource_uri, v.name)).collect();
        assert_eq!(
            keys,
            vec![
                ("/r/a".to_string(), "TotalRequests".to_string()),
                ("/r/a".to_string(), "DocumentCount".to_string()),
                ("/r/b".to_string(), "TotalRequests".to_string()),
                ("/r/b".to_string(), "DocumentCount".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_collect_metrics_first_error_wins() {
        let uris = vec!["/r/a".to_string(), "/r/bad".to_string()];
        let err = collect_metrics(&FakeMetrics, &uris, None, DEFAULT_METRICS).await.unwrap_err();
        assert!(matches!(err, CosmoError::RemoteRequestFailed { status: Some(403), .. }));
    }
}
