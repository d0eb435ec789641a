//! ARM REST clients for the management and metrics planes
//!
//! One client type serves both APIs; the `ApiVariant` supplies the child resource
//! names that differ between them.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{
    CollectionInfo, ConnectionStringCandidate, DatabaseAccount, DatabaseInfo, ManagementBinding,
    ManagementConnector, ManagementPlane, MetricValue, MetricsPlane, Throughput,
};
use crate::engine::{ApiKind, ApiVariant};
use crate::error::Result;
use crate::http;

/// DocumentDB resource provider API version
pub const DOCUMENTDB_API_VERSION: &str = "2024-05-15";

/// Azure Monitor metrics API version
pub const METRICS_API_VERSION: &str = "2018-01-01";

const MANAGEMENT_SERVICE: &str = "management plane";
const METRICS_SERVICE: &str = "metrics plane";

/// Metrics accumulated per interval; every other metric is a point-in-time gauge
const COUNTER_METRICS: &[&str] = &["TotalRequests", "TotalRequestUnits"];

/// Connector producing ARM REST clients
pub struct ArmConnector {
    http: reqwest::Client,
}

impl ArmConnector {
    pub fn new() -> Result<Self> {
        Ok(Self { http: http::client()? })
    }
}

impl ManagementConnector for ArmConnector {
    fn management(&self, binding: ManagementBinding, api: ApiKind) -> Result<Arc<dyn ManagementPlane>> {
        Ok(Arc::new(ArmManagementClient { http: self.http.clone(), binding, variant: api.variant() }))
    }

    fn metrics(&self, binding: ManagementBinding) -> Result<Arc<dyn MetricsPlane>> {
        Ok(Arc::new(ArmMetricsClient { http: self.http.clone(), binding }))
    }
}

/// Management-plane client bound to one subscription
pub struct ArmManagementClient {
    http: reqwest::Client,
    binding: ManagementBinding,
    variant: &'static dyn ApiVariant,
}

/// Account resource URL
#[must_use]
pub fn account_url(binding: &ManagementBinding, resource_group: &str, account_name: &str) -> String {
    format!(
        "{}/subscriptions/{}/resourceGroups/{resource_group}\
         /providers/Microsoft.DocumentDB/databaseAccounts/{account_name}",
        binding.endpoint, binding.subscription_id
    )
}

#[derive(Deserialize)]
struct ConnectionStringList {
    #[serde(rename = "connectionStrings")]
    connection_strings: Option<Vec<ConnectionStringEntry>>,
}

#[derive(Deserialize)]
struct ConnectionStringEntry {
    #[serde(rename = "connectionString")]
    connection_string: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct ArmList {
    #[serde(default)]
    value: Vec<ArmChild>,
}

#[derive(Deserialize)]
struct ArmChild {
    name: String,
    #[serde(default)]
    properties: serde_json::Value,
}

#[derive(Deserialize)]
struct ArmAccount {
    id: String,
    name: String,
    location: Option<String>,
    kind: Option<String>,
    #[serde(default)]
    properties: serde_json::Value,
}

fn candidates(list: ConnectionStringList) -> Option<Vec<ConnectionStringCandidate>> {
    list.connection_strings.map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, e)| ConnectionStringCandidate {
                description: e.description.unwrap_or_else(|| format!("Connection string {}", i + 1)),
                connection_string: e.connection_string,
            })
            .collect()
    })
}

fn throughput(settings: &serde_json::Value) -> Throughput {
    let resource = settings.pointer("/properties/resource");
    Throughput {
        throughput: resource.and_then(|r| r.get("throughput")).and_then(serde_json::Value::as_u64),
        autoscale_max_throughput: resource
            .and_then(|r| r.pointer("/autoscaleSettings/maxThroughput"))
            .and_then(serde_json::Value::as_u64),
    }
}

impl ArmManagementClient {
    fn databases_url(&self, resource_group: &str, account_name: &str) -> String {
        format!(
            "{}/{}",
            account_url(&self.binding, resource_group, account_name),
            self.variant.database_segment()
        )
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        let request = self
            .http
            .get(url)
            .query(&[("api-version", DOCUMENTDB_API_VERSION)]);
        http::send_json(MANAGEMENT_SERVICE, http::authorize(request, &self.binding.credentials.token)).await
    }
}

#[async_trait]
impl ManagementPlane for ArmManagementClient {
    async fn list_connection_strings(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> Result<Option<Vec<ConnectionStringCandidate>>> {
        let url = format!("{}/listConnectionStrings", account_url(&self.binding, resource_group, account_name));
        let request = self
            .http
            .post(url)
            .query(&[("api-version", DOCUMENTDB_API_VERSION)])
            .header(reqwest::header::CONTENT_LENGTH, "0");
        let list: ConnectionStringList =
            http::send_json(MANAGEMENT_SERVICE, http::authorize(request, &self.binding.credentials.token)).await?;
        Ok(candidates(list))
    }

    async fn get_account(&self, resource_group: &str, account_name: &str) -> Result<DatabaseAccount> {
        let account: ArmAccount = self.get(account_url(&self.binding, resource_group, account_name)).await?;
        Ok(DatabaseAccount {
            id: account.id,
            name: account.name,
            location: account.location,
            kind: account.kind,
            document_endpoint: account
                .properties
                .get("documentEndpoint")
                .and_then(serde_json::Value::as_str)
                .map(String::from),
        })
    }

    async fn list_databases(&self, resource_group: &str, account_name: &str) -> Result<Vec<DatabaseInfo>> {
        let list: ArmList = self.get(self.databases_url(resource_group, account_name)).await?;
        Ok(list.value.into_iter().map(|d| DatabaseInfo { name: d.name }).collect())
    }

    async fn list_collections(
        &self,
        resource_group: &str,
        account_name: &str,
        database: &str,
    ) -> Result<Vec<CollectionInfo>> {
        let url = format!(
            "{}/{database}/{}",
            self.databases_url(resource_group, account_name),
            self.variant.collection_segment()
        );
        let list: ArmList = self.get(url).await?;
        Ok(list
            .value
            .into_iter()
            .map(|c| {
                let shard_key = c.properties.get("resource").and_then(|r| self.variant.shard_key(r));
                CollectionInfo { name: c.name, shard_key }
            })
            .collect())
    }

    async fn get_throughput(&self, resource_group: &str, account_name: &str, database: &str) -> Result<Throughput> {
        let url = format!(
            "{}/{database}/throughputSettings/default",
            self.databases_url(resource_group, account_name)
        );
        let settings: serde_json::Value = self.get(url).await?;
        Ok(throughput(&settings))
    }
}

/// Metrics-plane client bound to one subscription
pub struct ArmMetricsClient {
    http: reqwest::Client,
    binding: ManagementBinding,
}

#[derive(Deserialize)]
struct MetricsResponse {
    #[serde(default)]
    value: Vec<MetricEntry>,
}

#[derive(Deserialize)]
struct MetricEntry {
    name: MetricName,
    unit: Option<String>,
    #[serde(default)]
    timeseries: Vec<TimeSeries>,
}

#[derive(Deserialize)]
struct MetricName {
    value: String,
}

#[derive(Deserialize)]
struct TimeSeries {
    #[serde(default)]
    data: Vec<DataPoint>,
}

#[derive(Deserialize)]
struct DataPoint {
    total: Option<f64>,
    average: Option<f64>,
}

// Counters sum over the window, gauges report their latest reading
fn metric_values(resource_uri: &str, response: MetricsResponse) -> Vec<MetricValue> {
    response
        .value
        .into_iter()
        .map(|entry| {
            let points: Vec<f64> = entry
                .timeseries
                .iter()
                .flat_map(|ts| ts.data.iter())
                .filter_map(|p| p.total.or(p.average))
                .collect();
            let value = if COUNTER_METRICS.contains(&entry.name.value.as_str()) {
                (!points.is_empty()).then(|| points.iter().sum::<f64>())
            } else {
                points.last().copied()
            };
            MetricValue { resource_uri: resource_uri.to_string(), name: entry.name.value, unit: entry.unit, value }
        })
        .collect()
}

#[async_trait]
impl MetricsPlane for ArmMetricsClient {
    async fn list_metrics(
        &self,
        resource_uri: &str,
        filter: Option<&str>,
        metric_names: &[&str],
    ) -> Result<Vec<MetricValue>> {
        let url = format!("{}{resource_uri}/providers/Microsoft.Insights/metrics", self.binding.endpoint);
        let names = metric_names.join(",");
        let mut query = vec![
            ("api-version", METRICS_API_VERSION),
            ("metricnames", names.as_str()),
            ("aggregation", "Total,Average"),
        ];
        if let Some(filter) = filter {
            query.push(("$filter", filter));
        }

        let request = http::authorize(self.http.get(url).query(&query), &self.binding.credentials.token);
        let response: MetricsResponse = http::send_json(METRICS_SERVICE, request).await?;
        Ok(metric_values(resource_uri, response))
    }
}
