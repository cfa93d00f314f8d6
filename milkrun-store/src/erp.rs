use crate::app_config::InventoryConfig;
use async_trait::async_trait;
use milkrun_core::inventory::InventoryService;
use milkrun_core::model::ContainerRecord;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Container lookups against the warehouse ERP's datasource endpoint.
///
/// Each query is a stored datasource invoked as
/// `POST {base_url}/api/datasources/{id}/execute` with a JSON `inputs`
/// object, answered as tables of columns and rows.
#[derive(Clone)]
pub struct ErpDatasourceClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    by_serial_datasource: u32,
    by_part_datasource: u32,
    by_master_unit_datasource: u32,
}

#[derive(Debug, Deserialize)]
struct DatasourceResponse {
    #[serde(default)]
    tables: Vec<DatasourceTable>,
}

#[derive(Debug, Deserialize)]
struct DatasourceTable {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

impl ErpDatasourceClient {
    pub fn new(config: &InventoryConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            by_serial_datasource: config.by_serial_datasource,
            by_part_datasource: config.by_part_datasource,
            by_master_unit_datasource: config.by_master_unit_datasource,
        })
    }

    async fn execute(
        &self,
        datasource: u32,
        inputs: serde_json::Value,
    ) -> Result<Vec<ContainerRecord>, reqwest::Error> {
        let url = format!("{}/api/datasources/{}/execute", self.base_url, datasource);
        debug!("Executing datasource {}", datasource);

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&serde_json::json!({ "inputs": inputs }))
            .send()
            .await?
            .error_for_status()?;

        let body: DatasourceResponse = response.json().await?;
        Ok(body.tables.iter().flat_map(records_from_table).collect())
    }
}

#[async_trait]
impl InventoryService for ErpDatasourceClient {
    async fn containers_by_part(
        &self,
        part_no: &str,
    ) -> Result<Vec<ContainerRecord>, Box<dyn std::error::Error + Send + Sync>> {
        let records = self
            .execute(
                self.by_part_datasource,
                serde_json::json!({ "Part_No": part_no }),
            )
            .await?;
        Ok(records)
    }

    async fn container_by_serial(
        &self,
        serial_no: &str,
    ) -> Result<Option<ContainerRecord>, Box<dyn std::error::Error + Send + Sync>> {
        let mut records = self
            .execute(
                self.by_serial_datasource,
                serde_json::json!({ "Serial_No": serial_no }),
            )
            .await?;
        if records.is_empty() {
            Ok(None)
        } else {
            Ok(Some(records.remove(0)))
        }
    }

    async fn containers_by_master_unit(
        &self,
        master_unit: &str,
    ) -> Result<Vec<ContainerRecord>, Box<dyn std::error::Error + Send + Sync>> {
        let records = self
            .execute(
                self.by_master_unit_datasource,
                serde_json::json!({ "Master_Unit": master_unit }),
            )
            .await?;
        Ok(records)
    }
}

/// Pivot one columns/rows table into typed records.
///
/// Unknown columns are ignored and missing values fall back to defaults;
/// rows without a serial are dropped.
fn records_from_table(table: &DatasourceTable) -> Vec<ContainerRecord> {
    let column = |name: &str| table.columns.iter().position(|c| c == name);
    let serial_no = column("Serial_No");
    let part_no = column("Part_No");
    let revision = column("Revision");
    let quantity = column("Quantity");
    let location = column("Location");
    let add_date = column("Add_Date");

    table
        .rows
        .iter()
        .filter_map(|row| {
            let serial = cell_text(row, serial_no);
            if serial.is_empty() {
                return None;
            }
            Some(ContainerRecord {
                serial_no: serial,
                part_no: cell_text(row, part_no),
                revision: cell_text(row, revision),
                quantity: cell_number(row, quantity),
                location: cell_text(row, location),
                add_date: cell_text(row, add_date),
            })
        })
        .collect()
}

fn cell_text(row: &[serde_json::Value], index: Option<usize>) -> String {
    index
        .and_then(|i| row.get(i))
        .and_then(|value| value.as_str())
        .unwrap_or_default()
        .to_string()
}

fn cell_number(row: &[serde_json::Value], index: Option<usize>) -> f64 {
    let value = match index.and_then(|i| row.get(i)) {
        Some(value) => value,
        None => return 0.0,
    };
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0.0)
}
