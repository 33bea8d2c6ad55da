use async_trait::async_trait;
use crate::error::{AnalyzerError, Result};
use crate::models::{DataPoint, MonthKey, SeriesDescriptor};
use super::{http, CpiSource};
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Official time-series API (catalog search and series download).
pub struct SeriesApiFetcher {
    base_url: String,
    client: Client,
}

impl SeriesApiFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http::build_client(timeout),
        }
    }

    fn search_url(&self, query: &str) -> String {
        format!("{}/search?q={}&limit=30", self.base_url, query.replace(' ', "%20"))
    }

    fn series_url(&self, series_id: &str) -> String {
        format!(
            "{}/series?ids={}&collapse=month&collapse_aggregation=end_of_period&format=json&metadata=none&limit=5000",
            self.base_url, series_id
        )
    }
}

#[async_trait]
impl CpiSource for SeriesApiFetcher {
    fn name(&self) -> &str {
        "series_api"
    }

    async fn search_series(&self, query: &str) -> Result<Vec<SeriesDescriptor>> {
        let url = self.search_url(query);
        let json = http::get_json(&self.client, &url, self.name(), query).await?;
        Ok(Self::parse_search(&json))
    }

    async fn fetch_monthly(&self, series_id: &str) -> Result<Vec<DataPoint<MonthKey, f64>>> {
        let url = self.series_url(series_id);
        let json = http::get_json(&self.client, &url, self.name(), series_id).await?;
        let points = Self::parse_series(&json)?;
        tracing::info!("Series API returned {} monthly points for {}", points.len(), series_id);
        Ok(points)
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl SeriesApiFetcher {
    fn parse_search(json: &Value) -> Vec<SeriesDescriptor> {
        let items = match json["data"].as_array() {
            Some(items) => items,
            None => return Vec::new(),
        };

        items
            .iter()
            .map(|item| {
                let field = &item["field"];
                let text = |v: &Value| v.as_str().unwrap_or_default().to_string();
                SeriesDescriptor {
                    id: text(&field["id"]),
                    description: text(&field["description"]),
                    title: text(&item["dataset"]["title"]),
                    units: text(&field["units"]),
                    frequency: text(&field["frequency"]),
                }
            })
            .collect()
    }

    /// Rows are `[date, value]` arrays or `{indice_tiempo, valor}` objects.
    /// Later rows of the same month overwrite earlier ones.
    fn parse_series(json: &Value) -> Result<Vec<DataPoint<MonthKey, f64>>> {
        let rows = json["data"]
            .as_array()
            .ok_or_else(|| AnalyzerError::CpiUnavailable("series response has no data array".to_string()))?;

        let mut by_month = BTreeMap::new();
        for row in rows {
            let (date, value) = match row {
                Value::Array(cols) if cols.len() >= 2 => (cols[0].as_str(), as_number(&cols[1])),
                Value::Object(obj) => {
                    let value = obj
                        .get("valor")
                        .and_then(as_number)
                        .or_else(|| obj.iter().find(|(k, _)| k.as_str() != "indice_tiempo").and_then(|(_, v)| as_number(v)));
                    (obj.get("indice_tiempo").and_then(Value::as_str), value)
                }
                _ => (None, None),
            };

            if let (Some(date), Some(value)) = (date, value) {
                match date.parse::<MonthKey>() {
                    Ok(month) => {
                        by_month.insert(month, value);
                    }
                    Err(e) => tracing::debug!("Skipping CPI row: {}", e),
                }
            }
        }

        Ok(by_month.into_iter().map(|(m, v)| DataPoint::new(m, v)).collect())
    }
}
