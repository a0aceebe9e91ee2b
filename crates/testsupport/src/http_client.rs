use anyhow::Result;
use inspection_models::{HealthResponse, ServiceInfo};
use reqwest::Client;

pub struct InspectionClient {
    client: Client,
    base_url: String,
}

impl InspectionClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    /// Returns the status code alongside the body; 503 is a valid answer.
    pub async fn health(&self, path: &str) -> Result<(u16, HealthResponse)> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        let status = response.status().as_u16();
        Ok((status, response.json().await?))
    }

    pub async fn info(&self) -> Result<ServiceInfo> {
        let response = self.client.get(format!("{}/", self.base_url)).send().await?;
        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Service info failed: {}", error_text);
        }
        Ok(response.json().await?)
    }

    pub async fn metrics(&self) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/metrics", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Metrics failed: {}", error_text);
        }
        Ok(response.text().await?)
    }

    pub async fn correlation_id(&self, sent: Option<&str>) -> Result<Option<String>> {
        let mut request = self.client.get(format!("{}/", self.base_url));
        if let Some(id) = sent {
            request = request.header("x-correlation-id", id);
        }
        let response = request.send().await?;
        Ok(response
            .headers()
            .get("x-correlation-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }
}
