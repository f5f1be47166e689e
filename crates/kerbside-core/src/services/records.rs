//! Record storage collaborators.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use tokio::sync::watch;

use crate::auth::AuthSession;
use crate::config::DashboardConfig;
use crate::error::{Error, Result};
use crate::models::{Record, RecordId, RecordPatch, RecordStatus};
use crate::util::parse_api_error;

/// Read/write access to the records table.
#[async_trait]
pub trait RecordService: Send + Sync {
    async fn select_all(&self) -> Result<Vec<Record>>;
    async fn select_pending(&self) -> Result<Vec<Record>>;
    async fn update(&self, id: &RecordId, patch: &RecordPatch) -> Result<()>;
    async fn delete(&self, id: &RecordId) -> Result<()>;
}

/// Read-only source of the full record set, used in place of
/// [`RecordService::select_all`] when a bulk endpoint is configured.
#[async_trait]
pub trait BulkRecordSource: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<Record>>;
}

/// PostgREST client for the records table.
///
/// Requests carry the anon key plus the signed-in user's access token, read
/// from the auth-state stream at request time.
#[derive(Clone)]
pub struct PostgrestRecordClient {
    table_url: String,
    anon_key: String,
    client: Client,
    session: watch::Receiver<Option<AuthSession>>,
}

impl PostgrestRecordClient {
    pub fn from_config(
        config: &DashboardConfig,
        session: watch::Receiver<Option<AuthSession>>,
    ) -> Result<Self> {
        Ok(Self {
            table_url: format!("{}/{}", config.rest_url(), config.records_table),
            anon_key: config.supabase_anon_key.clone(),
            client: Client::builder().timeout(config.http_timeout).build()?,
            session,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .session
            .borrow()
            .as_ref()
            .map_or_else(|| self.anon_key.clone(), |session| session.access_token.clone());
        request.header("apikey", &self.anon_key).bearer_auth(token)
    }

    async fn select(&self, filters: &[(&str, String)]) -> Result<Vec<Record>> {
        let request = self
            .client
            .get(&self.table_url)
            .header("Accept", "application/json")
            .query(&[("select", "*")])
            .query(filters);
        let response = ensure_success(self.authorize(request).send().await?).await?;
        Ok(response.json::<Vec<Record>>().await?)
    }
}

#[async_trait]
impl RecordService for PostgrestRecordClient {
    async fn select_all(&self) -> Result<Vec<Record>> {
        self.select(&[]).await
    }

    async fn select_pending(&self) -> Result<Vec<Record>> {
        self.select(&[(
            "status",
            format!("eq.{}", RecordStatus::Pending.as_str()),
        )])
        .await
    }

    async fn update(&self, id: &RecordId, patch: &RecordPatch) -> Result<()> {
        let request = self
            .client
            .patch(&self.table_url)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(patch);
        ensure_success(self.authorize(request).send().await?).await?;
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        let request = self
            .client
            .delete(&self.table_url)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal");
        ensure_success(self.authorize(request).send().await?).await?;
        Ok(())
    }
}

/// Authenticated HTTP endpoint returning every record as a JSON array.
#[derive(Clone)]
pub struct BulkDataClient {
    endpoint: String,
    client: Client,
    session: watch::Receiver<Option<AuthSession>>,
}

impl BulkDataClient {
    pub fn new(
        endpoint: impl Into<String>,
        config: &DashboardConfig,
        session: watch::Receiver<Option<AuthSession>>,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.into(),
            client: Client::builder().timeout(config.http_timeout).build()?,
            session,
        })
    }
}

#[async_trait]
impl BulkRecordSource for BulkDataClient {
    async fn fetch_all(&self) -> Result<Vec<Record>> {
        let token = self
            .session
            .borrow()
            .as_ref()
            .map(|session| session.access_token.clone());
        let mut request = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = ensure_success(request.send().await?).await?;
        Ok(response.json::<Vec<Record>>().await?)
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api(parse_api_error(status, &body)))
}
