use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use pbench_core::api::{ClientConfig, ClientError, QueryClient, QueryHandle, Row, Session};

use super::error::{decode_error, from_reqwest, status_error};
use super::protocol::{
    QueryResults, CATALOG_HEADER, CLIENT_TAGS_HEADER, QUERY_INFO_PATH, SCHEMA_HEADER,
    SESSION_HEADER, SOURCE_HEADER, STATEMENT_PATH, USER_HEADER,
};

/// Connection pool and identity shared by every session view of a client.
struct Transport {
    http: reqwest::Client,
    user: String,
    client_tags: Vec<String>,
    url_statement: String,
    url_query_info: String,
}

impl Transport {
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        let resp = self
            .http
            .get(url)
            .header(USER_HEADER, &self.user)
            .send()
            .await
            .map_err(|err| from_reqwest(err, url))?;
        let body = read_body(resp, url).await?;
        serde_json::from_slice(&body).map_err(|err| decode_error(url, err, &body))
    }
}

async fn read_body(resp: reqwest::Response, url: &str) -> Result<Bytes, ClientError> {
    let status = resp.status();
    let body = resp.bytes().await.map_err(|err| from_reqwest(err, url))?;
    if !status.is_success() {
        return Err(status_error(
            status.as_u16(),
            url,
            &String::from_utf8_lossy(&body),
        ));
    }
    Ok(body)
}

#[derive(Clone)]
pub struct PrestoClient {
    transport: Arc<Transport>,
    session: Session,
}

impl PrestoClient {
    pub fn new(cfg: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|err| from_reqwest(err, &cfg.server_url))?;
        let normalized = cfg.server_url.trim_end_matches('/');
        Ok(Self {
            transport: Arc::new(Transport {
                http,
                user: cfg.user.clone(),
                client_tags: cfg.client_tags.clone(),
                url_statement: format!("{}{}", normalized, STATEMENT_PATH),
                url_query_info: format!("{}{}", normalized, QUERY_INFO_PATH),
            }),
            session: Session::default(),
        })
    }

    fn statement_request(&self, text: &str, source: &str) -> reqwest::RequestBuilder {
        let transport = &self.transport;
        let mut req = transport
            .http
            .post(&transport.url_statement)
            .header(USER_HEADER, &transport.user)
            .header(SOURCE_HEADER, source)
            .body(text.to_string());
        if let Some(catalog) = &self.session.catalog {
            req = req.header(CATALOG_HEADER, catalog);
        }
        if let Some(schema) = &self.session.schema {
            req = req.header(SCHEMA_HEADER, schema);
        }
        let params = self.session.param_pairs();
        if !params.is_empty() {
            req = req.header(SESSION_HEADER, params.join(","));
        }
        if !transport.client_tags.is_empty() {
            req = req.header(CLIENT_TAGS_HEADER, transport.client_tags.join(","));
        }
        req
    }
}

#[async_trait]
impl QueryClient for PrestoClient {
    fn session(&self) -> &Session {
        &self.session
    }

    fn with_session(&self, session: Session) -> Arc<dyn QueryClient> {
        Arc::new(Self {
            transport: Arc::clone(&self.transport),
            session,
        })
    }

    async fn query(&self, text: &str, source: &str) -> Result<Box<dyn QueryHandle>, ClientError> {
        let url = &self.transport.url_statement;
        tracing::debug!(url = %url, source = %source, query_len = text.len(), "posting statement");
        let resp = self
            .statement_request(text, source)
            .send()
            .await
            .map_err(|err| from_reqwest(err, url))?;
        let body = read_body(resp, url).await?;
        let first: QueryResults =
            serde_json::from_slice(&body).map_err(|err| decode_error(url, err, &body))?;

        let mut query = PrestoQuery {
            transport: Arc::clone(&self.transport),
            id: first.id.clone(),
            info_uri: first.info_uri.clone(),
            next_uri: None,
            pending: None,
            failure: None,
        };
        query.absorb(first);
        Ok(Box::new(query))
    }

    async fn query_info(&self, query_id: &str) -> Result<Bytes, ClientError> {
        let url = format!("{}/{}", self.transport.url_query_info, query_id);
        let resp = self
            .transport
            .http
            .get(&url)
            .header(USER_HEADER, &self.transport.user)
            .send()
            .await
            .map_err(|err| from_reqwest(err, &url))?;
        read_body(resp, &url).await
    }
}

/// A submitted statement, drained by following `nextUri` until it is absent.
pub struct PrestoQuery {
    transport: Arc<Transport>,
    id: String,
    info_uri: String,
    next_uri: Option<String>,
    pending: Option<Vec<Row>>,
    failure: Option<ClientError>,
}

impl PrestoQuery {
    fn absorb(&mut self, page: QueryResults) {
        if let Some(error) = page.error {
            self.failure = Some(ClientError::Server {
                query_id: self.id.clone(),
                name: error.error_name,
                message: error.message,
            });
            self.next_uri = None;
        } else {
            self.next_uri = page.next_uri;
        }
        self.pending = page.data.filter(|rows| !rows.is_empty());
        if !page.info_uri.is_empty() {
            self.info_uri = page.info_uri;
        }
    }
}

#[async_trait]
impl QueryHandle for PrestoQuery {
    fn id(&self) -> &str {
        &self.id
    }

    fn info_uri(&self) -> &str {
        &self.info_uri
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>, ClientError> {
        loop {
            if let Some(rows) = self.pending.take() {
                return Ok(Some(rows));
            }
            if let Some(failure) = self.failure.take() {
                return Err(failure);
            }
            let Some(next_uri) = self.next_uri.take() else {
                return Ok(None);
            };
            let page: QueryResults = self.transport.get_json(&next_uri).await?;
            if let Some(stats) = &page.stats {
                tracing::trace!(query_id = %self.id, state = %stats.state, "fetched page");
            }
            self.absorb(page);
        }
    }
}
