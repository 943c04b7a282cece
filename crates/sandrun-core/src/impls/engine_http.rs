//! HttpEngineClient - the engine's REST API over reqwest.
//!
//! # 学習ポイント
//! - URL は `url::Url` の path segment として組み立てる (変数名の `#` や `/` は escape される)
//! - 失敗した response は status と body を `EngineError::Status` に残す

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use url::Url;

use crate::domain::VariableSet;
use crate::ports::{EngineClient, EngineError};

const OCTET_STREAM: &str = "application/octet-stream";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// POST `.../localVariables` の body。`deletions` は送らない
#[derive(Serialize)]
struct PatchVariables<'a> {
    modifications: &'a VariableSet,
}

/// Engine REST API の client。
///
/// `reqwest::Client` は内部で connection pool を共有するので clone は安い。
#[derive(Debug, Clone)]
pub struct HttpEngineClient {
    base_url: Url,
    http_client: reqwest::Client,
}

impl HttpEngineClient {
    /// `authorization` is sent verbatim as the `Authorization` header.
    ///
    /// # 使用例
    /// ```ignore
    /// let client = HttpEngineClient::new("http://localhost:8080/engine-rest", None)?;
    /// ```
    pub fn new(base_url: &str, authorization: Option<&str>) -> Result<Self, EngineError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| EngineError::Other(format!("invalid engine url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(EngineError::Other(format!(
                "engine url {base_url} cannot carry a path"
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(auth) = authorization {
            let mut value = HeaderValue::from_str(auth)
                .map_err(|e| EngineError::Other(format!("invalid authorization header: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Base url with `segments` appended, each one percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, EngineError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| EngineError::Other(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// 2xx 以外を `EngineError::Status` にする。body が読めなければ空文字
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(EngineError::Status {
            status: status.as_u16(),
            url,
            body,
        })
    }
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn fetch_variable_data(
        &self,
        execution_id: &str,
        name: &str,
    ) -> Result<Vec<u8>, EngineError> {
        // 値は serialize された形ではなく raw bytes で受け取る
        let url = self.endpoint(&["execution", execution_id, "localVariables", name, "data"])?;
        let response = self
            .http_client
            .get(url)
            .header(ACCEPT, OCTET_STREAM)
            .send()
            .await?;
        let bytes = Self::check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn patch_local_variables(
        &self,
        execution_id: &str,
        modifications: &VariableSet,
    ) -> Result<(), EngineError> {
        // engine 側の modify endpoint は POST
        let url = self.endpoint(&["execution", execution_id, "localVariables"])?;
        let response = self
            .http_client
            .post(url)
            .json(&PatchVariables { modifications })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
