use crate::diary_entry::{Diary, DiaryEntry, Draft, Id};
use crate::diary_state::{Alert, Store};
use async_trait::async_trait;
use color_eyre::{eyre::WrapErr, Result};
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedEntry {
    pub diary: Diary,
    pub entry: DiaryEntry,
}

/// Remote entry endpoints. `Ok(None)` means the request went through but
/// produced nothing usable; `Err` is a transport failure.
#[async_trait]
pub trait DiaryApi: Send + Sync {
    async fn create_entry(&self, diary_id: &Id, draft: &Draft) -> Result<Option<CreatedEntry>>;

    async fn update_entry(&self, entry_id: &Id, draft: &Draft) -> Result<Option<DiaryEntry>>;
}

pub fn create_entry_path(diary_id: &Id) -> String {
    format!("/diaries/entry/{diary_id}")
}

pub fn update_entry_path(entry_id: &Id) -> String {
    format!("diaries/entry/{entry_id}")
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

pub struct HttpClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    store: Store,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, store: Store) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("diary-editor/", env!("CARGO_PKG_VERSION")))
            .build()
            .wrap_err("failed to build HTTP client")?;

        Ok(HttpClient {
            client,
            base_url: base_url.into(),
            token,
            store,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(Method::POST, path, body).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(Method::PUT, path, body).await
    }

    async fn send<B, T>(&self, method: Method, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let mut request = self.client.request(method.clone(), &url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .wrap_err_with(|| format!("{method} {url} failed"))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .wrap_err_with(|| format!("failed to read response of {method} {url}"))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&bytes)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| format!("Request failed with status {status}"));
            warn!(%method, %url, %status, "request rejected: {message}");
            self.store.show_alert(Alert::error(message));
            return Ok(None);
        }

        match serde_json::from_slice::<Option<T>>(&bytes) {
            Ok(data) => {
                info!(%method, %url, %status, "request completed");
                Ok(data)
            }
            Err(e) => {
                warn!(%method, %url, "unreadable response body: {e}");
                self.store
                    .show_alert(Alert::error("The server sent a response that could not be read."));
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl DiaryApi for HttpClient {
    async fn create_entry(&self, diary_id: &Id, draft: &Draft) -> Result<Option<CreatedEntry>> {
        self.post(&create_entry_path(diary_id), draft).await
    }

    async fn update_entry(&self, entry_id: &Id, draft: &Draft) -> Result<Option<DiaryEntry>> {
        self.put(&update_entry_path(entry_id), draft).await
    }
}
