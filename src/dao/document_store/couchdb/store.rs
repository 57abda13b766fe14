use std::{sync::Arc, time::Duration};

use futures::{StreamExt, future::BoxFuture, pin_mut};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dao::{
    document_store::{DocumentStore, DocumentWatch, merge_json},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{ChangesResponse, ID_FIELD, REV_FIELD, doc_id, seq_param, strip_meta},
};

const CHANGES: &str = "_changes";
const LONGPOLL_TIMEOUT: Duration = Duration::from_secs(30);
const WATCH_CAPACITY: usize = 16;

/// Document store backed by a CouchDB database over HTTP.
#[derive(Clone)]
pub struct CouchDocumentStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchDocumentStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        let builder = self.client.request(method, url);
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);
        let mut builder = self.client.get(&url);
        if let Some((ref user, ref pass)) = self.auth {
            builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
        }

        let response = builder
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let mut builder = self.client.put(&url);
                if let Some((ref user, ref pass)) = self.auth {
                    builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
                }
                let create =
                    builder
                        .send()
                        .await
                        .map_err(|source| CouchDaoError::DatabaseCreate {
                            database: database.clone(),
                            source,
                        })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    /// Fetch a raw document, `_id` and `_rev` included.
    async fn get_raw(&self, id: &str) -> CouchResult<Option<Map<String, Value>>> {
        let response = self
            .request(Method::GET, id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<Map<String, Value>>()
                .await
                .map(Some)
                .map_err(|source| CouchDaoError::DecodeResponse {
                    path: id.to_string(),
                    source,
                }),
            other => Err(CouchDaoError::RequestStatus {
                path: id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_raw(&self, id: &str, document: &Map<String, Value>) -> CouchResult<()> {
        let response = self
            .request(Method::PUT, id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::Conflict {
                path: id.to_string(),
            }),
            other => Err(CouchDaoError::RequestStatus {
                path: id.to_string(),
                status: other,
            }),
        }
    }

    /// Read-merge-write keeping the stored revision so CouchDB accepts the PUT.
    async fn merge_document(&self, path: &str, patch: Value, must_exist: bool) -> CouchResult<()> {
        let id = doc_id(path);
        let mut document = match self.get_raw(&id).await? {
            Some(mut existing) => {
                let rev = strip_meta(&mut existing);
                let mut merged = Value::Object(existing);
                merge_json(&mut merged, patch);
                let mut merged = into_object(merged);
                if let Some(rev) = rev {
                    merged.insert(REV_FIELD.to_string(), Value::String(rev));
                }
                merged
            }
            None if must_exist => return Err(CouchDaoError::MissingDocument { path: id }),
            None => into_object(patch),
        };
        document.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        self.put_raw(&id, &document).await
    }

    async fn poll_changes(&self, id: &str, since: &str) -> CouchResult<ChangesResponse> {
        let query = [
            ("feed", "longpoll".to_string()),
            ("filter", "_doc_ids".to_string()),
            ("include_docs", "true".to_string()),
            ("since", since.to_string()),
            ("timeout", LONGPOLL_TIMEOUT.as_millis().to_string()),
        ];

        let response = self
            .request(Method::POST, CHANGES)
            .query(&query)
            .json(&json!({ "doc_ids": [id] }))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: CHANGES.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: CHANGES.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<ChangesResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: CHANGES.to_string(),
                source,
            })
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

impl DocumentStore for CouchDocumentStore {
    fn set_merge(&self, path: &str, document: Value) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let path = path.to_string();
        Box::pin(async move {
            store
                .merge_document(&path, document, false)
                .await
                .map_err(Into::into)
        })
    }

    fn get(&self, path: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        let id = doc_id(path);
        Box::pin(async move {
            let maybe_doc = store.get_raw(&id).await?;
            Ok(maybe_doc.map(|mut doc| {
                strip_meta(&mut doc);
                Value::Object(doc)
            }))
        })
    }

    fn update(&self, path: &str, fields: Value) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let path = path.to_string();
        Box::pin(async move {
            store
                .merge_document(&path, fields, true)
                .await
                .map_err(Into::into)
        })
    }

    fn subscribe(&self, path: &str) -> BoxFuture<'static, StorageResult<DocumentWatch>> {
        let store = self.clone();
        let id = doc_id(path);
        Box::pin(async move {
            let (tx, rx) = mpsc::channel(WATCH_CAPACITY);
            let task = tokio::spawn(async move {
                let changes = async_stream::stream! {
                    let mut since = "now".to_string();
                    loop {
                        match store.poll_changes(&id, &since).await {
                            Ok(page) => {
                                since = seq_param(&page.last_seq);
                                for row in page.results {
                                    if row.deleted || row.id != id {
                                        continue;
                                    }
                                    if let Some(Value::Object(mut doc)) = row.doc {
                                        strip_meta(&mut doc);
                                        yield Value::Object(doc);
                                    }
                                }
                            }
                            Err(err) => {
                                warn!(doc_id = %id, error = %err, "CouchDB change feed failed; closing watch");
                                break;
                            }
                        }
                    }
                };
                pin_mut!(changes);

                loop {
                    tokio::select! {
                        _ = tx.closed() => break,
                        next = changes.next() => match next {
                            Some(document) => {
                                if tx.send(document).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
                debug!("CouchDB document watch finished");
            });
            Ok(DocumentWatch::new(rx, task))
        })
    }
}
