//! Azure Blob Storage backend.
//!
//! Blobs are written through `object_store`'s Azure client, one client per
//! container. Creating the container itself is a single signed REST call,
//! since `object_store` has no notion of creating buckets.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::path::Path;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, PutMode, PutOptions, PutPayload,
};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode, Url};
use tokio::runtime::Runtime;

use super::auth::SharedKey;
use super::{BlobStore, StorageError};

const API_VERSION: &str = "2021-08-06";
const CSV_CONTENT_TYPE: &str = "text/csv";
const CONTAINER_EXISTS_CODE: &str = "ContainerAlreadyExists";

/// Blocking client for one storage account.
///
/// Building one performs no I/O and does not check the credentials; a bad
/// account name or key only shows up when the first request is rejected.
pub struct AzureBlobStore {
    account: String,
    access_key: String,
    endpoint: Url,
    custom_endpoint: bool,
    http: Client,
    signer: SharedKey,
    runtime: Runtime,
    containers: Mutex<BTreeMap<String, Arc<dyn ObjectStore>>>,
}

impl AzureBlobStore {
    pub fn new(
        account: &str,
        access_key: &str,
        endpoint: Option<&str>,
    ) -> Result<AzureBlobStore, StorageError> {
        let custom_endpoint = endpoint.is_some();

        let endpoint = match endpoint {
            Some(x) => x.trim_end_matches('/').to_string(),
            None => default_endpoint(account),
        };

        let endpoint = Url::parse(&endpoint)
            .map_err(|err| StorageError::Endpoint(format!("{endpoint}: {err}")))?;

        if endpoint.cannot_be_a_base() {
            return Err(StorageError::Endpoint(endpoint.to_string()));
        }

        let http = Client::builder().build()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        log::debug!("azure blob client ready for {}", endpoint);

        Ok(AzureBlobStore {
            account: account.to_string(),
            access_key: access_key.to_string(),
            endpoint,
            custom_endpoint,
            http,
            signer: SharedKey::new(account, access_key),
            runtime,
            containers: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn container_url(&self, container: &str) -> Url {
        let mut url = self.endpoint.clone();

        // the endpoint is checked to be a base url on construction
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(container);
        }

        url
    }

    /// Client bound to `container`, built on first use and reused after.
    fn container_client(&self, container: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let mut containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match containers.entry(container.to_string()) {
            Entry::Occupied(x) => Ok(x.get().clone()),
            Entry::Vacant(x) => {
                let mut builder = MicrosoftAzureBuilder::new()
                    .with_account(&self.account)
                    .with_access_key(&self.access_key)
                    .with_container_name(container);

                if self.custom_endpoint {
                    builder = builder
                        .with_endpoint(self.endpoint.as_str().trim_end_matches('/').to_string())
                        .with_allow_http(self.endpoint.scheme() == "http");
                }

                let client: Arc<dyn ObjectStore> = Arc::new(builder.build()?);
                log::debug!("blob client ready for container {}", container);

                Ok(x.insert(client).clone())
            }
        }
    }

    fn send_signed(&self, method: Method, url: Url) -> Result<Response, StorageError> {
        let mut headers = HeaderMap::new();
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        headers.insert("x-ms-date", HeaderValue::from_str(&date)?);
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));

        let auth = self.signer.authorization(&method, &url, &headers)?;
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&auth)?);

        let res = self.http.request(method, url).headers(headers).send()?;

        log::trace!("azure response: {:?}", res);

        if res.status().is_success() {
            Ok(res)
        } else {
            Err(rejection(res))
        }
    }
}

impl BlobStore for AzureBlobStore {
    fn create_container(&self, container: &str) -> Result<(), StorageError> {
        let mut url = self.container_url(container);
        url.query_pairs_mut().append_pair("restype", "container");

        self.send_signed(Method::PUT, url)?;

        Ok(())
    }

    fn upload_blob(
        &self,
        container: &str,
        path: &str,
        content: Vec<u8>,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        let client = self.container_client(container)?;
        let location = Path::from(path);

        let opts = PutOptions {
            mode: if overwrite {
                PutMode::Overwrite
            } else {
                PutMode::Create
            },
            attributes: Attributes::from_iter([(
                Attribute::ContentType,
                AttributeValue::from(CSV_CONTENT_TYPE),
            )]),
            ..Default::default()
        };

        let result = self.runtime.block_on(async move {
            client
                .put_opts(&location, PutPayload::from(content), opts)
                .await
        });

        match result {
            Ok(_) => Ok(()),
            Err(object_store::Error::AlreadyExists { path, .. }) => {
                Err(StorageError::AlreadyExists(path))
            }
            Err(err) => Err(StorageError::ObjectStore(err)),
        }
    }
}

fn default_endpoint(account: &str) -> String {
    format!("https://{account}.blob.core.windows.net")
}

fn rejection(res: Response) -> StorageError {
    let status = res.status();

    let code = res
        .headers()
        .get("x-ms-error-code")
        .and_then(|x| x.to_str().ok())
        .map(String::from);

    if status == StatusCode::CONFLICT && code.as_deref() == Some(CONTAINER_EXISTS_CODE) {
        return StorageError::AlreadyExists(CONTAINER_EXISTS_CODE.to_string());
    }

    let message = res.text().unwrap_or_default();

    StorageError::Rejected {
        status: status.as_u16(),
        code,
        message,
    }
}
