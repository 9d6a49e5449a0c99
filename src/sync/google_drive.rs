//! Google Drive provider - Drive API v3 over blocking reqwest.
//!
//! Authentication lives in `oauth`; this type only needs a valid access
//! token. New files go through a resumable upload session and the content
//! is streamed from disk, downloads are read in fixed-size chunks.

use super::provider::{FileQuery, Media, RemoteFile, RemoteStorage, FOLDER_MIME_TYPE};
use crate::error::{Error, Result};
use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

/// Google Drive API endpoints
const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";

const FILE_FIELDS: &str = "id,name,mimeType";
const PAGE_SIZE: &str = "1000";
const DOWNLOAD_CHUNK: usize = 256 * 1024;

/// Response from files.list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
    next_page_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewFile<'a> {
    name: &'a str,
    mime_type: &'a str,
    parents: [&'a str; 1],
}

/// Quote a value for use inside a Drive query string literal.
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Drive `q` parameter for a query. Trashed files are always excluded.
pub fn build_query(query: &FileQuery<'_>) -> String {
    let mut clauses = vec![format!("'{}' in parents", escape_query_value(query.parent))];
    if let Some(name) = query.name {
        clauses.push(format!("name = '{}'", escape_query_value(name)));
    }
    if let Some(mime) = query.mime_type {
        clauses.push(format!("mimeType = '{}'", escape_query_value(mime)));
    }
    clauses.push("trashed = false".to_string());
    clauses.join(" and ")
}

/// Google Drive storage provider
pub struct GoogleDriveProvider {
    access_token: String,
    client: Client,
}

impl GoogleDriveProvider {
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self {
            access_token: access_token.into(),
            client,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bearer {}", self.access_token))
    }

    /// Turn a non-2xx response into an error carrying the body text.
    fn check(response: Response, action: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().unwrap_or_default();
        Err(Error::storage(format!(
            "Drive API error while {}: {} - {}",
            action, status, body
        )))
    }

    fn send_media(&self, request: RequestBuilder, media: Media<'_>, mime_type: &str) -> Result<Response> {
        let body = match media {
            Media::File(path) => {
                let file = File::open(path).map_err(|e| Error::file(path, e))?;
                let len = file.metadata().map_err(|e| Error::file(path, e))?.len();
                Body::sized(file, len)
            }
            Media::Bytes(bytes) => Body::from(bytes.to_vec()),
        };
        Ok(request.header(CONTENT_TYPE, mime_type).body(body).send()?)
    }
}

impl RemoteStorage for GoogleDriveProvider {
    fn name(&self) -> &'static str {
        "google_drive"
    }

    fn root_id(&self) -> &str {
        "root"
    }

    fn find(&self, query: &FileQuery<'_>) -> Result<Vec<RemoteFile>> {
        let q = build_query(query);
        let fields = format!("nextPageToken,files({})", FILE_FIELDS);
        debug!("[GoogleDrive] files.list q={}", q);

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = vec![
                ("q", q.as_str()),
                ("fields", fields.as_str()),
                ("pageSize", PAGE_SIZE),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let response = self
                .authorized(self.client.get(DRIVE_FILES_URL))
                .query(&params)
                .send()?;
            let list: DriveFileList = Self::check(response, "listing files")?.json()?;
            files.extend(list.files);

            match list.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(files)
    }

    fn get(&self, file_id: &str) -> Result<RemoteFile> {
        let response = self
            .authorized(self.client.get(format!("{}/{}", DRIVE_FILES_URL, file_id)))
            .query(&[("fields", FILE_FIELDS)])
            .send()?;
        Ok(Self::check(response, "reading file metadata")?.json()?)
    }

    fn create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        let response = self
            .authorized(self.client.post(DRIVE_FILES_URL))
            .query(&[("fields", "id")])
            .json(&NewFile {
                name,
                mime_type: FOLDER_MIME_TYPE,
                parents: [parent_id],
            })
            .send()?;
        let folder: RemoteFile = Self::check(response, "creating folder")?.json()?;
        Ok(folder.id)
    }

    fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        media: Media<'_>,
        mime_type: &str,
    ) -> Result<String> {
        // Open a resumable session, then send the content in one request
        let response = self
            .authorized(self.client.post(DRIVE_UPLOAD_URL))
            .query(&[("uploadType", "resumable"), ("fields", FILE_FIELDS)])
            .header("X-Upload-Content-Type", mime_type)
            .json(&NewFile {
                name,
                mime_type,
                parents: [parent_id],
            })
            .send()?;
        let response = Self::check(response, "starting upload session")?;
        let session_url = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::storage("Drive did not return an upload session URL"))?
            .to_string();

        debug!("[GoogleDrive] Uploading {} ({})", name, mime_type);
        let request = self.authorized(self.client.put(session_url));
        let response = self.send_media(request, media, mime_type)?;
        let file: RemoteFile = Self::check(response, "uploading file")?.json()?;
        Ok(file.id)
    }

    fn update_file(&self, file_id: &str, media: Media<'_>, mime_type: &str) -> Result<String> {
        let url = format!("{}/{}", DRIVE_UPLOAD_URL, file_id);
        let request = self
            .authorized(self.client.patch(url))
            .query(&[("uploadType", "media"), ("fields", "id")]);
        let response = self.send_media(request, media, mime_type)?;
        let file: RemoteFile = Self::check(response, "updating file")?.json()?;
        Ok(file.id)
    }

    fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let response = self
            .authorized(self.client.get(format!("{}/{}", DRIVE_FILES_URL, file_id)))
            .query(&[("alt", "media")])
            .send()?;
        let mut response = Self::check(response, "downloading file")?;

        let mut content = Vec::new();
        let mut chunk = vec![0u8; DOWNLOAD_CHUNK];
        loop {
            let n = response
                .read(&mut chunk)
                .map_err(|e| Error::storage(format!("Download of {} interrupted: {}", file_id, e)))?;
            if n == 0 {
                break;
            }
            content.extend_from_slice(&chunk[..n]);
        }
        Ok(content)
    }
}
