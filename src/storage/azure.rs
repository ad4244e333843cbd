//! Azure Blob Storage backend (§4.2), parity with `s3.rs`: a blocking
//! `reqwest` client signing requests with Azure's Shared Key scheme instead
//! of pulling in the async `azure_core`/`azure_storage` stack.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{err, ErrorKind, Result};
use crate::storage::write::RemoteSink;
use crate::storage::{InfoLevel, NewWriteOptions, Storage, StorageFeature, StorageInfo, StorageRead, StorageType, StorageWrite};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct AzureStorage {
    client: reqwest::blocking::Client,
    account: String,
    container: String,
    key_prefix: String,
    account_key: Vec<u8>,
}

impl AzureStorage {
    pub fn new(account: impl Into<String>, container: impl Into<String>, key_prefix: impl Into<String>, account_key_base64: &str) -> Result<Self> {
        let account_key = base64::engine::general_purpose::STANDARD
            .decode(account_key_base64)
            .map_err(|e| err!(ErrorKind::OptionInvalidValueError, "invalid azure account key: {}", e))?;
        Ok(AzureStorage { client: reqwest::blocking::Client::new(), account: account.into(), container: container.into(), key_prefix: key_prefix.into(), account_key })
    }

    fn blob_path(&self, path: &str) -> String {
        let rest = path.trim_start_matches('/');
        if self.key_prefix.is_empty() {
            rest.to_string()
        } else {
            format!("{}/{}", self.key_prefix.trim_end_matches('/'), rest)
        }
    }

    fn host(&self) -> String {
        format!("{}.blob.core.windows.net", self.account)
    }

    /// Shared Key authorization per Azure's `StringToSign` layout for Blob
    /// Storage (method, content headers, canonicalized x-ms headers, resource).
    fn authorize(&self, method: &str, blob: &str, content_length: usize, date: &str, extra_headers: &[(&str, &str)]) -> String {
        let canonicalized_headers: String = {
            let mut hdrs: Vec<&(&str, &str)> = extra_headers.iter().filter(|(k, _)| k.starts_with("x-ms-")).collect();
            hdrs.sort_by_key(|(k, _)| *k);
            hdrs.iter().map(|(k, v)| format!("{}:{}\n", k, v)).collect()
        };
        let canonicalized_resource = format!("/{}/{}/{}", self.account, self.container, blob);

        let content_length_str = if content_length == 0 { String::new() } else { content_length.to_string() };
        let string_to_sign = format!(
            "{}\n\n\n{}\n\n\n\n\n\n\n\n\n{}x-ms-date:{}\n{}",
            method, content_length_str, canonicalized_headers, date, canonicalized_resource
        );

        let mut mac = HmacSha256::new_from_slice(&self.account_key).expect("HMAC accepts any key length");
        mac.update(string_to_sign.as_bytes());
        let signature = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        format!("SharedKey {}:{}", self.account, signature)
    }

    fn request(&self, method: reqwest::Method, blob: &str, query: &str, body: Vec<u8>, extra_headers: &[(&str, &str)]) -> Result<reqwest::blocking::Response> {
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let auth = self.authorize(method.as_str(), blob, body.len(), &date, extra_headers);

        let url = if query.is_empty() {
            format!("https://{}/{}/{}", self.host(), self.container, blob)
        } else {
            format!("https://{}/{}/{}?{}", self.host(), self.container, blob, query)
        };

        let mut req = self.client.request(method, &url).header("x-ms-date", date).header("x-ms-version", "2021-08-06").header("authorization", auth);
        for (name, value) in extra_headers {
            req = req.header(*name, *value);
        }

        req.body(body).send().map_err(|e| err!(ErrorKind::ProtocolError, "azure request failed: {}", e))
    }
}

impl Storage for AzureStorage {
    const FEATURES: StorageFeature = StorageFeature::NONE;

    fn info(&self, path: &str, level: InfoLevel, _follow_link: bool) -> Result<StorageInfo> {
        let blob = self.blob_path(path);
        let resp = self.request(reqwest::Method::HEAD, &blob, "", Vec::new(), &[])?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(StorageInfo::missing());
        }
        if !resp.status().is_success() {
            return Err(err!(ErrorKind::FileOpenError, "azure get blob properties failed: {}", resp.status()));
        }

        let mut info = StorageInfo { exists: true, file_type: Some(StorageType::File), ..Default::default() };
        if level >= InfoLevel::Basic {
            info.size = resp.content_length().unwrap_or(0);
            if let Some(lm) = resp.headers().get("last-modified").and_then(|v| v.to_str().ok()) {
                if let Ok(parsed) = chrono::DateTime::parse_from_rfc2822(lm) {
                    info.time_modified = parsed.timestamp();
                }
            }
        }
        Ok(info)
    }

    fn list(&self, path: &str, level: InfoLevel) -> Result<Vec<(String, StorageInfo)>> {
        let prefix = self.blob_path(path);
        let prefix = if prefix.is_empty() { prefix } else { format!("{}/", prefix.trim_end_matches('/')) };

        let query = format!("restype=container&comp=list&prefix={}", prefix.replace('/', "%2F"));
        let resp = self.request(reqwest::Method::GET, "", &query, Vec::new(), &[])?;
        if !resp.status().is_success() {
            return Err(err!(ErrorKind::PathOpenError, "azure list blobs failed: {}", resp.status()));
        }
        let body = resp.text().map_err(|e| err!(ErrorKind::ProtocolError, "azure response read failed: {}", e))?;
        let names = parse_enumeration_results(&body, &prefix)?;

        Ok(names
            .into_iter()
            .map(|name| {
                let info = if level == InfoLevel::Exists { StorageInfo { exists: true, ..Default::default() } } else { StorageInfo { exists: true, file_type: Some(StorageType::File), ..Default::default() } };
                (name, info)
            })
            .collect())
    }

    fn new_read(&self, path: &str, ignore_missing: bool, offset: u64, limit: Option<u64>) -> Result<StorageRead> {
        let blob = self.blob_path(path);
        let resp = self.request(reqwest::Method::GET, &blob, "", Vec::new(), &[])?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            if ignore_missing {
                return Ok(StorageRead::from_bytes(Vec::new()));
            }
            return Err(err!(ErrorKind::FileMissingError, "azure blob missing: {}", blob));
        }
        if !resp.status().is_success() {
            return Err(err!(ErrorKind::FileOpenError, "azure get blob failed: {}", resp.status()));
        }
        let data = resp.bytes().map_err(|e| err!(ErrorKind::FileReadError, "azure body read failed: {}", e))?.to_vec();
        let end = limit.map(|l| (offset + l) as usize).unwrap_or(data.len()).min(data.len());
        let start = (offset as usize).min(data.len());
        Ok(StorageRead::from_bytes(data[start..end].to_vec()))
    }

    fn new_write(&self, path: &str, _options: &NewWriteOptions) -> Result<StorageWrite> {
        // Put Blob is single-shot, like S3's PutObject: buffer the whole
        // blob and upload on close rather than staging to a temp file.
        let blob = self.blob_path(path);
        Ok(StorageWrite::new_remote(Box::new(self.clone()), blob))
    }

    fn path_create(&self, _path: &str, _error_on_exists: bool, _no_parent_create: bool, _mode: u32) -> Result<()> {
        Ok(())
    }

    fn path_remove(&self, path: &str, _recurse: bool) -> Result<bool> {
        let entries = self.list(path, InfoLevel::Exists)?;
        for (name, _) in &entries {
            self.remove(&format!("{}/{}", path.trim_end_matches('/'), name), false)?;
        }
        Ok(!entries.is_empty())
    }

    fn path_sync(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn remove(&self, path: &str, error_on_missing: bool) -> Result<()> {
        let blob = self.blob_path(path);
        let resp = self.request(reqwest::Method::DELETE, &blob, "", Vec::new(), &[])?;
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::ACCEPTED {
            return Ok(());
        }
        if resp.status() == reqwest::StatusCode::NOT_FOUND && !error_on_missing {
            return Ok(());
        }
        Err(err!(ErrorKind::FileRemoveError, "azure delete blob failed: {}", resp.status()))
    }
}

impl RemoteSink for AzureStorage {
    fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let resp = self.request(reqwest::Method::PUT, key, "", body, &[("x-ms-blob-type", "BlockBlob")])?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(err!(ErrorKind::FileWriteError, "azure put blob failed: {}", resp.status()))
        }
    }
}

/// Pull `<Blob><Name>` entries out of an `EnumerationResults` XML body,
/// trimming the common prefix (parity with `s3::parse_list_bucket_result`).
fn parse_enumeration_results(body: &str, prefix: &str) -> Result<Vec<String>> {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut names = Vec::new();
    let mut in_name = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| err!(ErrorKind::FormatError, "azure list response parse failed: {}", e))? {
            Event::Start(e) if e.local_name().as_ref() == b"Name" => in_name = true,
            Event::End(e) if e.local_name().as_ref() == b"Name" => in_name = false,
            Event::Text(t) if in_name => {
                let text = t.unescape().map_err(|e| err!(ErrorKind::FormatError, "azure list response decode failed: {}", e))?.to_string();
                if let Some(rest) = text.strip_prefix(prefix) {
                    if !rest.is_empty() {
                        names.push(rest.to_string());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumeration_results_strips_prefix() {
        let body = r#"<?xml version="1.0"?>
<EnumerationResults>
  <Blobs>
    <Blob><Name>archive/9.6-1/000000010000000000000001</Name></Blob>
    <Blob><Name>archive/9.6-1/000000010000000000000002</Name></Blob>
  </Blobs>
</EnumerationResults>"#;
        let names = parse_enumeration_results(body, "archive/9.6-1/").unwrap();
        assert_eq!(names, vec!["000000010000000000000001", "000000010000000000000002"]);
    }
}
