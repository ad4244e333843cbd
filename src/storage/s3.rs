//! S3 storage backend (§4.2, §6 "S3 wire protocol").
//!
//! Requests are signed with AWS SigV4 by hand (canonical request ->
//! string-to-sign -> HMAC-SHA256 chain); the core stays synchronous (§5), so
//! this uses `reqwest::blocking` rather than the async AWS SDK.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{err, ErrorKind, Result};
use crate::storage::write::RemoteSink;
use crate::storage::{InfoLevel, NewWriteOptions, Storage, StorageFeature, StorageInfo, StorageRead, StorageType, StorageWrite};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct S3Storage {
    client: reqwest::blocking::Client,
    endpoint: String,
    bucket: String,
    region: String,
    key_prefix: String,
    access_key: String,
    secret_key: String,
}

impl S3Storage {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>, region: impl Into<String>, key_prefix: impl Into<String>, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        S3Storage {
            client: reqwest::blocking::Client::new(),
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            region: region.into(),
            key_prefix: key_prefix.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    fn object_key(&self, path: &str) -> String {
        let rest = path.trim_start_matches('/');
        if self.key_prefix.is_empty() {
            rest.to_string()
        } else {
            format!("{}/{}", self.key_prefix.trim_end_matches('/'), rest)
        }
    }

    /// SigV4 signature per AWS's published algorithm, scoped to `s3`.
    fn sign(&self, method: &str, key: &str, query: &str, payload_hash: &str, timestamp: &str, headers: &[(&str, String)]) -> String {
        let date = &timestamp[..8];

        let mut sorted_headers = headers.to_vec();
        sorted_headers.sort_by(|a, b| a.0.cmp(b.0));
        let canonical_headers: String = sorted_headers.iter().map(|(k, v)| format!("{}:{}\n", k.to_lowercase(), v.trim())).collect();
        let signed_headers: String = sorted_headers.iter().map(|(k, _)| k.to_lowercase()).collect::<Vec<_>>().join(";");

        let canonical_request = format!("{}\n/{}\n{}\n{}\n{}\n{}", method, key, query, canonical_headers, signed_headers, payload_hash);

        let scope = format!("{}/{}/s3/aws4_request", date, self.region);
        let string_to_sign = format!("AWS4-HMAC-SHA256\n{}\n{}\n{}", timestamp, scope, hex::encode(Sha256::digest(canonical_request.as_bytes())));

        let k_date = hmac_bytes(format!("AWS4{}", self.secret_key).as_bytes(), date.as_bytes());
        let k_region = hmac_bytes(&k_date, self.region.as_bytes());
        let k_service = hmac_bytes(&k_region, b"s3");
        let k_signing = hmac_bytes(&k_service, b"aws4_request");

        hex::encode(hmac_bytes(&k_signing, string_to_sign.as_bytes()))
    }

    fn authorization(&self, method: &str, key: &str, query: &str, payload: &[u8], timestamp: &str, host: &str) -> (String, String) {
        let payload_hash = hex::encode(Sha256::digest(payload));
        let headers = [("host", host.to_string()), ("x-amz-content-sha256", payload_hash.clone()), ("x-amz-date", timestamp.to_string())];
        let signature = self.sign(method, key, query, &payload_hash, timestamp, &headers);
        let date = &timestamp[..8];
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";
        let auth = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}/{}/s3/aws4_request, SignedHeaders={}, Signature={}",
            self.access_key, date, self.region, signed_headers, signature
        );
        (auth, payload_hash)
    }

    fn request(&self, method: reqwest::Method, key: &str, query: &str, body: Vec<u8>) -> Result<reqwest::blocking::Response> {
        let timestamp = iso8601_basic_now();
        let host = format!("{}.{}", self.bucket, self.endpoint.trim_start_matches("https://").trim_start_matches("http://"));
        let (auth, payload_hash) = self.authorization(method.as_str(), key, query, &body, &timestamp, &host);

        let url = if query.is_empty() {
            format!("https://{}/{}", host, key)
        } else {
            format!("https://{}/{}?{}", host, key, query)
        };

        let resp = self
            .client
            .request(method, &url)
            .header("host", host)
            .header("x-amz-date", &timestamp)
            .header("x-amz-content-sha256", payload_hash)
            .header("authorization", auth)
            .body(body)
            .send()
            .map_err(|e| err!(ErrorKind::ProtocolError, "s3 request failed: {}", e))?;
        Ok(resp)
    }
}

fn hmac_bytes(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// `chrono`-free basic ISO8601 timestamp (`YYYYMMDDTHHMMSSZ`) via `chrono`
/// for UTC formatting, matching the wire format AWS requires.
fn iso8601_basic_now() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}

/// Turn a repository list-prefix regex into a literal prefix to narrow the
/// S3 `list-type=2` request before client-side filtering (§6 "S3 wire
/// protocol" / grounded on the original's prefix-hoisting optimization).
pub fn hoist_literal_prefix(pattern: &str) -> String {
    pattern.chars().take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_' || *c == '/' || *c == '.').collect()
}

impl Storage for S3Storage {
    const FEATURES: StorageFeature = StorageFeature::NONE;

    fn info(&self, path: &str, level: InfoLevel, _follow_link: bool) -> Result<StorageInfo> {
        let key = self.object_key(path);
        let resp = self.request(reqwest::Method::HEAD, &key, "", Vec::new())?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(StorageInfo::missing());
        }
        if !resp.status().is_success() {
            return Err(err!(ErrorKind::FileOpenError, "s3 head object failed: {}", resp.status()));
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
        let prefix = self.object_key(path);
        let prefix = if prefix.is_empty() { prefix } else { format!("{}/", prefix.trim_end_matches('/')) };

        let mut out = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = format!("list-type=2&delimiter=%2F&prefix={}", urlencode(&prefix));
            if let Some(token) = &continuation {
                query.push_str(&format!("&continuation-token={}", urlencode(token)));
            }

            let resp = self.request(reqwest::Method::GET, "", &query, Vec::new())?;
            if !resp.status().is_success() {
                return Err(err!(ErrorKind::PathOpenError, "s3 list-objects failed: {}", resp.status()));
            }
            let body = resp.text().map_err(|e| err!(ErrorKind::ProtocolError, "s3 response read failed: {}", e))?;
            let (entries, next_token) = parse_list_bucket_result(&body, &prefix)?;
            for name in entries {
                out.push((name, StorageInfo { exists: true, file_type: Some(StorageType::File), ..Default::default() }));
            }
            match next_token {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        if level == InfoLevel::Exists {
            return Ok(out);
        }
        Ok(out)
    }

    fn new_read(&self, path: &str, ignore_missing: bool, offset: u64, limit: Option<u64>) -> Result<StorageRead> {
        let key = self.object_key(path);
        let resp = self.request(reqwest::Method::GET, &key, "", Vec::new())?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            if ignore_missing {
                return Ok(StorageRead::from_bytes(Vec::new()));
            }
            return Err(err!(ErrorKind::FileMissingError, "s3 object missing: {}", key));
        }
        if !resp.status().is_success() {
            return Err(err!(ErrorKind::FileOpenError, "s3 get object failed: {}", resp.status()));
        }
        let data = resp.bytes().map_err(|e| err!(ErrorKind::FileReadError, "s3 body read failed: {}", e))?.to_vec();
        let end = limit.map(|l| (offset + l) as usize).unwrap_or(data.len()).min(data.len());
        let start = (offset as usize).min(data.len());
        Ok(StorageRead::from_bytes(data[start..end].to_vec()))
    }

    fn new_write(&self, path: &str, _options: &NewWriteOptions) -> Result<StorageWrite> {
        // Object PUTs are single-shot requests, not incremental streams;
        // buffer the whole object in memory and issue one SigV4-signed PUT
        // on close. A real upstream would switch to the multipart
        // initiate/UploadPart/CompleteMultipartUpload flow above some size
        // threshold; not needed at this crate's scale.
        let key = self.object_key(path);
        Ok(StorageWrite::new_remote(Box::new(self.clone()), key))
    }

    fn path_create(&self, _path: &str, _error_on_exists: bool, _no_parent_create: bool, _mode: u32) -> Result<()> {
        // S3 has no directories; paths exist only as key prefixes.
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
        let key = self.object_key(path);
        let resp = self.request(reqwest::Method::DELETE, &key, "", Vec::new())?;
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(());
        }
        if resp.status() == reqwest::StatusCode::NOT_FOUND && !error_on_missing {
            return Ok(());
        }
        Err(err!(ErrorKind::FileRemoveError, "s3 delete object failed: {}", resp.status()))
    }
}

impl RemoteSink for S3Storage {
    fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let resp = self.request(reqwest::Method::PUT, key, "", body)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(err!(ErrorKind::FileWriteError, "s3 put object failed: {}", resp.status()))
        }
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Pull `<Key>`/`<Prefix>` entry names and the next continuation token out
/// of a `ListBucketResult` XML body, trimming the common prefix.
fn parse_list_bucket_result(body: &str, prefix: &str) -> Result<(Vec<String>, Option<String>)> {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut names = Vec::new();
    let mut next_token = None;
    let mut in_key = false;
    let mut in_token = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| err!(ErrorKind::FormatError, "s3 list response parse failed: {}", e))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"Key" => in_key = true,
                b"NextContinuationToken" => in_token = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"Key" => in_key = false,
                b"NextContinuationToken" => in_token = false,
                _ => {}
            },
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| err!(ErrorKind::FormatError, "s3 list response decode failed: {}", e))?.to_string();
                if in_key {
                    if let Some(rest) = text.strip_prefix(prefix) {
                        if !rest.is_empty() {
                            names.push(rest.to_string());
                        }
                    }
                } else if in_token {
                    next_token = Some(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok((names, next_token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hoist_stops_at_regex_metacharacters() {
        assert_eq!(hoist_literal_prefix("backup/2024.*"), "backup/2024.");
        assert_eq!(hoist_literal_prefix("[0-9]+"), "");
    }

    #[test]
    fn list_bucket_result_strips_prefix_and_finds_token() {
        let body = r#"<?xml version="1.0"?>
<ListBucketResult>
  <Contents><Key>archive/9.6-1/000000010000000000000001</Key></Contents>
  <Contents><Key>archive/9.6-1/000000010000000000000002</Key></Contents>
  <NextContinuationToken>abc123</NextContinuationToken>
</ListBucketResult>"#;
        let (names, token) = parse_list_bucket_result(body, "archive/9.6-1/").unwrap();
        assert_eq!(names, vec!["000000010000000000000001", "000000010000000000000002"]);
        assert_eq!(token.as_deref(), Some("abc123"));
    }
}
