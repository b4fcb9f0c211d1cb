//! Request module - parameter extraction for handlers.
//!
//! Handlers never look at raw bodies. [`Params::from_request`] merges the
//! query string with a form body (`x-www-form-urlencoded`, `multipart/form-data`
//! or a flat JSON object) into one lookup table, and collects file parts.

use crate::errors::AppError;
use crate::response::ApiResult;
use crate::upload::{UploadError, UploadedFile};
use bytes::Bytes;
use futures::TryStreamExt;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use hyper::{Body, Request};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;

/// Name of the token parameter.
pub const TOKEN_PARAM: &str = "encode_jwt";

/// Peer address of the connection, stored in request extensions by the server.
#[derive(Debug, Clone, Copy)]
pub struct RemoteAddr(pub SocketAddr);

/// Who sent a request, for fault logging.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub addr: Option<SocketAddr>,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn from_request(req: &Request<Body>) -> Self {
        Self {
            addr: req.extensions().get::<RemoteAddr>().map(|r| r.0),
            user_agent: req
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string(),
        }
    }

    pub fn addr_display(&self) -> String {
        self.addr
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}

/// Parsed request parameters.
#[derive(Debug, Default, Clone)]
pub struct Params {
    fields: HashMap<String, String>,
    files: Vec<UploadedFile>,
    bearer: Option<String>,
}

impl Params {
    /// Build from key/value pairs (tests, internal callers).
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Default::default()
        }
    }

    /// Consume the request and parse its parameters. Bodies larger than
    /// `max_body_bytes` are rejected.
    pub async fn from_request(req: Request<Body>, max_body_bytes: usize) -> ApiResult<Self> {
        let (parts, body) = req.into_parts();

        let mut params = Params::default();
        if let Some(query) = parts.uri.query() {
            params.extend_urlencoded(query.as_bytes());
        }
        params.bearer = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string());

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let bytes = read_body(body, max_body_bytes).await?;
        if bytes.is_empty() {
            return Ok(params);
        }

        if content_type.starts_with("application/x-www-form-urlencoded") {
            params.extend_urlencoded(&bytes);
        } else if content_type.starts_with("multipart/form-data") {
            let boundary = multer::parse_boundary(&content_type)
                .map_err(|e| AppError::from(UploadError::Multipart(e)))?;
            params.extend_multipart(bytes, boundary).await?;
        } else if content_type.starts_with("application/json") {
            params.extend_json(&bytes)?;
        }

        Ok(params)
    }

    fn extend_urlencoded(&mut self, raw: &[u8]) {
        for (key, value) in url::form_urlencoded::parse(raw) {
            self.fields.insert(key.into_owned(), value.into_owned());
        }
    }

    async fn extend_multipart(&mut self, bytes: Bytes, boundary: String) -> ApiResult<()> {
        let stream = futures::stream::once(async move { Ok::<Bytes, Infallible>(bytes) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(UploadError::Multipart)?
        {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field
                        .content_type()
                        .map(|ct| ct.to_string())
                        .unwrap_or_else(|| "application/octet-stream".to_string());
                    let data = field.bytes().await.map_err(UploadError::Multipart)?;
                    self.files.push(UploadedFile {
                        field_name: name,
                        filename,
                        content_type,
                        data,
                    });
                }
                None => {
                    let text = field.text().await.map_err(UploadError::Multipart)?;
                    self.fields.insert(name, text);
                }
            }
        }
        Ok(())
    }

    /// Flat JSON objects only; nested values are kept as their JSON text.
    fn extend_json(&mut self, raw: &[u8]) -> ApiResult<()> {
        let value: serde_json::Value = serde_json::from_slice(raw)
            .map_err(|e| AppError::bad_request(format!("malformed json body: {}", e)))?;
        let object = match value {
            serde_json::Value::Object(object) => object,
            _ => return Err(AppError::bad_request("json body must be an object")),
        };
        for (key, value) in object {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => continue,
                other => other.to_string(),
            };
            self.fields.insert(key, text);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Value of `name` if present and not empty.
    pub fn non_empty(&self, name: &str) -> Option<String> {
        self.get(name)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// 400 `missing parameter <name>` when absent or empty.
    pub fn require(&self, name: &str) -> ApiResult<&str> {
        self.get(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::bad_request(format!("missing parameter {}", name)))
    }

    /// Session token: the `encode_jwt` parameter, else a bearer header.
    pub fn token(&self) -> Option<&str> {
        self.get(TOKEN_PARAM)
            .filter(|t| !t.is_empty())
            .or(self.bearer.as_deref())
    }

    /// The file part named `field`.
    pub fn file(&self, field: &'static str) -> ApiResult<&UploadedFile> {
        self.optional_file(field)
            .ok_or_else(|| UploadError::MissingFile(field).into())
    }

    pub fn optional_file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field_name == field)
    }
}

/// Buffer the whole body, failing once it grows past `max_bytes`.
async fn read_body(body: Body, max_bytes: usize) -> ApiResult<Bytes> {
    let mut collected = Vec::new();
    let mut stream = body;
    while let Some(chunk) = stream
        .try_next()
        .await
        .map_err(|e| AppError::bad_request(format!("failed to read request body: {}", e)))?
    {
        collected.extend_from_slice(&chunk);
        if collected.len() > max_bytes {
            return Err(UploadError::FileTooLarge(max_bytes).into());
        }
    }
    Ok(Bytes::from(collected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::StatusCode;

    const LIMIT: usize = 1024 * 1024;

    #[tokio::test]
    async fn test_query_params() {
        let req = Request::get("/api/existEmail/?user_email=a%40x.com&encode_jwt=tok")
            .body(Body::empty())
            .unwrap();
        let params = Params::from_request(req, LIMIT).await.unwrap();
        assert_eq!(params.get("user_email"), Some("a@x.com"));
        assert_eq!(params.token(), Some("tok"));
    }

    #[tokio::test]
    async fn test_urlencoded_body_overrides_query() {
        let req = Request::post("/api/userLogin/?user_email=old%40x.com")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("user_email=new%40x.com&user_password=abc+def1"))
            .unwrap();
        let params = Params::from_request(req, LIMIT).await.unwrap();
        assert_eq!(params.get("user_email"), Some("new@x.com"));
        assert_eq!(params.get("user_password"), Some("abc def1"));
    }

    #[tokio::test]
    async fn test_bearer_header_fallback() {
        let req = Request::get("/api/checkJwtToken/")
            .header(AUTHORIZATION, "Bearer header-token")
            .body(Body::empty())
            .unwrap();
        let params = Params::from_request(req, LIMIT).await.unwrap();
        assert_eq!(params.token(), Some("header-token"));

        let req = Request::get("/api/checkJwtToken/?encode_jwt=param-token")
            .header(AUTHORIZATION, "Bearer header-token")
            .body(Body::empty())
            .unwrap();
        let params = Params::from_request(req, LIMIT).await.unwrap();
        assert_eq!(params.token(), Some("param-token"));
    }

    #[tokio::test]
    async fn test_multipart_fields_and_files() {
        let body = "--XBOUNDARY\r\n\
            Content-Disposition: form-data; name=\"encode_jwt\"\r\n\r\n\
            tok\r\n\
            --XBOUNDARY\r\n\
            Content-Disposition: form-data; name=\"profile_photo\"; filename=\"me.png\"\r\n\
            Content-Type: image/png\r\n\r\n\
            PNGDATA\r\n\
            --XBOUNDARY--\r\n";
        let req = Request::post("/api/editUserProfilePicture/")
            .header(CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap();
        let params = Params::from_request(req, LIMIT).await.unwrap();

        assert_eq!(params.token(), Some("tok"));
        let file = params.file("profile_photo").unwrap();
        assert_eq!(file.filename, "me.png");
        assert_eq!(file.content_type, "image/png");
        assert_eq!(&file.data[..], b"PNGDATA");

        let err = params.file("audio").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_json_body() {
        let req = Request::post("/api/createSongList/")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"title":"Road trip","private":true,"cover":null}"#))
            .unwrap();
        let params = Params::from_request(req, LIMIT).await.unwrap();
        assert_eq!(params.get("title"), Some("Road trip"));
        assert_eq!(params.get("private"), Some("true"));
        assert_eq!(params.get("cover"), None);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let req = Request::post("/api/userLogin/")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(vec![b'a'; 64]))
            .unwrap();
        let err = Params::from_request(req, 16).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_require_and_non_empty() {
        let params = Params::from_pairs([("a", "1"), ("b", "")]);
        assert_eq!(params.require("a").unwrap(), "1");
        assert!(params.require("b").is_err());
        assert!(params.require("c").is_err());
        assert_eq!(params.non_empty("b"), None);
        assert_eq!(params.non_empty("a"), Some("1".to_string()));
        assert_eq!(params.token(), None);
    }
}
