// ArcGIS portal client over the sharing REST API

use super::{Folder, GisClient, GisError, ItemDefinition, ItemDescriptor};
use crate::config::{PortalConfig, PortalCredentials};
use async_trait::async_trait;
use reqwest::header::REFERER;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Lifetime requested for generated tokens, in minutes
const TOKEN_EXPIRATION_MINUTES: u32 = 120;

/// Portal client authenticated as one user
pub struct PortalClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    /// Generated tokens are bound to this referer and must be presented with it
    referer: String,
    max_items: usize,
}

impl std::fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalClient")
            .field("base_url", &self.base_url)
            .field("max_items", &self.max_items)
            .finish()
    }
}

impl PortalClient {
    /// Build the HTTP client and sign in
    ///
    /// Password credentials are exchanged for a token through `generateToken`; any failure
    /// here is reported as [`GisError::Auth`].
    pub async fn connect(config: &PortalConfig) -> Result<Self, GisError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let token = match &config.credentials {
            PortalCredentials::Token(token) => token.clone(),
            PortalCredentials::Password(password) => {
                generate_token(&http, &config.url, &config.username, password).await?
            }
        };

        info!(portal = %config.url, username = %config.username, "Signed in to portal");

        Ok(Self {
            http,
            base_url: config.url.clone(),
            token,
            referer: config.url.clone(),
            max_items: config.max_items,
        })
    }

    fn request(&self, url: Url, query: &[(&str, String)]) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("X-Esri-Authorization", format!("Bearer {}", self.token))
            .header(REFERER, &self.referer)
            .query(&[("f", "json")])
            .query(query)
    }

    async fn get_bytes(&self, url: Url, query: &[(&str, String)]) -> Result<Vec<u8>, GisError> {
        debug!(path = %url.path(), "Portal request");

        let response = self.request(url, query).send().await?;

        let response = check_status(response)?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn get_json(&self, url: Url, query: &[(&str, String)]) -> Result<Value, GisError> {
        let path = url.path().to_string();
        let body = self.get_bytes(url, query).await?;
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| GisError::Malformed(format!("{}: {}", path, e)))?;
        check_portal_error(value)
    }
}

#[async_trait]
impl GisClient for PortalClient {
    async fn list_folders(&self, account: &str) -> Result<Vec<Folder>, GisError> {
        let url = rest_url(&self.base_url, &["content", "users", account])?;
        let value = self.get_json(url, &[("num", "1".to_string())]).await?;
        parse_folders(value)
    }

    async fn list_items(&self, account: &str, folder: &Folder) -> Result<Vec<ItemDescriptor>, GisError> {
        let mut items = Vec::new();
        let mut start: i64 = 1;

        loop {
            let url = rest_url(&self.base_url, &["content", "users", account, &folder.id])?;
            let value = self
                .get_json(
                    url,
                    &[
                        ("start", start.to_string()),
                        ("num", self.max_items.to_string()),
                    ],
                )
                .await?;
            let page = parse_item_page(value)?;
            items.extend(page.items);

            if page.next_start <= start {
                break;
            }
            start = page.next_start;
        }

        debug!(account = %account, folder = %folder.title, count = items.len(), "Listed folder items");
        Ok(items)
    }

    async fn get_item_definition(&self, item_id: &str) -> Result<ItemDefinition, GisError> {
        let info = self
            .get_json(rest_url(&self.base_url, &["content", "items", item_id])?, &[])
            .await?;
        let title = parse_item_title(item_id, &info)?;

        let body = self
            .get_bytes(rest_url(&self.base_url, &["content", "items", item_id, "data"])?, &[])
            .await?;
        let data = parse_item_data(item_id, &body)?;

        Ok(ItemDefinition { title, data })
    }
}

async fn generate_token(
    http: &reqwest::Client,
    base_url: &str,
    username: &str,
    password: &str,
) -> Result<String, GisError> {
    let url = rest_url(base_url, &["generateToken"])?;
    let expiration = TOKEN_EXPIRATION_MINUTES.to_string();

    let response = http
        .post(url)
        .form(&[
            ("username", username),
            ("password", password),
            ("client", "referer"),
            ("referer", base_url),
            ("expiration", expiration.as_str()),
            ("f", "json"),
        ])
        .send()
        .await
        .map_err(|e| GisError::Auth(format!("token request failed: {}", e)))?;

    let body = response
        .error_for_status()
        .map_err(|e| GisError::Auth(format!("token request rejected: {}", e)))?
        .bytes()
        .await
        .map_err(|e| GisError::Auth(format!("token response unreadable: {}", e)))?;

    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| GisError::Auth(format!("token response is not JSON: {}", e)))?;
    parse_token(value)
}

fn rest_url(base_url: &str, segments: &[&str]) -> Result<Url, GisError> {
    let mut url = Url::parse(base_url).map_err(|e| GisError::InvalidUrl(format!("{}: {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| GisError::InvalidUrl(base_url.to_string()))?
        .pop_if_empty()
        .extend(["sharing", "rest"].iter().chain(segments.iter()));
    Ok(url)
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GisError> {
    let path = response.url().path().to_string();
    match response.status() {
        StatusCode::NOT_FOUND => Err(GisError::NotFound(path)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GisError::Forbidden(path)),
        _ => Ok(response.error_for_status()?),
    }
}

#[derive(Debug, Deserialize)]
struct PortalErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<String>,
}

/// The portal reports most failures as `{"error": {...}}` with an HTTP 200
fn check_portal_error(value: Value) -> Result<Value, GisError> {
    if !value.get("error").map_or(false, Value::is_object) {
        return Ok(value);
    }
    let body: PortalErrorBody = serde_json::from_value(value["error"].clone())
        .map_err(|e| GisError::Malformed(format!("unreadable error body: {}", e)))?;

    let mut message = body.message;
    if !body.details.is_empty() {
        message = format!("{} ({})", message, body.details.join("; "));
    }
    let lowered = message.to_lowercase();

    Err(match body.code {
        404 => GisError::NotFound(message),
        400 if lowered.contains("does not exist") || lowered.contains("not found") => {
            GisError::NotFound(message)
        }
        403 | 498 | 499 => GisError::Forbidden(message),
        code => GisError::Api { code, message },
    })
}

fn parse_token(value: Value) -> Result<String, GisError> {
    if let Err(e) = check_portal_error(value.clone()) {
        return Err(GisError::Auth(e.to_string()));
    }
    value
        .get("token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GisError::Auth("token response has no token".to_string()))
}

#[derive(Debug, Deserialize)]
struct UserContent {
    #[serde(default)]
    folders: Vec<Folder>,
}

fn parse_folders(value: Value) -> Result<Vec<Folder>, GisError> {
    let content: UserContent = serde_json::from_value(value)
        .map_err(|e| GisError::Malformed(format!("user content: {}", e)))?;
    Ok(content.folders)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemPage {
    #[serde(default)]
    items: Vec<ItemDescriptor>,
    #[serde(default = "last_page")]
    next_start: i64,
}

fn last_page() -> i64 {
    -1
}

fn parse_item_page(value: Value) -> Result<ItemPage, GisError> {
    serde_json::from_value(value).map_err(|e| GisError::Malformed(format!("folder items: {}", e)))
}

fn parse_item_title(item_id: &str, info: &Value) -> Result<String, GisError> {
    info.get("title")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GisError::Malformed(format!("item {} has no title", item_id)))
}

/// Items without data answer with an empty body
fn parse_item_data(item_id: &str, body: &[u8]) -> Result<Value, GisError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(GisError::Malformed(format!("item {} has no definition", item_id)));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| GisError::Malformed(format!("item {} definition is not JSON: {}", item_id, e)))?;
    if value.is_null() {
        warn!(item_id = %item_id, "Portal returned a null definition");
        return Err(GisError::Malformed(format!("item {} has no definition", item_id)));
    }
    check_portal_error(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_rest_url() {
        let url = rest_url("https://example.maps.arcgis.com", &["content", "users", "gis admin"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.maps.arcgis.com/sharing/rest/content/users/gis%20admin"
        );

        let url = rest_url("https://gis.example.com/portal", &["generateToken"]).unwrap();
        assert_eq!(url.as_str(), "https://gis.example.com/portal/sharing/rest/generateToken");

        assert!(matches!(rest_url("not a url", &[]), Err(GisError::InvalidUrl(_))));
    }

    #[test]
    fn test_requests_carry_token_and_referer() {
        let client = PortalClient {
            http: reqwest::Client::new(),
            base_url: "https://example.maps.arcgis.com".to_string(),
            token: "tok".to_string(),
            referer: "https://example.maps.arcgis.com".to_string(),
            max_items: 100,
        };
        let url = rest_url(&client.base_url, &["content", "users", "gis_admin"]).unwrap();

        let request = client
            .request(url, &[("num", "1".to_string())])
            .build()
            .unwrap();

        let headers = request.headers();
        assert_eq!(headers.get(REFERER).unwrap(), "https://example.maps.arcgis.com");
        assert_eq!(headers.get("X-Esri-Authorization").unwrap(), "Bearer tok");
        assert_eq!(request.url().query(), Some("f=json&num=1"));
    }

    #[test]
    fn test_parse_token() {
        let token = parse_token(json!({"token": "abc", "expires": 1700000000000u64, "ssl": true})).unwrap();
        assert_eq!(token, "abc");

        let err = parse_token(json!({
            "error": {"code": 400, "message": "Unable to generate token.", "details": ["Invalid username or password."]}
        }))
        .unwrap_err();
        assert!(matches!(err, GisError::Auth(ref m) if m.contains("Invalid username or password")));

        assert!(matches!(parse_token(json!({})), Err(GisError::Auth(_))));
    }

    #[test]
    fn test_parse_folders() {
        let folders = parse_folders(json!({
            "username": "gis_admin",
            "total": 0,
            "items": [],
            "folders": [
                {"username": "gis_admin", "id": "f1", "title": "Badger Sightings Survey", "created": 1676419200000u64},
                {"username": "gis_admin", "id": "f2", "title": "Scratch", "created": 1676419200000u64}
            ]
        }))
        .unwrap();

        assert_eq!(
            folders,
            vec![
                Folder::new("f1", "Badger Sightings Survey"),
                Folder::new("f2", "Scratch"),
            ]
        );
        assert!(parse_folders(json!({"username": "x"})).unwrap().is_empty());
    }

    #[test]
    fn test_parse_item_page() {
        let page = parse_item_page(json!({
            "total": 3,
            "start": 1,
            "num": 2,
            "nextStart": 3,
            "items": [
                {"id": "abc123", "type": "Web Map", "title": "Sightings Map", "owner": "gis_admin"},
                {"id": "def456", "type": "Feature Service", "title": "Sightings", "owner": "gis_admin"}
            ]
        }))
        .unwrap();

        assert_eq!(page.next_start, 3);
        assert_eq!(page.items[0], ItemDescriptor::new("abc123", "Web Map", "Sightings Map"));
        assert_eq!(page.items[1].item_type, "Feature Service");

        let last = parse_item_page(json!({"items": [], "nextStart": -1})).unwrap();
        assert_eq!(last.next_start, -1);
        assert_eq!(parse_item_page(json!({})).unwrap().next_start, -1);
    }

    #[test]
    fn test_portal_error_mapping() {
        let err = check_portal_error(json!({
            "error": {"code": 400, "message": "Item does not exist or is inaccessible.", "details": []}
        }))
        .unwrap_err();
        assert!(matches!(err, GisError::NotFound(_)));

        let err = check_portal_error(json!({"error": {"code": 498, "message": "Invalid token."}})).unwrap_err();
        assert!(matches!(err, GisError::Forbidden(_)));

        let err = check_portal_error(json!({"error": {"code": 500, "message": "boom"}})).unwrap_err();
        assert!(matches!(err, GisError::Api { code: 500, .. }));

        let ok = check_portal_error(json!({"title": "fine"})).unwrap();
        assert_eq!(ok["title"], "fine");
    }

    #[test]
    fn test_parse_item_data() {
        let data = parse_item_data("abc123", br#"{"operationalLayers": [], "version": "2.28"}"#).unwrap();
        assert_eq!(data["version"], "2.28");

        assert!(matches!(parse_item_data("abc123", b""), Err(GisError::Malformed(_))));
        assert!(matches!(parse_item_data("abc123", b"  \n"), Err(GisError::Malformed(_))));
        assert!(matches!(parse_item_data("abc123", b"null"), Err(GisError::Malformed(_))));
        assert!(matches!(parse_item_data("abc123", b"<html>"), Err(GisError::Malformed(_))));
        assert!(matches!(
            parse_item_data("abc123", br#"{"error": {"code": 403, "message": "denied"}}"#),
            Err(GisError::Forbidden(_))
        ));
    }

    #[test]
    fn test_parse_item_title() {
        assert_eq!(parse_item_title("a", &json!({"title": "Sightings Map"})).unwrap(), "Sightings Map");
        assert!(parse_item_title("a", &json!({"id": "a"})).is_err());
    }
}
