//! Notion API gateway
//!
//! Blocking HTTPS client for one Notion database. Items are pages of the
//! database; deleting an item archives its page.
//! API reference: <https://developers.notion.com/reference>

use std::time::Duration;

use chrono::{Local, NaiveDate};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER,
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;

use super::schema::{ErrorBody, QueryResponse, Schema, WirePage};
use super::{Gateway, GatewayError, Page, PropertyNames, StatusNames};
use crate::domain::{FieldChanges, Item, ItemId, ListFilter, Revision};
use crate::storage::{ApiConfig, DatabaseConfig};

/// Largest page size the query endpoint accepts
const MAX_PAGE_SIZE: u32 = 100;

/// Gateway backed by a Notion database
pub struct NotionGateway {
    client: Client,
    base_url: String,
    database_id: String,
    default_icon: Option<String>,
    page_size: u32,
    schema: Schema,
}

impl NotionGateway {
    /// Builds a client for `database`
    ///
    /// # Errors
    /// Returns `Rejected` if the secret cannot be sent as a header and
    /// `Transport` if the HTTP client cannot be created.
    pub fn new(
        secret: &str,
        api: &ApiConfig,
        database: &DatabaseConfig,
        names: PropertyNames,
        statuses: StatusNames,
    ) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", secret.trim())).map_err(|_| {
            GatewayError::Rejected {
                status: 401,
                message: "API secret contains characters not allowed in a header".into(),
            }
        })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(
            HeaderName::from_static("notion-version"),
            HeaderValue::from_str(&api.version).map_err(|_| GatewayError::Rejected {
                status: 400,
                message: format!("invalid API version '{}'", api.version),
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(api.timeout_secs))
            .user_agent(concat!("life/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(transport)?;

        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            database_id: database.id.clone(),
            default_icon: database.default_icon.clone(),
            page_size: api.page_size.clamp(1, MAX_PAGE_SIZE),
            schema: Schema::new(names, statuses),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    /// Sends a request and returns the JSON body of a successful response
    ///
    /// `subject` names the page or database for `NotFound`.
    fn send(&self, request: RequestBuilder, subject: &str) -> Result<Value, GatewayError> {
        let response = request.send().map_err(transport)?;
        let status = response.status();
        debug!(status = status.as_u16(), subject, "response");

        if status.is_success() {
            return response
                .json::<Value>()
                .map_err(|e| GatewayError::Decode(e.to_string()));
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().unwrap_or_default();
        Err(classify(status, retry_after, &body, subject))
    }

    fn get_page(&self, id: &ItemId) -> Result<WirePage, GatewayError> {
        let url = self.url(&format!("/pages/{}", id));
        debug!(url = %url, "GET page");

        let body = self.send(self.client.get(&url), id.as_str())?;
        let page: WirePage =
            serde_json::from_value(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        if page.is_removed() {
            return Err(GatewayError::NotFound(id.to_string()));
        }
        Ok(page)
    }

    fn patch_page(&self, id: &ItemId, body: &Value) -> Result<Value, GatewayError> {
        let url = self.url(&format!("/pages/{}", id));
        debug!(url = %url, "PATCH page");
        self.send(self.client.patch(&url).json(body), id.as_str())
    }

    /// Makes sure the title property name is known before writing or filtering it
    ///
    /// Reads the database object once when no page has been decoded yet.
    fn ensure_title(&self) -> Result<(), GatewayError> {
        if self.schema.knows_title() {
            return Ok(());
        }
        let url = self.url(&format!("/databases/{}", self.database_id));
        debug!(url = %url, "GET database");
        let database = self.send(self.client.get(&url), &self.database_id)?;
        self.schema.learn_title_from_database(&database)
    }

    fn query_body(&self, filter: &ListFilter, cursor: Option<&str>) -> Value {
        let mut body = json!({
            "page_size": self.page_size,
            "sorts": self.schema.sorts(),
        });
        if let Some(filter) = self.schema.filter(filter) {
            body["filter"] = filter;
        }
        if let Some(cursor) = cursor {
            body["start_cursor"] = json!(cursor);
        }
        body
    }
}

impl Gateway for NotionGateway {
    fn create(&self, item: &Item) -> Result<Item, GatewayError> {
        if item.is_synced() {
            return Err(GatewayError::Rejected {
                status: 400,
                message: "item already has an identifier".into(),
            });
        }

        self.ensure_title()?;
        let mut body = json!({
            "parent": { "database_id": self.database_id },
            "properties": self.schema.create_properties(item),
        });
        if let Some(icon) = &self.default_icon {
            body["icon"] = json!({ "type": "emoji", "emoji": icon });
        }

        let url = self.url("/pages");
        debug!(url = %url, title = %item.title, "POST page");
        let created = self.send(self.client.post(&url).json(&body), &self.database_id)?;
        self.schema.decode(created, Self::today())
    }

    fn fetch(&self, id: &ItemId) -> Result<Item, GatewayError> {
        let page = self.get_page(id)?;
        self.schema.decode_page(page, Self::today())
    }

    fn update(
        &self,
        id: &ItemId,
        changes: &FieldChanges,
        expected: Option<&Revision>,
    ) -> Result<Item, GatewayError> {
        if let Some(expected) = expected {
            let current = self.get_page(id)?;
            let revision = self.schema.raw_item(&current).revision;
            if revision.as_deref() != Some(expected.as_str()) {
                debug!(id = %id, "revision moved since snapshot");
                return Err(GatewayError::Stale(id.to_string()));
            }
        }

        if changes.title.is_some() {
            self.ensure_title()?;
        }
        let body = json!({ "properties": self.schema.properties(changes) });
        let updated = self.patch_page(id, &body)?;
        self.schema.decode(updated, Self::today())
    }

    fn delete(&self, id: &ItemId) -> Result<(), GatewayError> {
        self.get_page(id)?;
        self.patch_page(id, &json!({ "archived": true }))?;
        Ok(())
    }

    fn query_page(
        &self,
        filter: &ListFilter,
        cursor: Option<&str>,
    ) -> Result<Page, GatewayError> {
        if filter.title_contains.is_some() {
            self.ensure_title()?;
        }
        let url = self.url(&format!("/databases/{}/query", self.database_id));
        let body = self.query_body(filter, cursor);
        debug!(url = %url, cursor = cursor.unwrap_or(""), "POST query");

        let response = self.send(self.client.post(&url).json(&body), &self.database_id)?;
        let response: QueryResponse =
            serde_json::from_value(response).map_err(|e| GatewayError::Decode(e.to_string()))?;

        let today = Self::today();
        let has_more = response.has_more;
        let records = response
            .results
            .into_iter()
            .map(|value| self.schema.decode(value, today))
            .filter(|record| !matches!(record, Err(GatewayError::NotFound(_))))
            .collect();

        Ok(Page {
            records,
            next_cursor: response.next_cursor.filter(|_| has_more),
        })
    }
}

fn transport(err: reqwest::Error) -> GatewayError {
    if err.is_decode() {
        GatewayError::Decode(err.to_string())
    } else {
        GatewayError::Transport(err.to_string())
    }
}

/// `Retry-After` in seconds; fractional values are accepted
fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Maps a non-success response to a gateway error
fn classify(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
    subject: &str,
) -> GatewayError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|e| {
            if e.code.is_empty() {
                e.message
            } else {
                format!("{}: {}", e.code, e.message)
            }
        })
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::NOT_FOUND => GatewayError::NotFound(subject.to_string()),
        StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited { retry_after },
        StatusCode::CONFLICT => GatewayError::Transport(format!("conflict: {}", message)),
        s if s.is_server_error() => {
            GatewayError::Transport(format!("server error {}: {}", s.as_u16(), message))
        }
        s => GatewayError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> NotionGateway {
        NotionGateway::new(
            "secret_abc",
            &ApiConfig::default(),
            &DatabaseConfig {
                id: "db123".into(),
                default_icon: None,
            },
            PropertyNames::default(),
            StatusNames::default(),
        )
        .unwrap()
    }

    #[test]
    fn not_found_names_the_subject() {
        let err = classify(StatusCode::NOT_FOUND, None, "{}", "page-1");
        assert_eq!(err, GatewayError::NotFound("page-1".into()));
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = classify(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(2)),
            r#"{"object":"error","status":429,"code":"rate_limited","message":"slow down"}"#,
            "db",
        );
        assert_eq!(
            err,
            GatewayError::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            }
        );
    }

    #[test]
    fn server_errors_and_conflicts_are_transport() {
        for status in [
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::CONFLICT,
        ] {
            let err = classify(status, None, "", "db");
            assert!(err.is_transient(), "{} should be transient", status);
        }
    }

    #[test]
    fn client_errors_are_rejections_with_the_remote_message() {
        let err = classify(
            StatusCode::UNAUTHORIZED,
            None,
            r#"{"object":"error","status":401,"code":"unauthorized","message":"API token is invalid."}"#,
            "db",
        );
        assert_eq!(
            err,
            GatewayError::Rejected {
                status: 401,
                message: "unauthorized: API token is invalid.".into()
            }
        );
    }

    #[test]
    fn retry_after_parsing() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after(" 0.5 "), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after("-1"), None);
    }

    #[test]
    fn secret_with_newline_is_rejected() {
        let result = NotionGateway::new(
            "bad\nsecret",
            &ApiConfig::default(),
            &DatabaseConfig::default(),
            PropertyNames::default(),
            StatusNames::default(),
        );
        assert!(matches!(result, Err(GatewayError::Rejected { status: 401, .. })));
    }

    #[test]
    fn query_body_includes_cursor_filter_and_sort() {
        let body = gateway().query_body(&ListFilter::open(), Some("cur-2"));

        assert_eq!(body["page_size"], json!(100));
        assert_eq!(body["start_cursor"], json!("cur-2"));
        assert_eq!(body["sorts"][0]["property"], json!("Date"));
        assert!(body["filter"]["or"].is_array());
    }

    #[test]
    fn unfiltered_query_has_no_filter() {
        let body = gateway().query_body(&ListFilter::default(), None);
        assert!(body.get("filter").is_none());
        assert!(body.get("start_cursor").is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let api = ApiConfig {
            base_url: "http://localhost:9000/v1/".into(),
            ..ApiConfig::default()
        };
        let gateway = NotionGateway::new(
            "s",
            &api,
            &DatabaseConfig::default(),
            PropertyNames::default(),
            StatusNames::default(),
        )
        .unwrap();
        assert_eq!(gateway.url("/pages"), "http://localhost:9000/v1/pages");
    }
}
