//! Version store backed by a DynamoDB table.
//!
//! Speaks the JSON 1.0 protocol directly over HTTP: every operation is a
//! signed `POST /` naming the operation in `X-Amz-Target`. Works against AWS
//! and against local emulators such as DynamoDB Local.

use super::sigv4::{self, Credentials, SigningParams};
use super::{Precondition, StoreError, VersionStore, WriteOutcome};
use crate::component_id::ComponentId;
use crate::version::ComponentVersion;
use chrono::Utc;
use log::{debug, info};
use serde_json::{Value, json};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Network timeout for a single table request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Protocol prefix for the `X-Amz-Target` header.
const TARGET_PREFIX: &str = "DynamoDB_20120810";

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// Key attribute holding the component id.
const ID_ATTRIBUTE: &str = "ID";

/// Attribute holding the last issued version.
const VERSION_ATTRIBUTE: &str = "Version";

/// How often a table that is not yet serving is polled before giving up.
const TABLE_ACTIVE_POLLS: u32 = 30;
const TABLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Service error types worth retrying.
const TRANSIENT_ERROR_TYPES: &[&str] = &[
    "InternalServerError",
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "ServiceUnavailable",
    "ThrottlingException",
];

/// A failed table request, before it is classified for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ApiError {
    /// No HTTP response was received.
    Transport(String),
    /// The request could not be signed.
    Signing(String),
    /// The service answered with an error document.
    Service {
        status: u16,
        kind: String,
        message: String,
    },
}

impl ApiError {
    fn is_kind(&self, expected: &str) -> bool {
        matches!(self, Self::Service { kind, .. } if kind == expected)
    }
}

impl From<ApiError> for StoreError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Transport(reason) => Self::Transient(reason),
            ApiError::Signing(reason) => Self::Rejected(reason),
            ApiError::Service {
                status,
                kind,
                message,
            } => {
                let reason = format!("{kind} (HTTP {status}): {message}");
                if status >= 500 || TRANSIENT_ERROR_TYPES.contains(&kind.as_str()) {
                    Self::Transient(reason)
                } else {
                    Self::Rejected(reason)
                }
            }
        }
    }
}

/// A [`VersionStore`] talking to DynamoDB over HTTP.
#[derive(Debug, Clone)]
pub struct DynamoDbStore {
    endpoint: String,
    host: String,
    region: String,
    table: String,
    credentials: Credentials,
}

impl DynamoDbStore {
    /// Create a store for `table` at `endpoint` (a full `http(s)://` URL).
    #[must_use]
    pub fn new(endpoint: &str, region: &str, table: &str, credentials: Credentials) -> Self {
        let endpoint = endpoint.trim_end_matches('/').to_owned();
        Self {
            host: host_of(&endpoint).to_owned(),
            endpoint,
            region: region.to_owned(),
            table: table.to_owned(),
            credentials,
        }
    }

    /// The endpoint requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn call(&self, operation: &str, body: &Value) -> Result<Value, ApiError> {
        let payload = body.to_string();
        let target = format!("{TARGET_PREFIX}.{operation}");
        let params = SigningParams {
            credentials: &self.credentials,
            region: &self.region,
            service: "dynamodb",
            time: Utc::now(),
        };
        let headers = sigv4::sign(
            &params,
            "POST",
            "/",
            &[
                ("content-type", CONTENT_TYPE),
                ("host", &self.host),
                ("x-amz-target", &target),
            ],
            payload.as_bytes(),
        )
        .map_err(|e| ApiError::Signing(e.to_string()))?;

        debug!("{operation} -> {}", self.endpoint);
        let mut request = http_agent().post(format!("{}/", self.endpoint));
        // The agent derives Host from the URL.
        for (name, value) in headers.iter().filter(|(name, _)| name != "host") {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send(payload.as_bytes())
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .into_body()
            .read_to_string()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        debug!("{operation} <- HTTP {status}");
        parse_response(status, &text)
    }

    fn wait_until_ready(&self) -> Result<(), StoreError> {
        for _ in 0..TABLE_ACTIVE_POLLS {
            let description = self.call("DescribeTable", &describe_table_request(&self.table))?;
            if table_ready(&description) {
                return Ok(());
            }
            thread::sleep(TABLE_POLL_INTERVAL);
        }
        Err(StoreError::Transient(format!(
            "table {} did not become active",
            self.table
        )))
    }
}

impl VersionStore for DynamoDbStore {
    fn ensure_table(&self) -> Result<(), StoreError> {
        match self.call("DescribeTable", &describe_table_request(&self.table)) {
            Ok(description) if table_ready(&description) => {
                debug!("table {} exists", self.table);
                return Ok(());
            }
            Ok(description) => {
                info!(
                    "waiting for version table {} ({})",
                    self.table,
                    table_status(&description).unwrap_or("no status")
                );
                return self.wait_until_ready();
            }
            Err(err) if err.is_kind("ResourceNotFoundException") => {}
            Err(err) => return Err(err.into()),
        }

        info!("creating version table {}", self.table);
        match self.call("CreateTable", &create_table_request(&self.table)) {
            Ok(_) => {}
            // Another packager created it first.
            Err(err) if err.is_kind("ResourceInUseException") => {}
            Err(err) => return Err(err.into()),
        }
        self.wait_until_ready()
    }

    fn read_version(&self, id: &ComponentId) -> Result<Option<String>, StoreError> {
        let item = self.call("GetItem", &get_item_request(&self.table, id))?;
        Ok(version_from_item(&item))
    }

    fn write_version_if(
        &self,
        id: &ComponentId,
        version: &ComponentVersion,
        precondition: &Precondition,
    ) -> Result<WriteOutcome, StoreError> {
        let request = put_item_request(&self.table, id, version, precondition);
        match self.call("PutItem", &request) {
            Ok(_) => Ok(WriteOutcome::Written),
            Err(err) if err.is_kind("ConditionalCheckFailedException") => Ok(WriteOutcome::Conflict),
            Err(err) => Err(err.into()),
        }
    }
}

/// Shared `ureq` agent; error statuses are returned as responses so their
/// bodies can be classified.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Host (and port, if given) of an endpoint URL.
fn host_of(endpoint: &str) -> &str {
    let rest = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest);
    rest.split('/').next().unwrap_or(rest)
}

fn parse_response(status: u16, text: &str) -> Result<Value, ApiError> {
    let body: Value = if text.trim().is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(text).map_err(|e| ApiError::Service {
            status,
            kind: "MalformedResponse".to_owned(),
            message: e.to_string(),
        })?
    };
    if (200..300).contains(&status) {
        return Ok(body);
    }

    // `__type` looks like `com.amazonaws.dynamodb.v20120810#ResourceNotFoundException`.
    let kind = body
        .get("__type")
        .and_then(Value::as_str)
        .map(|t| t.rsplit('#').next().unwrap_or(t))
        .unwrap_or("UnknownError")
        .to_owned();
    let message = body
        .get("message")
        .or_else(|| body.get("Message"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    Err(ApiError::Service {
        status,
        kind,
        message,
    })
}

fn describe_table_request(table: &str) -> Value {
    json!({ "TableName": table })
}

fn create_table_request(table: &str) -> Value {
    json!({
        "TableName": table,
        "AttributeDefinitions": [
            { "AttributeName": ID_ATTRIBUTE, "AttributeType": "S" }
        ],
        "KeySchema": [
            { "AttributeName": ID_ATTRIBUTE, "KeyType": "HASH" }
        ],
        "BillingMode": "PAY_PER_REQUEST",
    })
}

fn get_item_request(table: &str, id: &ComponentId) -> Value {
    json!({
        "TableName": table,
        "Key": { ID_ATTRIBUTE: { "S": id.as_str() } },
        "ConsistentRead": true,
    })
}

fn put_item_request(
    table: &str,
    id: &ComponentId,
    version: &ComponentVersion,
    precondition: &Precondition,
) -> Value {
    let mut request = json!({
        "TableName": table,
        "Item": {
            ID_ATTRIBUTE: { "S": id.as_str() },
            VERSION_ATTRIBUTE: { "S": version.to_string() },
        },
    });
    let condition = match precondition {
        Precondition::Absent => json!({
            "ConditionExpression": format!("attribute_not_exists({ID_ATTRIBUTE})"),
        }),
        Precondition::Equals(expected) => json!({
            "ConditionExpression": "#v = :expected",
            "ExpressionAttributeNames": { "#v": VERSION_ATTRIBUTE },
            "ExpressionAttributeValues": { ":expected": { "S": expected } },
        }),
    };
    if let (Some(target), Value::Object(extra)) = (request.as_object_mut(), condition) {
        target.extend(extra);
    }
    request
}

/// Raw text of the stored version.
///
/// A version held under another attribute type, or missing from the item, is
/// still returned as text so the client reports it as corrupt.
fn version_from_item(response: &Value) -> Option<String> {
    let item = response.get("Item")?;
    let raw = match item.get(VERSION_ATTRIBUTE) {
        None => String::new(),
        Some(attribute) => match attribute.get("S").or_else(|| attribute.get("N")) {
            Some(Value::String(text)) => text.clone(),
            _ => attribute.to_string(),
        },
    };
    Some(raw)
}

fn table_status(description: &Value) -> Option<&str> {
    description
        .get("Table")
        .and_then(|table| table.get("TableStatus"))
        .and_then(Value::as_str)
}

/// Whether the described table serves reads and writes.
fn table_ready(description: &Value) -> bool {
    matches!(table_status(description), Some("ACTIVE" | "UPDATING"))
}
