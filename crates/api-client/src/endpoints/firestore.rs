//! Issue documents in Firestore, over the REST API

use crate::client::ApiClient;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use fixmyarea_sync::model::ISSUES_COLLECTION;
use fixmyarea_sync::{DocumentStore, IssueDocument, RemoteError};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

/// Writes issue documents with `createDocument`, keyed by report id.
///
/// Firestore answers `409 ALREADY_EXISTS` when a document with that id is
/// present; a retried write after a lost response therefore still yields
/// exactly one document.
#[derive(Clone)]
pub struct FirestoreReports {
    client: ApiClient,
    collection_url: String,
}

#[derive(Debug, Deserialize)]
struct CreatedDocument {
    name: String,
}

impl FirestoreReports {
    pub(crate) fn new(client: ApiClient) -> ApiResult<Self> {
        let config = client.config();
        let collection_url = format!(
            "{}/projects/{}/databases/{}/documents/{ISSUES_COLLECTION}",
            config.firestore_url.trim_end_matches('/'),
            config.firestore_project()?,
            config.database,
        );
        Ok(Self {
            client,
            collection_url,
        })
    }

    /// URL of the `issues` collection
    #[must_use]
    pub fn collection_url(&self) -> &str {
        &self.collection_url
    }

    /// Create the document `id`, returning its document id
    #[instrument(skip(self, document))]
    pub async fn create(&self, id: &str, document: &IssueDocument) -> ApiResult<String> {
        let body = encode_document(document)?;
        let request = self
            .client
            .request(Method::POST, &self.collection_url)
            .query(&[("documentId", id)])
            .json(&body);

        let response = self.client.send(request).await?;
        if response.status() == StatusCode::CONFLICT {
            debug!("Document already exists");
            return Ok(id.to_string());
        }

        let created: CreatedDocument = ApiClient::check_status(response).await?.json().await?;
        let remote_id = created
            .name
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| {
                ApiError::UnexpectedResponse(format!("bad document name {}", created.name))
            })?;
        Ok(remote_id.to_string())
    }
}

#[async_trait]
impl DocumentStore for FirestoreReports {
    async fn write(&self, id: &str, document: &IssueDocument) -> Result<String, RemoteError> {
        self.create(id, document).await.map_err(RemoteError::from)
    }
}

/// Encode any serializable struct as a Firestore `{"fields": ...}` body
pub fn encode_document<T: Serialize>(document: &T) -> ApiResult<Value> {
    match serde_json::to_value(document)? {
        Value::Object(map) => Ok(json!({ "fields": encode_fields(map) })),
        other => Err(ApiError::config(format!(
            "documents must serialize to an object, got {other}"
        ))),
    }
}

fn encode_fields(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| (key, to_firestore_value(&value)))
        .collect()
}

/// Convert a JSON value to Firestore's typed value representation
#[must_use]
pub fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        // integers travel as strings (int64)
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "integerValue": n.to_string() }),
        Value::Number(n) => json!({ "doubleValue": n.as_f64() }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) if items.is_empty() => json!({ "arrayValue": {} }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(to_firestore_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map.clone()) } }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn document(image_url: Vec<String>) -> IssueDocument {
        IssueDocument {
            title: "Overflowing drain".into(),
            description: "Water on the road after every rain".into(),
            category: "sanitation".into(),
            location: "Road 7, Dhanmondi".into(),
            latitude: Some(23.0),
            longitude: Some(90.4125),
            location_accuracy: None,
            image_url,
            reporter_id: "user-9".into(),
            status: "pending".into(),
            timestamp: 1_700_000_000_123,
            upvotes: 0,
        }
    }

    #[test]
    fn test_scalar_values() {
        assert_eq!(to_firestore_value(&json!(null)), json!({ "nullValue": null }));
        assert_eq!(to_firestore_value(&json!(true)), json!({ "booleanValue": true }));
        assert_eq!(to_firestore_value(&json!(-7)), json!({ "integerValue": "-7" }));
        assert_eq!(to_firestore_value(&json!(2.5)), json!({ "doubleValue": 2.5 }));
        assert_eq!(to_firestore_value(&json!("x")), json!({ "stringValue": "x" }));
    }

    #[test]
    fn test_nested_values() {
        let value = json!({ "tags": ["a"], "meta": { "n": 1 }, "empty": [] });
        assert_eq!(
            to_firestore_value(&value),
            json!({ "mapValue": { "fields": {
                "tags": { "arrayValue": { "values": [{ "stringValue": "a" }] } },
                "meta": { "mapValue": { "fields": { "n": { "integerValue": "1" } } } },
                "empty": { "arrayValue": {} },
            } } })
        );
    }

    #[test]
    fn test_encode_issue_document() {
        let body = encode_document(&document(vec!["https://cdn/p.jpg".into()])).unwrap();
        let fields = &body["fields"];

        assert_eq!(fields["title"], json!({ "stringValue": "Overflowing drain" }));
        // whole-number coordinates stay doubles
        assert_eq!(fields["latitude"], json!({ "doubleValue": 23.0 }));
        assert_eq!(fields["timestamp"], json!({ "integerValue": "1700000000123" }));
        assert_eq!(fields["upvotes"], json!({ "integerValue": "0" }));
        assert_eq!(
            fields["imageUrl"],
            json!({ "arrayValue": { "values": [{ "stringValue": "https://cdn/p.jpg" }] } })
        );
        assert!(fields.get("locationAccuracy").is_none());
    }

    #[test]
    fn test_photo_less_document_has_empty_image_list() {
        let body = encode_document(&document(Vec::new())).unwrap();
        assert_eq!(body["fields"]["imageUrl"], json!({ "arrayValue": {} }));
    }

    #[test]
    fn test_rejects_non_object_documents() {
        assert!(encode_document(&vec![1, 2]).is_err());
    }

    #[test]
    fn test_collection_url() {
        let config = ClientConfig::default().with_project("fixmyarea-prod");
        let reports = ApiClient::with_config(config).unwrap().firestore().unwrap();
        assert_eq!(
            reports.collection_url(),
            "https://firestore.googleapis.com/v1/projects/fixmyarea-prod/databases/(default)/documents/issues"
        );
    }
}
