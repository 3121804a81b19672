// Domain models: job identity, HTTP job payload, wire documents and audit records

use crate::errors::ValidationError;
use crate::trigger::Trigger;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

lazy_static! {
    static ref KEY_PART: Regex = Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap();
}

/// Discriminator of the built-in HTTP callout job type
pub const HTTP_JOB_TYPE: &str = "http";

// ============================================================================
// Job identity
// ============================================================================

/// Identifies a job among the jobs currently pending in the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub group: String,
    pub name: String,
}

impl JobKey {
    /// Build a key, checking both parts are usable as URL path segments
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Result<Self, ValidationError> {
        let key = Self {
            group: group.into(),
            name: name.into(),
        };
        validate_key_part("group", &key.group)?;
        validate_key_part("name", &key.name)?;
        Ok(key)
    }
}

fn validate_key_part(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    if !KEY_PART.is_match(value) {
        return Err(ValidationError::InvalidFieldValue {
            field: field.to_string(),
            reason: "only letters, digits, '_', '-' and '.' are allowed".to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

// ============================================================================
// HTTP job payload
// ============================================================================

/// HttpMethod for HTTP jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(format!("unsupported HTTP method: {}", s)),
        }
    }
}

fn default_max_trial() -> u32 {
    1
}

/// Configuration of an HTTP callout job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpJobPayload {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_url: Option<String>,
    #[serde(default)]
    pub audit_headers: BTreeMap<String, String>,
    /// Total number of attempts allowed per run, at least 1
    #[serde(default = "default_max_trial")]
    pub max_trial: u32,
}

impl HttpJobPayload {
    /// A POST to `url` with no body, no headers and a single attempt
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::default(),
            body: None,
            headers: BTreeMap::new(),
            audit_url: None,
            audit_headers: BTreeMap::new(),
            max_trial: default_max_trial(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_http_url("url", &self.url)?;
        if let Some(audit_url) = &self.audit_url {
            validate_http_url("auditUrl", audit_url)?;
        }
        validate_headers("headers", &self.headers)?;
        validate_headers("auditHeaders", &self.audit_headers)?;
        if self.max_trial == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "maxTrial".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ValidationError> {
    let url = reqwest::Url::parse(value).map_err(|e| ValidationError::InvalidFieldValue {
        field: field.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ValidationError::InvalidFieldValue {
            field: field.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

fn validate_headers(
    field: &str,
    headers: &BTreeMap<String, String>,
) -> Result<(), ValidationError> {
    for (name, value) in headers {
        let invalid = HeaderName::from_bytes(name.as_bytes()).is_err()
            || HeaderValue::from_str(value).is_err();
        if invalid {
            return Err(ValidationError::InvalidFieldValue {
                field: field.to_string(),
                reason: format!("invalid header '{}'", name),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Job envelope
// ============================================================================

/// Type-specific part of a job, tagged by its discriminator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobPayload {
    Http(HttpJobPayload),
}

impl JobPayload {
    pub fn type_tag(&self) -> &'static str {
        match self {
            JobPayload::Http(_) => HTTP_JOB_TYPE,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            JobPayload::Http(payload) => payload.validate(),
        }
    }
}

/// A job as known to the scheduler: identity, key, triggers and payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// Generated once on creation; distinguishes jobs that reuse a key over time
    pub id: Uuid,
    pub key: JobKey,
    pub triggers: BTreeSet<Trigger>,
    pub payload: JobPayload,
}

impl JobRecord {
    pub fn new(
        key: JobKey,
        triggers: impl IntoIterator<Item = Trigger>,
        payload: JobPayload,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            triggers: triggers.into_iter().collect(),
            payload,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        self.payload.type_tag()
    }
}

/// JSON representation of a job as exchanged over the REST API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub name: String,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(flatten)]
    pub payload: JobPayload,
}

impl JobDocument {
    /// Turn a submitted document into a new record scheduled under `path_group`.
    ///
    /// Any `id` in the document is ignored; a fresh one is generated.
    pub fn into_record(self, path_group: &str) -> Result<JobRecord, ValidationError> {
        if let Some(body_group) = &self.group {
            if body_group != path_group {
                return Err(ValidationError::GroupMismatch {
                    path_group: path_group.to_string(),
                    body_group: body_group.clone(),
                });
            }
        }
        let key = JobKey::new(path_group, self.name)?;
        if self.triggers.is_empty() {
            return Err(ValidationError::EmptyTriggers);
        }
        self.payload.validate()?;
        Ok(JobRecord::new(key, self.triggers, self.payload))
    }
}

impl From<&JobRecord> for JobDocument {
    fn from(record: &JobRecord) -> Self {
        Self {
            id: Some(record.id),
            group: Some(record.key.group.clone()),
            name: record.key.name.clone(),
            triggers: record.triggers.iter().cloned().collect(),
            payload: record.payload.clone(),
        }
    }
}

// ============================================================================
// Audit
// ============================================================================

/// Outcome of one run of an HTTP job, across all of its attempts
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub request: JobDocument,
    /// Absent when every attempt failed at the transport level
    pub response_code: Option<u16>,
    pub response_body: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub trial_count: u32,
}

impl AuditRecord {
    pub fn is_success(&self) -> bool {
        self.response_code.is_some_and(is_success_status)
    }
}

/// Statuses that end the retry loop: 200 through 205
pub fn is_success_status(code: u16) -> bool {
    (200..=205).contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn http_document(value: serde_json::Value) -> JobDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_job_key_rejects_empty_and_unsafe_parts() {
        assert!(JobKey::new("g", "j1").is_ok());
        assert!(matches!(
            JobKey::new("", "j1"),
            Err(ValidationError::MissingField(_))
        ));
        assert!(matches!(
            JobKey::new("g", "a/b"),
            Err(ValidationError::InvalidFieldValue { .. })
        ));
    }

    #[test]
    fn test_job_key_display() {
        assert_eq!(JobKey::new("g", "j1").unwrap().to_string(), "g.j1");
    }

    #[test]
    fn test_http_method_from_str_is_case_insensitive() {
        assert_eq!("put".parse::<HttpMethod>().unwrap(), HttpMethod::Put);
        assert!("BREW".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_minimal_document_gets_defaults() {
        let doc = http_document(json!({
            "name": "j1",
            "type": "http",
            "url": "http://localhost/test",
            "triggers": [{"when": "2030-01-01T00:00:00Z"}]
        }));
        let JobPayload::Http(payload) = &doc.payload;
        assert_eq!(payload.method, HttpMethod::Post);
        assert_eq!(payload.max_trial, 1);
        assert!(payload.headers.is_empty());
        assert!(payload.audit_url.is_none());
    }

    #[test]
    fn test_document_with_all_parameters() {
        let doc = http_document(json!({
            "name": "j2",
            "type": "http",
            "url": "http://localhost/test",
            "method": "PUT",
            "body": "{\"field\":\"value\"}",
            "headers": {"Content-Type": "application/json"},
            "auditUrl": "http://localhost/audit",
            "auditHeaders": {"X-Audit": "1"},
            "maxTrial": 3,
            "triggers": [{"cron": "0/2 * * * * ?"}]
        }));
        let JobPayload::Http(payload) = &doc.payload;
        assert_eq!(payload.method, HttpMethod::Put);
        assert_eq!(payload.body.as_deref(), Some("{\"field\":\"value\"}"));
        assert_eq!(payload.headers["Content-Type"], "application/json");
        assert_eq!(payload.audit_headers["X-Audit"], "1");
        assert_eq!(payload.max_trial, 3);
        assert_eq!(doc.triggers, vec![Trigger::Cron("0/2 * * * * ?".to_string())]);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_value::<JobDocument>(json!({
            "name": "j1",
            "type": "rabbitmq",
            "url": "http://localhost/test",
            "triggers": [{"immediate": true}]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_into_record_rejects_group_mismatch() {
        let doc = http_document(json!({
            "group": "other",
            "name": "j1",
            "type": "http",
            "url": "http://localhost/test",
            "triggers": [{"immediate": true}]
        }));
        assert!(matches!(
            doc.into_record("g"),
            Err(ValidationError::GroupMismatch { .. })
        ));
    }

    #[test]
    fn test_into_record_rejects_empty_triggers() {
        let doc = http_document(json!({
            "name": "j1",
            "type": "http",
            "url": "http://localhost/test",
            "triggers": []
        }));
        assert_eq!(doc.into_record("g"), Err(ValidationError::EmptyTriggers));
    }

    #[test]
    fn test_into_record_rejects_zero_max_trial_and_bad_url() {
        let zero_trials = http_document(json!({
            "name": "j1",
            "type": "http",
            "url": "http://localhost/test",
            "maxTrial": 0,
            "triggers": [{"immediate": true}]
        }));
        assert!(zero_trials.into_record("g").is_err());

        let ftp = http_document(json!({
            "name": "j1",
            "type": "http",
            "url": "ftp://localhost/test",
            "triggers": [{"immediate": true}]
        }));
        assert!(ftp.into_record("g").is_err());
    }

    #[test]
    fn test_into_record_ignores_submitted_id() {
        let submitted = Uuid::new_v4();
        let doc = http_document(json!({
            "id": submitted,
            "name": "j1",
            "type": "http",
            "url": "http://localhost/test",
            "triggers": [{"immediate": true}]
        }));
        let record = doc.into_record("g").unwrap();
        assert_ne!(record.id, submitted);
        assert_eq!(record.key, JobKey::new("g", "j1").unwrap());
    }

    #[test]
    fn test_document_from_record_carries_identity() {
        let record = JobRecord::new(
            JobKey::new("g", "j1").unwrap(),
            vec![Trigger::Immediate],
            JobPayload::Http(HttpJobPayload::new("http://localhost/test")),
        );
        let value = serde_json::to_value(JobDocument::from(&record)).unwrap();
        assert_eq!(value["id"], json!(record.id));
        assert_eq!(value["group"], "g");
        assert_eq!(value["type"], "http");
        assert_eq!(value["method"], "POST");
        assert_eq!(value["triggers"], json!([{"immediate": true}]));
    }

    #[test]
    fn test_success_status_range() {
        assert!(is_success_status(200));
        assert!(is_success_status(205));
        assert!(!is_success_status(206));
        assert!(!is_success_status(500));
    }
}
