// Job type registry and the flat data map codec used for engine storage
//
// Each job type contributes an encode/decode pair keyed by its type
// discriminator. Adding a job type means adding a `JobPayload` variant and
// registering its codec here; the scheduler adapter and the engine are
// untouched.

use crate::errors::CodecError;
use crate::models::{HttpJobPayload, HttpMethod, JobKey, JobPayload, JobRecord, HTTP_JOB_TYPE};
use crate::trigger::Trigger;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Flat string map stored by the engine alongside a job
pub type DataMap = HashMap<String, String>;

/// Reserved data map key holding the job id
pub const ID_KEY: &str = "id";

const URL_KEY: &str = "url";
const METHOD_KEY: &str = "method";
const BODY_KEY: &str = "body";
const HEADERS_KEY: &str = "headers";
const AUDIT_URL_KEY: &str = "auditUrl";
const AUDIT_HEADERS_KEY: &str = "auditHeaders";
const MAX_TRIAL_KEY: &str = "maxTrial";

/// Encode/decode pair of one job type
#[derive(Clone, Copy)]
pub struct JobCodec {
    pub encode: fn(&JobPayload) -> Result<DataMap, CodecError>,
    pub decode: fn(&DataMap) -> Result<JobPayload, CodecError>,
}

/// Lookup table from type discriminator to codec
#[derive(Clone, Default)]
pub struct JobTypeRegistry {
    codecs: HashMap<String, JobCodec>,
}

impl JobTypeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry knowing every built-in job type
    pub fn with_builtin_types() -> Self {
        let mut registry = Self::new();
        registry.register(
            HTTP_JOB_TYPE,
            JobCodec {
                encode: encode_http,
                decode: decode_http,
            },
        );
        registry
    }

    pub fn register(&mut self, type_tag: impl Into<String>, codec: JobCodec) {
        self.codecs.insert(type_tag.into(), codec);
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.codecs.contains_key(type_tag)
    }

    fn codec(&self, type_tag: &str) -> Result<&JobCodec, CodecError> {
        self.codecs
            .get(type_tag)
            .ok_or_else(|| CodecError::UnknownJobType(type_tag.to_string()))
    }

    pub fn encode(&self, type_tag: &str, payload: &JobPayload) -> Result<DataMap, CodecError> {
        (self.codec(type_tag)?.encode)(payload)
    }

    pub fn decode(&self, type_tag: &str, data: &DataMap) -> Result<JobPayload, CodecError> {
        (self.codec(type_tag)?.decode)(data)
    }
}

impl JobRecord {
    /// Encode the payload and fold the job id into the same map.
    ///
    /// Fails when the codec itself emits the reserved `id` key.
    pub fn encode(&self, registry: &JobTypeRegistry) -> Result<DataMap, CodecError> {
        let mut data = registry.encode(self.type_tag(), &self.payload)?;
        if data.contains_key(ID_KEY) {
            return Err(CodecError::ReservedKey(ID_KEY.to_string()));
        }
        data.insert(ID_KEY.to_string(), self.id.to_string());
        Ok(data)
    }

    /// Rebuild a record from what the engine stored for `key`
    pub fn decode(
        key: JobKey,
        type_tag: &str,
        data: &DataMap,
        triggers: impl IntoIterator<Item = Trigger>,
        registry: &JobTypeRegistry,
    ) -> Result<Self, CodecError> {
        let mut data = data.clone();
        let raw_id = data
            .remove(ID_KEY)
            .ok_or_else(|| CodecError::MissingKey(ID_KEY.to_string()))?;
        let id = Uuid::parse_str(&raw_id).map_err(|e| CodecError::InvalidValue {
            key: ID_KEY.to_string(),
            reason: e.to_string(),
        })?;
        let payload = registry.decode(type_tag, &data)?;
        Ok(Self {
            id,
            key,
            triggers: triggers.into_iter().collect(),
            payload,
        })
    }
}

// ============================================================================
// HTTP job codec
// ============================================================================

fn encode_http(payload: &JobPayload) -> Result<DataMap, CodecError> {
    match payload {
        JobPayload::Http(http) => {
            let mut data = DataMap::new();
            data.insert(URL_KEY.to_string(), http.url.clone());
            data.insert(METHOD_KEY.to_string(), http.method.to_string());
            if let Some(body) = &http.body {
                data.insert(BODY_KEY.to_string(), body.clone());
            }
            data.insert(
                HEADERS_KEY.to_string(),
                encode_headers(HEADERS_KEY, &http.headers)?,
            );
            if let Some(audit_url) = &http.audit_url {
                data.insert(AUDIT_URL_KEY.to_string(), audit_url.clone());
            }
            data.insert(
                AUDIT_HEADERS_KEY.to_string(),
                encode_headers(AUDIT_HEADERS_KEY, &http.audit_headers)?,
            );
            data.insert(MAX_TRIAL_KEY.to_string(), http.max_trial.to_string());
            Ok(data)
        }
    }
}

fn decode_http(data: &DataMap) -> Result<JobPayload, CodecError> {
    let url = required(data, URL_KEY)?.to_string();
    let method = required(data, METHOD_KEY)?
        .parse::<HttpMethod>()
        .map_err(|reason| CodecError::InvalidValue {
            key: METHOD_KEY.to_string(),
            reason,
        })?;
    let max_trial = match data.get(MAX_TRIAL_KEY) {
        Some(raw) => raw.parse::<u32>().map_err(|e| CodecError::InvalidValue {
            key: MAX_TRIAL_KEY.to_string(),
            reason: e.to_string(),
        })?,
        None => 1,
    };

    Ok(JobPayload::Http(HttpJobPayload {
        url,
        method,
        body: data.get(BODY_KEY).cloned(),
        headers: decode_headers(data, HEADERS_KEY)?,
        audit_url: data.get(AUDIT_URL_KEY).cloned(),
        audit_headers: decode_headers(data, AUDIT_HEADERS_KEY)?,
        max_trial,
    }))
}

fn required<'a>(data: &'a DataMap, key: &str) -> Result<&'a str, CodecError> {
    data.get(key)
        .map(String::as_str)
        .ok_or_else(|| CodecError::MissingKey(key.to_string()))
}

fn encode_headers(key: &str, headers: &BTreeMap<String, String>) -> Result<String, CodecError> {
    serde_json::to_string(headers).map_err(|e| CodecError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode_headers(data: &DataMap, key: &str) -> Result<BTreeMap<String, String>, CodecError> {
    match data.get(key) {
        Some(raw) => serde_json::from_str(raw).map_err(|e| CodecError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(BTreeMap::new()),
    }
}
