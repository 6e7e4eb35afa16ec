pub mod cookie_verification;
pub mod intruder;

pub use cookie_verification::CookieVerificationProbe;
pub use intruder::IntruderProbe;

use anyhow::anyhow;
use serde::Serialize;
use serde_json::Value;

use crate::probe::ProbeOutput;

/// Serializes a report struct into the open-ended probe result map.
pub(crate) fn to_output<T: Serialize>(report: &T) -> anyhow::Result<ProbeOutput> {
    match serde_json::to_value(report)? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!("probe report serialized to {} instead of an object", other)),
    }
}

pub(crate) fn headers_to_json(headers: &[(String, String)]) -> Value {
    Value::Object(
        headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}
