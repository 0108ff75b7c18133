//! The backend's `{EC, EM, DT}` response wrapper.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ShipperError;

pub const SUCCESS_CODE: &str = "0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "EC", deserialize_with = "code_from_string_or_number")]
    pub code: String,
    #[serde(rename = "EM", default)]
    pub message: String,
    #[serde(rename = "DT", default)]
    pub data: Value,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Returns the raw `DT` payload, or the application error carried by `EC`/`EM`.
    pub fn into_data(self) -> Result<Value, ShipperError> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(ShipperError::Application {
                code: self.code,
                message: self.message,
            })
        }
    }

    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, ShipperError> {
        let data = self.into_data()?;
        serde_json::from_value(data).map_err(|err| ShipperError::Decode(err.to_string()))
    }
}

/// Decodes a socket payload that may or may not be wrapped in an envelope.
///
/// Push events such as `new_order_assigned` carry the document directly while
/// confirmations carry `{EC, EM, DT}`.
pub fn decode_payload<T: DeserializeOwned>(data: Value) -> Result<T, ShipperError> {
    let data = unwrap_payload(data)?;
    serde_json::from_value(data).map_err(|err| ShipperError::Decode(err.to_string()))
}

/// Strips the envelope if there is one, surfacing a non-zero `EC` as an error.
pub fn unwrap_payload(data: Value) -> Result<Value, ShipperError> {
    let wrapped = data.as_object().is_some_and(|object| object.contains_key("EC"));

    if wrapped {
        let envelope: Envelope = serde_json::from_value(data)?;
        envelope.into_data()
    } else {
        Ok(data)
    }
}

fn code_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawCode {
        Text(String),
        Integer(i64),
    }

    Ok(match RawCode::deserialize(deserializer)? {
        RawCode::Text(code) => code.trim().to_string(),
        RawCode::Integer(code) => code.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::{decode_payload, Envelope};
    use crate::error::ShipperError;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Balance {
        balance: f64,
    }

    #[test]
    fn numeric_success_code_is_accepted() {
        let envelope: Envelope =
            serde_json::from_value(json!({ "EC": 0, "EM": "ok", "DT": { "balance": 5.0 } }))
                .unwrap();

        assert!(envelope.is_success());
        let balance: Balance = envelope.into_result().unwrap();
        assert_eq!(balance, Balance { balance: 5.0 });
    }

    #[test]
    fn non_zero_code_becomes_application_error() {
        let envelope: Envelope =
            serde_json::from_value(json!({ "EC": "1", "EM": "order already assigned", "DT": "" }))
                .unwrap();

        match envelope.into_data() {
            Err(ShipperError::Application { code, message }) => {
                assert_eq!(code, "1");
                assert_eq!(message, "order already assigned");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn payload_decodes_with_or_without_envelope() {
        let bare: Balance = decode_payload(json!({ "balance": 12.5 })).unwrap();
        let wrapped: Balance =
            decode_payload(json!({ "EC": "0", "EM": "", "DT": { "balance": 12.5 } })).unwrap();

        assert_eq!(bare, wrapped);
    }
}
