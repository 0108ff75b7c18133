use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// Canonical address. The backend sends addresses either as a plain string or
/// as a structured object; both are normalized into this shape at decode time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAddress")]
pub struct Address {
    pub full: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

impl Address {
    pub fn new(full: impl Into<String>) -> Self {
        Self {
            full: full.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAddress {
    Text(String),
    Structured(AddressParts),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressParts {
    #[serde(default, alias = "fullAddress")]
    full: Option<String>,
    #[serde(default)]
    street: Option<String>,
    #[serde(default)]
    ward: Option<String>,
    #[serde(default)]
    district: Option<String>,
    #[serde(default, alias = "province")]
    city: Option<String>,
    #[serde(default)]
    location: Option<GeoPoint>,
    #[serde(default, alias = "latitude")]
    lat: Option<f64>,
    #[serde(default, alias = "longitude")]
    lng: Option<f64>,
}

impl TryFrom<RawAddress> for Address {
    type Error = String;

    fn try_from(raw: RawAddress) -> Result<Self, Self::Error> {
        match raw {
            RawAddress::Text(text) => {
                let full = text.trim();
                if full.is_empty() {
                    return Err("address is empty".to_string());
                }
                Ok(Address::new(full))
            }
            RawAddress::Structured(parts) => {
                let location = parts.location.or(match (parts.lat, parts.lng) {
                    (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
                    _ => None,
                });

                let full = match parts.full.as_deref().map(str::trim) {
                    Some(full) if !full.is_empty() => full.to_string(),
                    _ => [parts.street, parts.ward, parts.district, parts.city]
                        .into_iter()
                        .flatten()
                        .map(|part| part.trim().to_string())
                        .filter(|part| !part.is_empty())
                        .collect::<Vec<_>>()
                        .join(", "),
                };

                if full.is_empty() {
                    return Err("unrecognized address shape".to_string());
                }

                Ok(Address { full, location })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Address;
    use crate::geo::GeoPoint;

    #[test]
    fn plain_string_address() {
        let address: Address = serde_json::from_value(json!("  12 Lê Lợi, Quận 1 ")).unwrap();
        assert_eq!(address, Address::new("12 Lê Lợi, Quận 1"));
    }

    #[test]
    fn structured_parts_are_joined_in_order() {
        let address: Address = serde_json::from_value(json!({
            "street": "12 Lê Lợi",
            "ward": "Bến Nghé",
            "district": "Quận 1",
            "province": "TP.HCM",
            "latitude": 10.77,
            "longitude": 106.70
        }))
        .unwrap();

        assert_eq!(address.full, "12 Lê Lợi, Bến Nghé, Quận 1, TP.HCM");
        assert_eq!(address.location, Some(GeoPoint::new(10.77, 106.70)));
    }

    #[test]
    fn full_address_field_wins_over_parts() {
        let address: Address = serde_json::from_value(json!({
            "fullAddress": "99 Nguyễn Huệ",
            "street": "ignored"
        }))
        .unwrap();

        assert_eq!(address.full, "99 Nguyễn Huệ");
    }

    #[test]
    fn canonical_form_round_trips() {
        let original = Address::new("1 Hàng Bài").with_location(GeoPoint::new(21.02, 105.85));
        let encoded = serde_json::to_value(&original).unwrap();
        let decoded: Address = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn unrecognized_shapes_are_rejected() {
        assert!(serde_json::from_value::<Address>(json!(42)).is_err());
        assert!(serde_json::from_value::<Address>(json!({})).is_err());
        assert!(serde_json::from_value::<Address>(json!("   ")).is_err());
    }
}
