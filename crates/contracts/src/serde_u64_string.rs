//! Campaign seeds travel as strings so JavaScript observers never lose
//! precision; numeric input is still accepted for hand-written configs.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SeedInput {
        Text(String),
        Number(u64),
    }

    match SeedInput::deserialize(deserializer)? {
        SeedInput::Text(raw) => raw.parse::<u64>().map_err(D::Error::custom),
        SeedInput::Number(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct SeedCarrier {
        #[serde(with = "super")]
        seed: u64,
    }

    #[test]
    fn string_seed_parses() {
        let parsed: SeedCarrier = serde_json::from_str(r#"{"seed":"9001"}"#).expect("string seed");
        assert_eq!(parsed.seed, 9001);
    }

    #[test]
    fn numeric_seed_parses() {
        let parsed: SeedCarrier = serde_json::from_str(r#"{"seed":9001}"#).expect("numeric seed");
        assert_eq!(parsed.seed, 9001);
    }

    #[test]
    fn seed_serializes_as_string() {
        let encoded = serde_json::to_string(&SeedCarrier { seed: 42 }).expect("serialize");
        assert_eq!(encoded, r#"{"seed":"42"}"#);
    }
}
