pub mod gateway;
pub mod message;
pub mod room;
pub mod user;

/// Serde helpers for i64 ids carried as decimal strings on the wire.
///
/// Snowflake ids exceed the 53-bit precision of a JavaScript number, so
/// every id crossing the WebSocket is a string. Deserialization accepts
/// either form for lenient clients.
pub mod id {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => s.parse().map_err(D::Error::custom),
            serde_json::Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| D::Error::custom("id out of range")),
            other => Err(D::Error::custom(format!("invalid id: {other}"))),
        }
    }

    pub mod opt {
        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<i64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(id) => serializer.serialize_some(&id.to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<i64>, D::Error> {
            match Option::<serde_json::Value>::deserialize(deserializer)? {
                None | Some(serde_json::Value::Null) => Ok(None),
                Some(serde_json::Value::String(s)) => {
                    s.parse().map(Some).map_err(D::Error::custom)
                }
                Some(serde_json::Value::Number(n)) => n
                    .as_i64()
                    .map(Some)
                    .ok_or_else(|| D::Error::custom("id out of range")),
                Some(other) => Err(D::Error::custom(format!("invalid id: {other}"))),
            }
        }
    }

    pub mod vec {
        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &[i64], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(value.iter().map(|id| id.to_string()))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<i64>, D::Error> {
            let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
            raw.into_iter()
                .map(|value| match value {
                    serde_json::Value::String(s) => s.parse().map_err(D::Error::custom),
                    serde_json::Value::Number(n) => n
                        .as_i64()
                        .ok_or_else(|| D::Error::custom("id out of range")),
                    other => Err(D::Error::custom(format!("invalid id: {other}"))),
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrapped {
        #[serde(with = "crate::id")]
        id: i64,
        #[serde(with = "crate::id::vec")]
        ids: Vec<i64>,
    }

    #[test]
    fn ids_round_trip_as_strings() {
        let w = Wrapped {
            id: 7_234_567_890_123_456_789,
            ids: vec![1, 2],
        };
        let json = serde_json::to_value(&w).expect("serialize");
        assert_eq!(json["id"], "7234567890123456789");
        assert_eq!(json["ids"][0], "1");

        let back: Wrapped = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.id, 7_234_567_890_123_456_789);
        assert_eq!(back.ids, vec![1, 2]);
    }

    #[test]
    fn ids_accept_numeric_form() {
        let back: Wrapped =
            serde_json::from_str(r#"{"id": 42, "ids": [3, "4"]}"#).expect("deserialize");
        assert_eq!(back.id, 42);
        assert_eq!(back.ids, vec![3, 4]);
    }
}
