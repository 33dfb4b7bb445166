use serde_json::Value;

use crate::{Codec, Result};

/// Stores values as compact JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, raw: &str) -> Result<Value> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_json_codec() {
        let codec = JsonCodec;
        let value = json!({"n": 1.5, "ok": true, "list": [null, "x"]});
        let raw = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&raw).unwrap(), value);
    }

    #[test]
    fn test_decode_garbage_is_codec_error() {
        let err = JsonCodec.decode("{not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);
    }
}
