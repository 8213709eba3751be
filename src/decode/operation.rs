use crate::errors::{DecodeError, Error, Result};
use crate::operation::{Operation, Work};
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// Transforms upstream response bytes into a typed value.
///
/// With a key path set, the JSON document is narrowed to that top-level key
/// before deserialization; the target type then describes the narrowed
/// fragment rather than the whole envelope.
pub struct DecodeOperation<T> {
    key_path: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DecodeOperation<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub fn new() -> Self {
        DecodeOperation {
            key_path: None,
            _marker: PhantomData,
        }
    }

    pub fn with_key_path(key_path: impl Into<String>) -> Self {
        DecodeOperation {
            key_path: Some(key_path.into()),
            _marker: PhantomData,
        }
    }

    pub fn operation(self) -> Operation<Vec<u8>, T> {
        Operation::new(self)
    }

    fn decode(&self, data: &[u8]) -> Result<T> {
        if data.is_empty() {
            return Err(DecodeError::EmptyData.into());
        }
        match &self.key_path {
            Some(key) => decode_key_path(data, key),
            None => serde_json::from_slice(data).map_err(|e| DecodeError::Json(e).into()),
        }
    }
}

impl<T> Default for DecodeOperation<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn default() -> Self {
        DecodeOperation::new()
    }
}

/// Narrows the document to `key` and deserializes the fragment. Only array
/// and object fragments are addressable this way; anything else reads as
/// missing data.
fn decode_key_path<T>(data: &[u8], key: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let document: Value =
        serde_json::from_slice(data).map_err(|e| Error::from(DecodeError::Json(e)))?;
    match document.get(key) {
        Some(fragment @ (Value::Array(_) | Value::Object(_))) => {
            serde_json::from_value(fragment.clone())
                .map_err(|e| DecodeError::Json(e).into())
        }
        _ => Err(DecodeError::EmptyData.into()),
    }
}

#[async_trait]
impl<T> Work<Vec<u8>, T> for DecodeOperation<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "DecodeOperation"
    }

    async fn main(&self, op: &Operation<Vec<u8>, T>) {
        let output = op.input().and_then(|data| {
            debug!("decoding {} response bytes", data.len());
            self.decode(&data)
        });
        op.set_output(output);
        op.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Deserialize, PartialEq)]
    struct Item {
        id: u64,
        name: String,
    }

    #[tokio::test]
    async fn decodes_whole_document() {
        let op = DecodeOperation::<Item>::new().operation();
        op.set_input(Ok(br#"{"id": 7, "name": "widget"}"#.to_vec()));

        op.start().await;

        assert_eq!(
            op.output().unwrap(),
            Item {
                id: 7,
                name: "widget".to_string()
            }
        );
    }

    #[tokio::test]
    async fn key_path_narrows_to_nested_array() {
        let body = br#"{"count": 1, "results": [{"id": 1, "name": "first"}]}"#.to_vec();
        let op = DecodeOperation::<Vec<Item>>::with_key_path("results").operation();
        op.set_input(Ok(body));

        op.start().await;

        let items = op.output().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 1);
    }

    #[tokio::test]
    async fn missing_key_reads_as_empty_data() {
        let op = DecodeOperation::<Vec<Item>>::with_key_path("results").operation();
        op.set_input(Ok(br#"{"count": 0}"#.to_vec()));

        op.start().await;

        let err = op.output().unwrap_err();
        assert!(matches!(
            err.get_ref::<DecodeError>(),
            Some(DecodeError::EmptyData)
        ));
    }

    #[tokio::test]
    async fn scalar_at_key_path_reads_as_empty_data() {
        let op = DecodeOperation::<Vec<Item>>::with_key_path("results").operation();
        op.set_input(Ok(br#"{"results": 42}"#.to_vec()));

        op.start().await;

        assert!(op.output().unwrap_err().is_decode());
    }

    #[tokio::test]
    async fn empty_payload_reads_as_empty_data() {
        let op = DecodeOperation::<Item>::new().operation();
        op.set_input(Ok(Vec::new()));

        op.start().await;

        let err = op.output().unwrap_err();
        assert!(matches!(
            err.get_ref::<DecodeError>(),
            Some(DecodeError::EmptyData)
        ));
    }

    #[tokio::test]
    async fn malformed_json_surfaces_parse_error() {
        let op = DecodeOperation::<Item>::new().operation();
        op.set_input(Ok(b"{not json".to_vec()));

        op.start().await;

        let err = op.output().unwrap_err();
        assert!(matches!(
            err.get_ref::<DecodeError>(),
            Some(DecodeError::Json(_))
        ));
    }

    #[tokio::test]
    async fn upstream_failure_flows_through_unchanged() {
        let op = DecodeOperation::<Item>::new().operation();
        op.set_input(Err(crate::errors::Error::cancelled()));

        op.start().await;

        assert!(op.output().unwrap_err().is_cancelled());
    }
}
