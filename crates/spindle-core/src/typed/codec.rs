//! PayloadCodec - task input / result の JSON エンコーディング
//!
//! # 形式
//! - input: 位置引数の JSON 配列（`["World", 3]`）。空の input は引数 0 個
//! - result: 戻り値を 1 つの JSON ドキュメントとして（`"Hello World"`）
//!
//! `ActivityArgs` はタプル型で「引数の並びと型」を宣言し、配列の長さが
//! 合わなければデコードエラーにします。

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("input is not a JSON array of positional arguments (got {0})")]
    NotPositional(&'static str),

    #[error("expected {expected} positional argument(s), got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("argument {index}: {source}")]
    Argument {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct PayloadCodec;

impl PayloadCodec {
    /// Decode task input into its positional argument list.
    pub fn decode_args(input: &[u8]) -> Result<Vec<Value>, CodecError> {
        if input.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        match serde_json::from_slice::<Value>(input)? {
            Value::Array(args) => Ok(args),
            Value::Null => Ok(Vec::new()),
            other => Err(CodecError::NotPositional(json_type_name(&other))),
        }
    }

    /// Encode positional arguments (a tuple or a slice) as task input.
    pub fn encode_args<T: Serialize + ?Sized>(args: &T) -> Result<Vec<u8>, CodecError> {
        let value = serde_json::to_value(args)?;
        if !value.is_array() {
            return Err(CodecError::NotPositional(json_type_name(&value)));
        }
        Ok(serde_json::to_vec(&value)?)
    }

    pub fn encode_result(value: &Value) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub fn decode_result<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Ordered parameter contract of an activity.
///
/// Implemented for tuples of up to eight `DeserializeOwned` elements; `()`
/// is the contract of an activity without arguments.
pub trait ActivityArgs: Sized + Send + 'static {
    const ARITY: usize;

    fn from_args(args: Vec<Value>) -> Result<Self, CodecError>;
}

impl ActivityArgs for () {
    const ARITY: usize = 0;

    fn from_args(args: Vec<Value>) -> Result<Self, CodecError> {
        if !args.is_empty() {
            return Err(CodecError::Arity {
                expected: 0,
                actual: args.len(),
            });
        }
        Ok(())
    }
}

macro_rules! impl_activity_args {
    ($arity:expr; $($idx:tt => $T:ident),+) => {
        impl<$($T),+> ActivityArgs for ($($T,)+)
        where
            $($T: DeserializeOwned + Send + 'static),+
        {
            const ARITY: usize = $arity;

            fn from_args(args: Vec<Value>) -> Result<Self, CodecError> {
                if args.len() != $arity {
                    return Err(CodecError::Arity {
                        expected: $arity,
                        actual: args.len(),
                    });
                }
                let mut it = args.into_iter();
                Ok(($(
                    serde_json::from_value::<$T>(it.next().unwrap_or(Value::Null))
                        .map_err(|source| CodecError::Argument { index: $idx, source })?,
                )+))
            }
        }
    };
}

impl_activity_args!(1; 0 => A);
impl_activity_args!(2; 0 => A, 1 => B);
impl_activity_args!(3; 0 => A, 1 => B, 2 => C);
impl_activity_args!(4; 0 => A, 1 => B, 2 => C, 3 => D);
impl_activity_args!(5; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E);
impl_activity_args!(6; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F);
impl_activity_args!(7; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F, 6 => G);
impl_activity_args!(8; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F, 6 => G, 7 => H);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_args_reads_positional_array() {
        let args = PayloadCodec::decode_args(br#"["World", 3]"#).unwrap();
        assert_eq!(args, vec![json!("World"), json!(3)]);
    }

    #[test]
    fn empty_or_null_input_means_no_arguments() {
        assert!(PayloadCodec::decode_args(b"").unwrap().is_empty());
        assert!(PayloadCodec::decode_args(b"  \n").unwrap().is_empty());
        assert!(PayloadCodec::decode_args(b"null").unwrap().is_empty());
    }

    #[test]
    fn non_array_input_is_rejected() {
        let err = PayloadCodec::decode_args(br#"{"name":"World"}"#).unwrap_err();
        assert!(matches!(err, CodecError::NotPositional("object")));

        let err = PayloadCodec::decode_args(b"[not json").unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn tuple_contract_checks_arity_and_types() {
        let (name, n) = <(String, u32)>::from_args(vec![json!("x"), json!(2)]).unwrap();
        assert_eq!(name, "x");
        assert_eq!(n, 2);

        let err = <(String,)>::from_args(vec![json!("a"), json!("b")]).unwrap_err();
        assert!(matches!(err, CodecError::Arity { expected: 1, actual: 2 }));

        let err = <(String, u32)>::from_args(vec![json!("x"), json!("two")]).unwrap_err();
        assert!(matches!(err, CodecError::Argument { index: 1, .. }));

        assert!(<()>::from_args(vec![]).is_ok());
        assert!(<()>::from_args(vec![json!(1)]).is_err());
    }

    #[test]
    fn encode_args_requires_positional_shape() {
        let bytes = PayloadCodec::encode_args(&("World",)).unwrap();
        assert_eq!(bytes, br#"["World"]"#.to_vec());

        assert!(PayloadCodec::encode_args(&json!({"a": 1})).is_err());
    }

    #[test]
    fn result_is_a_single_json_document() {
        let bytes = PayloadCodec::encode_result(&json!("Hello World")).unwrap();
        assert_eq!(bytes, b"\"Hello World\"".to_vec());
        let back: String = PayloadCodec::decode_result(&bytes).unwrap();
        assert_eq!(back, "Hello World");
    }
}
