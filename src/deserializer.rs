//! Deserialization adapters turning raw key/value bytes into typed values.
//!
//! A [`Deserializer`] has two capabilities: decode a byte span for a topic,
//! and consume the configuration keys it understands. Configure must hand
//! back every key it did not consume, so the consumer can chain the key and
//! value side and check that nothing was swallowed by the wrong component.
//!
//! Which side decodes how is picked once, at construction, through
//! [`Decoder`]: a typed deserializer, the null marker or the ignore marker.

use std::{fmt, marker::PhantomData};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{
    config::{property_names, ClientConfig},
    error::{Error, Result},
    message::Payload,
};

/// A key or value could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DeserializeError {
    message: String,
}

impl DeserializeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for DeserializeError {
    fn from(err: serde_json::Error) -> Self {
        DeserializeError::new(format!("invalid JSON: {}", err))
    }
}

/// Decode raw bytes of a record key or value.
pub trait Deserializer<T>: Send {
    /// `data` is empty when `is_null` is set.
    fn deserialize(
        &self,
        topic: &str,
        data: &[u8],
        is_null: bool,
    ) -> std::result::Result<T, DeserializeError>;

    /// Consume the keys this deserializer understands and return the rest.
    fn configure(&mut self, config: ClientConfig, _is_key: bool) -> Result<ClientConfig> {
        Ok(config)
    }
}

impl<T, F> Deserializer<T> for F
where
    F: Fn(&str, &[u8], bool) -> std::result::Result<T, DeserializeError> + Send,
{
    fn deserialize(
        &self,
        topic: &str,
        data: &[u8],
        is_null: bool,
    ) -> std::result::Result<T, DeserializeError> {
        self(topic, data, is_null)
    }
}

/// How one side of a record is decoded.
pub enum Decoder<T> {
    /// Decode with the given deserializer.
    Typed(Box<dyn Deserializer<T>>),
    /// Only null data is accepted and it decodes to [`Payload::Null`].
    Null,
    /// Data is discarded and decodes to [`Payload::Ignored`].
    Ignore,
}

impl<T> Decoder<T> {
    pub fn typed(deserializer: impl Deserializer<T> + 'static) -> Self {
        Decoder::Typed(Box::new(deserializer))
    }

    pub(crate) fn configure(&mut self, config: ClientConfig, is_key: bool) -> Result<ClientConfig> {
        match self {
            Decoder::Typed(deserializer) => deserializer.configure(config, is_key),
            Decoder::Null | Decoder::Ignore => Ok(config),
        }
    }

    pub(crate) fn decode(
        &self,
        topic: &str,
        data: Option<&[u8]>,
    ) -> std::result::Result<Payload<T>, DeserializeError> {
        match self {
            Decoder::Typed(deserializer) => {
                let is_null = data.is_none();
                deserializer
                    .deserialize(topic, data.unwrap_or(&[]), is_null)
                    .map(Payload::Value)
            }
            Decoder::Null => match data {
                None => Ok(Payload::Null),
                Some(_) => Err(DeserializeError::new(
                    "the null decoder may only be used with data that is null",
                )),
            },
            Decoder::Ignore => Ok(Payload::Ignored),
        }
    }
}

impl<T> fmt::Debug for Decoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoder::Typed(_) => write!(f, "Decoder::Typed"),
            Decoder::Null => write!(f, "Decoder::Null"),
            Decoder::Ignore => write!(f, "Decoder::Ignore"),
        }
    }
}

/// Character encodings understood by [`StringDeserializer`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
}

impl Encoding {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            "latin1" | "latin-1" | "iso-8859-1" => Ok(Encoding::Latin1),
            other => Err(Error::Config(format!("unsupported encoding '{}'", other))),
        }
    }

    fn decode(&self, data: &[u8]) -> std::result::Result<String, DeserializeError> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(data)
                .map(str::to_owned)
                .map_err(|err| DeserializeError::new(format!("invalid UTF-8: {}", err))),
            Encoding::Ascii => match data.iter().position(|b| !b.is_ascii()) {
                Some(index) => Err(DeserializeError::new(format!(
                    "non-ASCII byte at position {}",
                    index
                ))),
                None => Ok(data.iter().map(|b| *b as char).collect()),
            },
            Encoding::Latin1 => Ok(data.iter().map(|b| *b as char).collect()),
        }
    }
}

/// Decodes text. Null data decodes to `None`.
///
/// The encoding is either passed to [`StringDeserializer::with_encoding`] or
/// read from `string.deserializer.encoding.key` / `.value`, not both.
#[derive(Debug, Clone, Default)]
pub struct StringDeserializer {
    encoding: Encoding,
    explicit: bool,
}

impl StringDeserializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding(encoding: Encoding) -> Self {
        Self {
            encoding,
            explicit: true,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }
}

impl Deserializer<Option<String>> for StringDeserializer {
    fn deserialize(
        &self,
        _topic: &str,
        data: &[u8],
        is_null: bool,
    ) -> std::result::Result<Option<String>, DeserializeError> {
        if is_null {
            return Ok(None);
        }
        self.encoding.decode(data).map(Some)
    }

    fn configure(&mut self, mut config: ClientConfig, is_key: bool) -> Result<ClientConfig> {
        let property = if is_key {
            property_names::STRING_DESERIALIZER_ENCODING_KEY
        } else {
            property_names::STRING_DESERIALIZER_ENCODING_VALUE
        };

        if let Some(name) = config.remove(property) {
            if self.explicit {
                return Err(Error::Config(format!(
                    "'{}' was set while the deserializer already has an encoding",
                    property
                )));
            }
            self.encoding = Encoding::parse(&name)?;
            tracing::debug!("Configured string deserializer with {:?}", self.encoding);
        }

        Ok(config)
    }
}

/// Hands out the raw bytes. Null data decodes to `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesDeserializer;

impl Deserializer<Option<Bytes>> for BytesDeserializer {
    fn deserialize(
        &self,
        _topic: &str,
        data: &[u8],
        is_null: bool,
    ) -> std::result::Result<Option<Bytes>, DeserializeError> {
        if is_null {
            return Ok(None);
        }
        Ok(Some(Bytes::copy_from_slice(data)))
    }
}

macro_rules! big_endian_deserializer {
    ($name:ident, $ty:ty, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Deserializer<Option<$ty>> for $name {
            fn deserialize(
                &self,
                _topic: &str,
                data: &[u8],
                is_null: bool,
            ) -> std::result::Result<Option<$ty>, DeserializeError> {
                if is_null {
                    return Ok(None);
                }
                let bytes: [u8; std::mem::size_of::<$ty>()] = data.try_into().map_err(|_| {
                    DeserializeError::new(format!(
                        "expected {} bytes, got {}",
                        std::mem::size_of::<$ty>(),
                        data.len()
                    ))
                })?;
                Ok(Some(<$ty>::from_be_bytes(bytes)))
            }
        }
    };
}

big_endian_deserializer!(IntDeserializer, i32, "Big-endian 32 bit signed integer.");
big_endian_deserializer!(LongDeserializer, i64, "Big-endian 64 bit signed integer.");
big_endian_deserializer!(FloatDeserializer, f32, "Big-endian IEEE 754 single precision.");
big_endian_deserializer!(DoubleDeserializer, f64, "Big-endian IEEE 754 double precision.");

/// Decodes JSON documents with serde. Null data decodes to `None`.
pub struct JsonDeserializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDeserializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonDeserializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Deserializer<Option<T>> for JsonDeserializer<T> {
    fn deserialize(
        &self,
        _topic: &str,
        data: &[u8],
        is_null: bool,
    ) -> std::result::Result<Option<T>, DeserializeError> {
        if is_null {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(data)?))
    }
}
