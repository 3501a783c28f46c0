// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Portable REST library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Value holders for URL tokens and body parameters, and the encoding policy attached to each.

use crate::error::{InvalidParameterSnafu, JsonSnafu, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::borrow::Cow;

/// Everything but the RFC 3986 unreserved characters.
const DATA: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Characters which are never legal in a URI. Reserved characters such as `/`, `?`, `&` and `=`
/// pass through, so a segment value may itself contain a path or a query.
const URI_STRING: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Escape a string for use as a query-string key or value, or a form field.
pub fn escape_data(value: &str) -> Cow<'_, str> {
    utf8_percent_encode(value, DATA).into()
}

/// Escape a string for substitution into a resource template.
pub fn escape_uri(value: &str) -> Cow<'_, str> {
    utf8_percent_encode(value, URI_STRING).into()
}

/// Specifies how a body parameter should be encoded before transmission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterEncoding {
    /// Bytes, sent as a standard base 64 string.
    Base64,
    /// Bytes, sent as they are.
    ByteArray,
    /// The string form of the value, percent-encoded.
    UriEncoded,
    /// The string form of the value, sent as it is.
    Unencoded,
}

impl Default for ParameterEncoding {
    fn default() -> Self {
        Self::UriEncoded
    }
}

/// A replaceable `{token}` in a resource template, or one query-string pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlSegment {
    pub key: String,
    pub value: String,
    /// Whether the segment is appended to the query string rather than substituted into the path.
    pub is_query_string: bool,
}

impl UrlSegment {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            is_query_string: false,
        }
    }

    pub fn query(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            is_query_string: true,
            ..Self::new(key, value)
        }
    }
}

/// A file uploaded as one part of a multipart request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileParameter {
    pub name: String,
    pub file_name: Option<String>,
    pub data: Vec<u8>,
}

impl FileParameter {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>, file_name: Option<&str>) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.map(String::from),
            data: data.into(),
        }
    }
}

/// An object captured at the time it was added to a request.
///
/// The value is serialized eagerly into every representation a body might need, so the request
/// does not have to stay generic over the type of each parameter. XML serialization is allowed to
/// fail here (not every serde type has an XML shape); the error only surfaces if the request is
/// actually sent as XML.
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedObject {
    pub json: serde_json::Value,
    pub xml: std::result::Result<String, String>,
}

impl SerializedObject {
    pub fn new<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self {
            json: serde_json::to_value(value).context(JsonSnafu)?,
            xml: quick_xml::se::to_string(value).map_err(|err| err.to_string()),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParameterValue {
    Text(String),
    Bytes(Vec<u8>),
    Object(SerializedObject),
    File(FileParameter),
}

/// The result of applying a [ParameterEncoding] to a [ParameterValue].
#[derive(Clone, Debug, PartialEq)]
pub enum EncodedValue {
    Text(String),
    Bytes(Vec<u8>),
}

/// A parameter that can be passed over an HTTP request with a given encoding.
///
/// Parameters are encoded individually: some parameters in a request may need to be sent raw,
/// while others need to be URI-encoded.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedParameter {
    /// `None` for positional body parameters.
    pub key: Option<String>,
    pub value: ParameterValue,
    pub encoding: ParameterEncoding,
}

impl EncodedParameter {
    pub fn new(key: Option<String>, value: ParameterValue, encoding: ParameterEncoding) -> Self {
        Self {
            key,
            value,
            encoding,
        }
    }

    /// The string form of the value, before any encoding.
    fn raw_text(&self) -> Cow<'_, str> {
        match &self.value {
            ParameterValue::Text(text) => Cow::Borrowed(text),
            ParameterValue::Bytes(bytes) => String::from_utf8_lossy(bytes),
            ParameterValue::Object(obj) => match &obj.json {
                serde_json::Value::String(s) => Cow::Borrowed(s),
                other => Cow::Owned(other.to_string()),
            },
            ParameterValue::File(file) => String::from_utf8_lossy(&file.data),
        }
    }

    fn bytes(&self) -> Result<&[u8]> {
        match &self.value {
            ParameterValue::Bytes(bytes) => Ok(bytes),
            ParameterValue::File(file) => Ok(&file.data),
            _ => InvalidParameterSnafu {
                key: self.key.clone(),
                encoding: self.encoding,
            }
            .fail(),
        }
    }

    /// Apply the parameter's encoding policy.
    ///
    /// [ParameterEncoding::Base64] and [ParameterEncoding::ByteArray] only make sense for byte
    /// values; using them with anything else is an [Error::InvalidParameter](crate::Error).
    pub fn encoded_value(&self) -> Result<EncodedValue> {
        Ok(match self.encoding {
            ParameterEncoding::Base64 => EncodedValue::Text(BASE64.encode(self.bytes()?)),
            ParameterEncoding::ByteArray => EncodedValue::Bytes(self.bytes()?.to_vec()),
            ParameterEncoding::Unencoded => EncodedValue::Text(self.raw_text().into_owned()),
            ParameterEncoding::UriEncoded => {
                EncodedValue::Text(escape_data(&self.raw_text()).into_owned())
            }
        })
    }

    /// The value as a JSON member of a merged body object.
    pub(crate) fn json_value(&self) -> Result<serde_json::Value> {
        Ok(match &self.value {
            ParameterValue::Object(obj) => obj.json.clone(),
            ParameterValue::Text(text) => serde_json::Value::String(text.clone()),
            ParameterValue::Bytes(_) | ParameterValue::File(_) => {
                serde_json::Value::String(BASE64.encode(self.bytes()?))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(value: ParameterValue, encoding: ParameterEncoding) -> EncodedParameter {
        EncodedParameter::new(Some("key".into()), value, encoding)
    }

    #[test]
    fn data_escaping_keeps_only_unreserved_characters() {
        assert_eq!(escape_data("a b&c=d/e~f_g.h-i"), "a%20b%26c%3Dd%2Fe~f_g.h-i");
        assert_eq!(escape_data("Grüße"), "Gr%C3%BC%C3%9Fe");
    }

    #[test]
    fn uri_escaping_keeps_reserved_characters() {
        assert_eq!(escape_uri("a b/c?d=e&f"), "a%20b/c?d=e&f");
        assert_eq!(escape_uri("{x}"), "%7Bx%7D");
    }

    #[test]
    fn encoding_policies() {
        let text = ParameterValue::Text("hello world".into());
        assert_eq!(
            param(text.clone(), ParameterEncoding::UriEncoded)
                .encoded_value()
                .unwrap(),
            EncodedValue::Text("hello%20world".into())
        );
        assert_eq!(
            param(text, ParameterEncoding::Unencoded)
                .encoded_value()
                .unwrap(),
            EncodedValue::Text("hello world".into())
        );

        let bytes = ParameterValue::Bytes(b"abc".to_vec());
        assert_eq!(
            param(bytes.clone(), ParameterEncoding::Base64)
                .encoded_value()
                .unwrap(),
            EncodedValue::Text("YWJj".into())
        );
        assert_eq!(
            param(bytes, ParameterEncoding::ByteArray)
                .encoded_value()
                .unwrap(),
            EncodedValue::Bytes(b"abc".to_vec())
        );
    }

    #[test]
    fn byte_encodings_reject_text() {
        for encoding in [ParameterEncoding::Base64, ParameterEncoding::ByteArray] {
            let err = param(ParameterValue::Text("nope".into()), encoding)
                .encoded_value()
                .unwrap_err();
            assert!(matches!(err, crate::Error::InvalidParameter { .. }), "{}", err);
        }
    }

    #[test]
    fn objects_use_their_json_string_form() {
        let obj = SerializedObject::new(&42u32).unwrap();
        assert_eq!(
            param(ParameterValue::Object(obj), ParameterEncoding::UriEncoded)
                .encoded_value()
                .unwrap(),
            EncodedValue::Text("42".into())
        );
    }
}
