// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Portable REST library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::encoding::{EncodedParameter, EncodedValue, ParameterValue};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// The types of content supported in request bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    ByteArray,
    FormUrlEncoded,
    Json,
    Xml,
    MultiPartFormData,
}

impl Default for ContentType {
    fn default() -> Self {
        Self::FormUrlEncoded
    }
}

impl ContentType {
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::ByteArray => "application/octet-stream",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::Json => "application/json",
            Self::Xml => "application/xml",
            Self::MultiPartFormData => "multipart/form-data",
        }
    }
}

/// An encoded request body, ready to be attached to an HTTP message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestBody {
    /// The full Content-Type header value, including parameters such as the multipart boundary.
    pub content_type: String,
    pub data: Vec<u8>,
}

impl RequestBody {
    pub fn text(content_type: &str, text: String) -> Self {
        Self {
            content_type: format!("{}; charset=utf-8", content_type),
            data: text.into_bytes(),
        }
    }

    pub fn bytes(content_type: &str, data: Vec<u8>) -> Self {
        Self {
            content_type: content_type.to_string(),
            data,
        }
    }

    /// The body as UTF-8 text, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

/// Assemble a `multipart/form-data` body with one part per parameter.
///
/// Files become file parts (with a filename when they have one), byte-encoded parameters become
/// binary parts, and everything else is sent as a text part containing the encoded value.
pub fn multipart(parameters: &[EncodedParameter], boundary: &str) -> Result<RequestBody> {
    let mut data = Vec::new();
    for param in parameters {
        let mut head = format!("--{}\r\nContent-Disposition: form-data", boundary);
        let name = match &param.value {
            ParameterValue::File(file) => Some(file.name.as_str()),
            _ => param.key.as_deref(),
        };
        if let Some(name) = name {
            write!(head, "; name=\"{}\"", quote(name)).ok();
        }

        let content = match &param.value {
            ParameterValue::File(file) => {
                if let Some(file_name) = &file.file_name {
                    write!(head, "; filename=\"{}\"", quote(file_name)).ok();
                }
                head.push_str("\r\nContent-Type: application/octet-stream");
                file.data.clone()
            }
            _ => match param.encoded_value()? {
                EncodedValue::Bytes(bytes) => {
                    head.push_str("\r\nContent-Type: application/octet-stream");
                    bytes
                }
                EncodedValue::Text(text) => {
                    head.push_str("\r\nContent-Type: text/plain; charset=utf-8");
                    text.into_bytes()
                }
            },
        };
        head.push_str("\r\n\r\n");

        data.extend_from_slice(head.as_bytes());
        data.extend_from_slice(&content);
        data.extend_from_slice(b"\r\n");
    }
    data.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    Ok(RequestBody {
        content_type: format!(
            "{}; boundary={}",
            ContentType::MultiPartFormData.media_type(),
            boundary
        ),
        data,
    })
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A boundary which is vanishingly unlikely to appear in any part.
pub fn random_boundary() -> String {
    format!("{:032x}", rand::random::<u128>())
}
