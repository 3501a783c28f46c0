// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Portable REST library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::error::{BincodeSnafu, Error, JsonSnafu, Result, TransportError};
use crate::request::RestRequest;
use crate::xml;
use serde::de::{DeserializeOwned, IntoDeserializer};
use snafu::ResultExt;
use std::any::TypeId;
use surf::{Response, StatusCode};

/// The outcome of [RestClient::send](crate::RestClient::send).
///
/// Unlike [RestClient::execute](crate::RestClient::execute), `send` does not fail once the request
/// has gone out: the status and headers are always available, and anything that went wrong while
/// talking to the server or deserializing the body is recorded in [error](Self::error).
#[derive(Debug)]
pub struct RestResponse<T> {
    status: StatusCode,
    headers: Vec<(String, String)>,
    content: Option<T>,
    error: Option<Error>,
}

impl<T> RestResponse<T> {
    pub(crate) fn new(
        status: StatusCode,
        headers: Vec<(String, String)>,
        content: Option<T>,
        error: Option<Error>,
    ) -> Self {
        Self {
            status,
            headers,
            content,
            error,
        }
    }

    /// A response for a request which never reached the server.
    pub(crate) fn failed(error: Error) -> Self {
        Self::new(StatusCode::BadRequest, Vec::new(), None, Some(error))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The first value of the header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The deserialized body. `None` for empty bodies, unsuccessful statuses, and failures.
    pub fn content(&self) -> Option<&T> {
        self.content.as_ref()
    }

    pub fn into_content(self) -> Option<T> {
        self.content
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Convert into a [Result], failing with the recorded error if there is one.
    pub fn into_result(self) -> Result<Option<T>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.content),
        }
    }
}

pub(crate) fn header_list(res: &Response) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    for (name, values) in res.iter() {
        for value in values.iter() {
            headers.push((name.as_str().to_string(), value.as_str().to_string()));
        }
    }
    headers
}

/// Read and deserialize the body of a successful response.
///
/// The Content-Type header selects the format: XML for `application/xml` and `text/xml`, bincode
/// for `application/octet-stream`, and JSON for everything else, including a missing header.
/// Asking for a [String], or setting [RestRequest::return_raw_string], skips deserialization.
///
/// Unsuccessful statuses, `204 No Content`, and empty bodies all resolve to `None`.
pub(crate) async fn response_content<T>(
    request: &RestRequest,
    res: &mut Response,
) -> Result<Option<T>>
where
    T: DeserializeOwned + 'static,
{
    let status = res.status();
    if !status.is_success() {
        // Leave the connection clean for the next request.
        res.body_bytes().await.context(TransportError)?;
        return Ok(None);
    }
    if status == StatusCode::NoContent {
        return Ok(None);
    }

    if request.return_raw_string || TypeId::of::<T>() == TypeId::of::<String>() {
        let raw = res.body_string().await.context(TransportError)?;
        return from_raw_string(raw).map(Some);
    }

    let media_type = res.content_type().map(|mime| mime.essence().to_string());
    match media_type.as_deref() {
        Some("application/octet-stream") => {
            let bytes = res.body_bytes().await.context(TransportError)?;
            if bytes.is_empty() {
                return Ok(None);
            }
            bincode::deserialize(&bytes).context(BincodeSnafu).map(Some)
        }
        media_type => {
            let raw = res.body_string().await.context(TransportError)?;
            deserialize_text(request, media_type, &raw)
        }
    }
}

/// Deserialize a textual body of the given media type.
pub fn deserialize_text<T: DeserializeOwned>(
    request: &RestRequest,
    media_type: Option<&str>,
    raw: &str,
) -> Result<Option<T>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    match media_type {
        Some("application/xml") | Some("text/xml") => deserialize_xml(request, raw),
        _ => serde_json::from_str(raw).context(JsonSnafu).map(Some),
    }
}

/// Normalize an XML document with the request's settings, then deserialize it.
pub fn deserialize_xml<T: DeserializeOwned>(request: &RestRequest, raw: &str) -> Result<Option<T>> {
    let root = xml::parse(raw)?;
    let root = match xml::normalize(root, &request.xml_options())? {
        Some(root) => root,
        None => return Ok(None),
    };
    let contents = root.to_string();
    quick_xml::de::from_str(&contents)
        .map(Some)
        .map_err(|err| Error::XmlDeserialize {
            message: err.to_string(),
            contents,
        })
}

fn from_raw_string<T: DeserializeOwned>(raw: String) -> Result<T> {
    T::deserialize(raw.into_deserializer()).map_err(|err: serde::de::value::Error| {
        Error::RawContent {
            message: err.to_string(),
        }
    })
}
