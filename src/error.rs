// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Portable REST library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::encoding::ParameterEncoding;
use snafu::{IntoError, Snafu};
use surf::StatusCode;

/// Errors raised while building a request, talking to the server, or resolving a response.
///
/// Errors which happen before a request is sent (an unparseable resource URI, a parameter whose
/// value does not fit its [ParameterEncoding], a failing authenticator) are always returned to the
/// caller. Errors which happen once a response exists are either returned (by
/// [RestClient::execute](crate::RestClient::execute)) or recorded on the
/// [RestResponse](crate::RestResponse) (by [RestClient::send](crate::RestClient::send)).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("invalid resource URI {}: {}", uri, source))]
    InvalidUri { uri: String, source: url::ParseError },

    #[snafu(display(
        "parameter {:?} must be passed in as bytes to use {:?} encoding",
        key,
        encoding
    ))]
    InvalidParameter {
        key: Option<String>,
        encoding: ParameterEncoding,
    },

    #[snafu(display("unable to build request body: {}", message))]
    Body { message: String },

    #[snafu(display("the JSON converter failed: {}", source))]
    Json { source: serde_json::Error },

    #[snafu(display("response body fails to deserialize: {}", source))]
    Bincode { source: bincode::Error },

    #[snafu(display("unable to convert the response text: {}", message))]
    RawContent { message: String },

    #[snafu(display("malformed XML: {}", message))]
    XmlParse { message: String },

    #[snafu(display("unable to serialize XML body: {}", message))]
    XmlSerialize { message: String },

    /// The XML deserializer rejected the normalized document.
    ///
    /// `contents` holds the document as it was handed to the deserializer, which usually makes it
    /// obvious which node the target type does not accept.
    #[snafu(display("the XML deserializer failed: {}", message))]
    XmlDeserialize { message: String, contents: String },

    #[snafu(display("element <{}> has no child element to use as the root", element))]
    MissingRootChild { element: String },

    #[snafu(display(
        "value {:?} of <{}> does not match date format {:?}: {}",
        value,
        element,
        format,
        source
    ))]
    DateFormat {
        element: String,
        value: String,
        format: String,
        source: chrono::ParseError,
    },

    #[snafu(display("authentication failed: {}", message))]
    Authentication { message: String },

    #[snafu(display("request failed: {}", error))]
    Transport { error: surf::Error },

    /// The server answered, but with a status outside of the 2xx range.
    #[snafu(display("response status code does not indicate success: {}", status))]
    UnsuccessfulStatus { status: StatusCode, body: String },
}

impl Error {
    /// The HTTP status associated with this error, if there is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::UnsuccessfulStatus { status, .. } => Some(*status),
            Self::Transport { error } => Some(error.status()),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Context for embedding transport errors into [Error].
///
/// [surf::Error] does not implement [std::error::Error], so it cannot be a SNAFU `source`. This
/// type implements [IntoError] by hand, so `some_result.context(TransportError)` works just like an
/// automatically generated context selector.
pub struct TransportError;

impl IntoError<Error> for TransportError {
    type Source = surf::Error;

    fn into_error(self, error: Self::Source) -> Error {
        Error::Transport { error }
    }
}

/// Map any displayable XML parser error into [Error::XmlParse].
pub(crate) fn xml_parse_error(err: impl std::fmt::Display) -> Error {
    Error::XmlParse {
        message: err.to_string(),
    }
}
