// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Portable REST library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::config::JsonSettings;
use crate::content::{self, ContentType, RequestBody};
use crate::encoding::{
    escape_data, escape_uri, EncodedParameter, EncodedValue, FileParameter, ParameterEncoding,
    ParameterValue, SerializedObject, UrlSegment,
};
use crate::error::{BodySnafu, Error, InvalidUriSnafu, Result};
use crate::xml::{self, XmlOptions};
use itertools::Itertools;
use serde::Serialize;
use snafu::ResultExt;
use std::fmt::{self, Display, Formatter};
use surf::http::Method;
use url::Url;

/// The location of a resource, once the template has been filled in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceUri {
    Absolute(Url),
    /// A resource built without a base URL.
    Relative(String),
}

impl ResourceUri {
    pub fn as_url(&self) -> Option<&Url> {
        match self {
            Self::Absolute(url) => Some(url),
            Self::Relative(_) => None,
        }
    }
}

impl Display for ResourceUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(url) => write!(f, "{}", url),
            Self::Relative(uri) => write!(f, "{}", uri),
        }
    }
}

/// Specifies the parameters for the HTTP request that will be executed against a given resource.
///
/// The resource is a template using `{token}` placeholders, which are filled in from the URL
/// segments when the request is sent:
///
/// ```
/// # use portable_rest::RestRequest;
/// let mut request = RestRequest::get("{entity}/Samples.aspx");
/// request.add_url_segment("entity", "Disney");
/// request.add_query_string("page", 2);
/// assert_eq!(
///     request.resource_uri(Some("http://test.com")).unwrap().to_string(),
///     "http://test.com/Disney/Samples.aspx?page=2"
/// );
/// ```
#[derive(Clone, Debug)]
pub struct RestRequest {
    method: Method,
    resource: Option<String>,
    headers: Vec<(String, String)>,
    segments: Vec<UrlSegment>,
    parameters: Vec<EncodedParameter>,
    pub content_type: ContentType,
    /// `chrono` format string for date and time members of XML bodies. Inherited from the client
    /// when unset.
    pub date_format: Option<String>,
    /// Discard the outermost element of an XML response before deserializing it.
    pub ignore_root_element: bool,
    /// Drop XML attributes instead of converting them to elements.
    pub ignore_xml_attributes: bool,
    /// Skip deserialization and hand back the response text.
    pub return_raw_string: bool,
    /// Inherited from the client when unset.
    pub json_settings: Option<JsonSettings>,
}

impl Default for RestRequest {
    fn default() -> Self {
        Self {
            method: Method::Get,
            resource: None,
            headers: Vec::new(),
            segments: Vec::new(),
            parameters: Vec::new(),
            content_type: ContentType::default(),
            date_format: None,
            ignore_root_element: false,
            ignore_xml_attributes: false,
            return_raw_string: false,
            json_settings: None,
        }
    }
}

impl RestRequest {
    pub fn new(resource: impl Into<String>, method: Method) -> Self {
        Self {
            method,
            resource: Some(resource.into()),
            ..Default::default()
        }
    }

    pub fn get(resource: impl Into<String>) -> Self {
        Self::new(resource, Method::Get)
    }

    pub fn post(resource: impl Into<String>) -> Self {
        Self::new(resource, Method::Post)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// The resource template, before any segment has been substituted.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn set_resource(&mut self, resource: impl Into<String>) {
        self.resource = Some(resource.into());
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn parameters(&self) -> &[EncodedParameter] {
        &self.parameters
    }

    pub fn url_segments(&self) -> &[UrlSegment] {
        &self.segments
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_ignore_root_element(mut self, ignore: bool) -> Self {
        self.ignore_root_element = ignore;
        self
    }

    pub fn with_ignore_xml_attributes(mut self, ignore: bool) -> Self {
        self.ignore_xml_attributes = ignore;
        self
    }

    /// Attach an unnamed object as the body of the request.
    pub fn with_body<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.add_body(body)?;
        Ok(self)
    }

    /// Add a header to this request only.
    ///
    /// Use this for values which change between requests, such as an access token which expires.
    pub fn add_header(&mut self, key: impl Into<String>, value: impl Display) {
        self.headers.push((key.into(), value.to_string()));
    }

    /// Replace the `{key}` token of the resource template with `value`.
    pub fn add_url_segment(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.segments.push(UrlSegment::new(key, value));
    }

    /// Append `key=value` to the query string of the resource.
    pub fn add_query_string(&mut self, key: impl Into<String>, value: impl Display) {
        self.segments
            .push(UrlSegment::query(key, value.to_string()));
    }

    /// Add a named, URI-encoded parameter to the body of the request.
    pub fn add_parameter(&mut self, key: impl Into<String>, value: impl Display) {
        self.add_encoded_parameter(key, value, ParameterEncoding::UriEncoded);
    }

    pub fn add_encoded_parameter(
        &mut self,
        key: impl Into<String>,
        value: impl Display,
        encoding: ParameterEncoding,
    ) {
        self.parameters.push(EncodedParameter::new(
            Some(key.into()),
            ParameterValue::Text(value.to_string()),
            encoding,
        ));
    }

    /// Add binary content, to be sent raw ([ParameterEncoding::ByteArray]) or as base 64.
    pub fn add_bytes(
        &mut self,
        key: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        encoding: ParameterEncoding,
    ) {
        self.parameters.push(EncodedParameter::new(
            Some(key.into()),
            ParameterValue::Bytes(bytes.into()),
            encoding,
        ));
    }

    /// Add an unnamed object to the body of the request.
    ///
    /// Unless the content type is [ContentType::FormUrlEncoded] or
    /// [ContentType::MultiPartFormData], only the first parameter is serialized into the body.
    pub fn add_body<T: Serialize>(&mut self, value: &T) -> Result<()> {
        self.parameters.push(EncodedParameter::new(
            None,
            ParameterValue::Object(SerializedObject::new(value)?),
            ParameterEncoding::UriEncoded,
        ));
        Ok(())
    }

    /// Add a named object. Named parameters of a JSON request are merged into one object.
    pub fn add_object<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        self.parameters.push(EncodedParameter::new(
            Some(key.into()),
            ParameterValue::Object(SerializedObject::new(value)?),
            ParameterEncoding::UriEncoded,
        ));
        Ok(())
    }

    pub fn add_file(&mut self, file: FileParameter) {
        self.parameters.push(EncodedParameter::new(
            Some(file.name.clone()),
            ParameterValue::File(file),
            ParameterEncoding::ByteArray,
        ));
    }

    /// Fill in the resource template and resolve it against `base_url`.
    ///
    /// A leading `/` on the resource and a trailing `/` on the base URL are not doubled up. A
    /// blank resource resolves to the base URL itself. Without a base URL, the result is the
    /// resource as it is, which may be relative. The request is left untouched, so calling this
    /// repeatedly gives the same answer.
    pub fn resource_uri(&self, base_url: Option<&str>) -> Result<ResourceUri> {
        let mut resource = self.resource.clone().unwrap_or_default();
        for segment in self.segments.iter().filter(|s| !s.is_query_string) {
            resource = resource.replace(
                &format!("{{{}}}", segment.key),
                &escape_uri(&segment.value),
            );
        }
        let resource = resource.trim();

        let base_url = base_url.map(str::trim).filter(|base| !base.is_empty());
        let mut uri = match base_url {
            Some(base) if !resource.is_empty() => format!(
                "{}/{}",
                base.strip_suffix('/').unwrap_or(base),
                resource.strip_prefix('/').unwrap_or(resource)
            ),
            Some(base) => base.to_string(),
            None => resource.to_string(),
        };

        let query = self
            .segments
            .iter()
            .filter(|s| s.is_query_string)
            .map(|s| format!("{}={}", escape_data(&s.key), escape_data(&s.value)))
            .join("&");
        if !query.is_empty() {
            uri.push(if uri.contains('?') { '&' } else { '?' });
            uri.push_str(&query);
        }

        if base_url.is_some() {
            let url = Url::parse(&uri).context(InvalidUriSnafu { uri: uri.as_str() })?;
            return Ok(ResourceUri::Absolute(url));
        }
        Ok(match Url::parse(&uri) {
            Ok(url) => ResourceUri::Absolute(url),
            Err(_) => ResourceUri::Relative(uri),
        })
    }

    /// The media type of the body, without parameters.
    pub fn content_type(&self) -> &'static str {
        self.content_type.media_type()
    }

    pub(crate) fn xml_options(&self) -> XmlOptions<'_> {
        XmlOptions {
            ignore_root_element: self.ignore_root_element,
            ignore_attributes: self.ignore_xml_attributes,
            date_format: self.date_format.as_deref(),
        }
    }

    /// Encode the parameters as a body of the request's content type.
    pub fn request_body(&self) -> Result<RequestBody> {
        let media_type = self.content_type.media_type();
        match self.content_type {
            ContentType::FormUrlEncoded => {
                let pairs = self
                    .parameters
                    .iter()
                    .map(form_pair)
                    .collect::<Result<Vec<_>>>()?;
                Ok(RequestBody::text(media_type, pairs.join("&")))
            }
            ContentType::Json => {
                let value = match self.parameters.first() {
                    None => return Ok(RequestBody::text(media_type, String::new())),
                    Some(first) if first.key.is_none() => first.json_value()?,
                    Some(_) => serde_json::Value::Object(
                        self.parameters
                            .iter()
                            .filter_map(|p| {
                                p.key.as_ref().map(
                                    |key| -> Result<(String, serde_json::Value)> {
                                        Ok((key.clone(), p.json_value()?))
                                    },
                                )
                            })
                            .collect::<Result<_>>()?,
                    ),
                };
                let settings = self.json_settings.unwrap_or_default();
                Ok(RequestBody::text(media_type, settings.to_string(value)?))
            }
            ContentType::Xml => {
                let first = match self.parameters.first() {
                    Some(first) => first,
                    None => return Ok(RequestBody::text(media_type, String::new())),
                };
                let serialized = match &first.value {
                    ParameterValue::Object(obj) => obj
                        .xml
                        .clone()
                        .map_err(|message| Error::XmlSerialize { message })?,
                    // Text is taken to be a document serialized by the caller.
                    ParameterValue::Text(text) => text.clone(),
                    _ => {
                        return BodySnafu {
                            message: "XML bodies need an object or a serialized document",
                        }
                        .fail()
                    }
                };
                let root = xml::parse(&serialized)?;
                let root = xml::prepare_outgoing(root, &self.xml_options());
                Ok(RequestBody::text(media_type, root.to_string()))
            }
            ContentType::ByteArray => {
                let data = match self.parameters.first() {
                    Some(first) => match first.encoded_value()? {
                        EncodedValue::Bytes(bytes) => bytes,
                        EncodedValue::Text(text) => text.into_bytes(),
                    },
                    None => Vec::new(),
                };
                Ok(RequestBody::bytes(media_type, data))
            }
            ContentType::MultiPartFormData => {
                content::multipart(&self.parameters, &content::random_boundary())
            }
        }
    }
}

fn form_pair(param: &EncodedParameter) -> Result<String> {
    let value = match param.encoded_value()? {
        EncodedValue::Text(text) => text,
        EncodedValue::Bytes(_) => {
            return BodySnafu {
                message: format!(
                    "parameter {:?} holds raw bytes, which cannot be form-encoded",
                    param.key
                ),
            }
            .fail()
        }
    };
    Ok(match &param.key {
        Some(key) => format!("{}={}", escape_data(key), value),
        None => value,
    })
}
