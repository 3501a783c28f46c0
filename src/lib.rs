// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Portable REST library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! # A small framework for writing clients of REST APIs.
//!
//! A [RestRequest] describes one call: a resource template such as `themes/{theme}/sets`, the URL
//! segments and query strings which fill it in, headers, and body parameters. A [RestClient] holds
//! what is shared between calls (the base URL, default headers, cookies, an [Authenticator]) and
//! turns requests into HTTP messages on top of `surf`.
//!
//! Request bodies are encoded according to the request's [ContentType]: form URL encoding, JSON,
//! XML, raw bytes, or multipart form data. Response bodies are decoded according to the
//! Content-Type header of the response, so any type implementing [serde::Deserialize] can be the
//! target of a call. XML responses are normalized first: attributes become child elements,
//! namespaces are dropped, and dates are rewritten into the canonical form `serde` expects. This
//! lets one derived type serve both the JSON and XML flavors of an API.
//!
//! [RestClient::execute] returns the deserialized body and fails on any problem, including a
//! status outside of the 2xx range. [RestClient::send] never fails once the request is on the wire;
//! it returns a [RestResponse] which carries the status, headers, and any error alongside the
//! content.

pub mod auth;
pub mod client;
pub mod config;
pub mod content;
pub mod cookies;
pub mod encoding;
pub mod error;
pub mod request;
pub mod response;
pub mod xml;

pub use auth::{Authenticator, BasicAuthenticator, Credentials, NtlmAuthenticator};
pub use client::RestClient;
pub use config::{ClientOptions, JsonSettings};
pub use content::ContentType;
pub use cookies::CookieContainer;
pub use encoding::{FileParameter, ParameterEncoding};
pub use error::*;
pub use request::{ResourceUri, RestRequest};
pub use response::RestResponse;
pub use surf::http::Method;
pub use surf::StatusCode;
