// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Portable REST library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Authenticators, which prepare outgoing requests before they are sent.

use crate::error::Result;
use crate::request::RestRequest;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::fmt::{self, Debug, Formatter};

pub const AUTHORIZATION: &str = "Authorization";

/// A user name and password, optionally scoped to a domain.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: None,
        }
    }

    /// The value of an `Authorization` header using the Basic scheme (RFC 7617).
    pub fn basic_authorization(&self) -> String {
        let user = match &self.domain {
            Some(domain) => format!("{}\\{}", domain, self.username),
            None => self.username.clone(),
        };
        format!(
            "Basic {}",
            BASE64.encode(format!("{}:{}", user, self.password))
        )
    }
}

// Keep passwords out of logs.
impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

/// Transport settings which an authenticator may adjust for a single request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandlerSettings {
    /// Credentials offered when the server answers with an authentication challenge.
    pub credentials: Option<Credentials>,
}

/// The pieces of an outgoing request an [Authenticator] may inspect and change.
pub struct AuthContext<'a> {
    request: &'a RestRequest,
    headers: &'a mut Vec<(String, String)>,
    handler: &'a mut HandlerSettings,
}

impl<'a> AuthContext<'a> {
    pub(crate) fn new(
        request: &'a RestRequest,
        headers: &'a mut Vec<(String, String)>,
        handler: &'a mut HandlerSettings,
    ) -> Self {
        Self {
            request,
            headers,
            handler,
        }
    }

    pub fn request(&self) -> &RestRequest {
        self.request
    }

    /// Add a header to the outgoing message.
    pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.push((key.into(), value.into()));
    }

    pub fn has_header(&self, key: &str) -> bool {
        self.headers
            .iter()
            .chain(self.request.headers())
            .any(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    pub fn handler(&mut self) -> &mut HandlerSettings {
        self.handler
    }
}

/// Authenticates requests made by a [RestClient](crate::RestClient).
///
/// The client calls [authenticate](Authenticator::authenticate) exactly once for each request,
/// after the URI and headers are known and before anything is sent. An error aborts the request.
pub trait Authenticator: Debug + Send + Sync {
    fn authenticate(&self, context: &mut AuthContext<'_>) -> Result<()>;
}

/// Sends a user name and password with every request, using the Basic scheme.
#[derive(Clone, Debug)]
pub struct BasicAuthenticator {
    credentials: Credentials,
}

impl BasicAuthenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::new(username, password),
        }
    }
}

impl Authenticator for BasicAuthenticator {
    fn authenticate(&self, context: &mut AuthContext<'_>) -> Result<()> {
        // A header set on the request itself wins.
        if !context.has_header(AUTHORIZATION) {
            context.add_header(AUTHORIZATION, self.credentials.basic_authorization());
        }
        Ok(())
    }
}

/// Hands credentials to the transport, which offers them when the server challenges the request.
///
/// Nothing is sent up front. Challenge handling is up to the client: see
/// [RestClient::send](crate::RestClient::send) for the schemes it answers.
#[derive(Clone, Debug)]
pub struct NtlmAuthenticator {
    credentials: Credentials,
}

impl NtlmAuthenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::with_credentials(Credentials::new(username, password))
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl Authenticator for NtlmAuthenticator {
    fn authenticate(&self, context: &mut AuthContext<'_>) -> Result<()> {
        context.handler().credentials = Some(self.credentials.clone());
        Ok(())
    }
}
