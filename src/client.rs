// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Portable REST library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::auth::{AuthContext, Authenticator, Credentials, HandlerSettings, AUTHORIZATION};
use crate::config::{ClientOptions, JsonSettings};
use crate::content::RequestBody;
use crate::cookies::CookieContainer;
use crate::error::{Error, InvalidUriSnafu, Result, TransportError, UnsuccessfulStatusSnafu};
use crate::request::{ResourceUri, RestRequest};
use crate::response::{header_list, response_content, RestResponse};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use std::borrow::Cow;
use std::convert::TryInto;
use std::fmt::{self, Debug, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use surf::http::headers::{
    HeaderName, HeaderValue, CONTENT_TYPE, LOCATION, USER_AGENT, WWW_AUTHENTICATE,
};
use surf::http::Method;
use surf::middleware::Next;
use surf::{Client, Request, Response, StatusCode};
use tracing::{event, Level};
use url::Url;

const DEFAULT_MAX_REDIRECTS: u8 = 3;

/// Client middleware which logs every request and response on the wire.
pub fn trace(req: Request, client: Client, next: Next<'_>) -> BoxFuture<surf::Result<Response>> {
    Box::pin(async move {
        event!(
            Level::INFO,
            "--> sending request {{method: {}, url: {}, content-type: {:?}}}",
            req.method(),
            req.url(),
            req.header(CONTENT_TYPE),
        );
        let res = next.run(req, client).await;
        match &res {
            Ok(res) => event!(
                Level::INFO,
                "<-- received response {{status: {}, content-type: {:?}}}",
                res.status(),
                res.header(CONTENT_TYPE),
            ),
            Err(err) => event!(Level::WARN, "<-- request failed: {}", err),
        }
        res
    })
}

/// Everything about a request that is settled before it goes on the wire.
struct Prepared<'a> {
    request: Cow<'a, RestRequest>,
    url: Url,
    headers: Vec<(String, String)>,
    body: Option<RequestBody>,
    handler: HandlerSettings,
}

impl Prepared<'_> {
    fn has_authorization(&self) -> bool {
        self.headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(AUTHORIZATION))
    }
}

/// Executes [RestRequest]s against a base URL.
///
/// One client is meant to be shared by many requests: its headers, cookies, date format and
/// authenticator apply to all of them. A typical API wrapper owns a `RestClient` and exposes one
/// method per endpoint:
///
/// ```no_run
/// # use portable_rest::{RestClient, RestRequest};
/// # use serde::Deserialize;
/// #[derive(Deserialize)]
/// struct DirectoryList {
///     kind: String,
/// }
///
/// # async fn f() -> portable_rest::Result<()> {
/// let mut client = RestClient::new();
/// client.base_url = Some("https://www.googleapis.com/discovery/v1".into());
///
/// let mut request = RestRequest::get("apis");
/// request.add_query_string("name", "adexchangebuyer");
/// let list: Option<DirectoryList> = client.execute(&request).await?;
/// # Ok(())
/// # }
/// ```
pub struct RestClient {
    client: Client,
    /// The URL every resource is resolved against.
    pub base_url: Option<String>,
    /// Default `chrono` date format for XML bodies. Requests with their own format keep it.
    pub date_format: Option<String>,
    /// Default JSON body settings. Requests with their own settings keep them.
    pub json_settings: Option<JsonSettings>,
    user_agent: Option<String>,
    headers: Vec<(String, String)>,
    cookies: CookieContainer,
    authenticator: Option<Arc<dyn Authenticator>>,
    handler: HandlerSettings,
    max_redirects: u8,
}

impl Debug for RestClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("date_format", &self.date_format)
            .field("json_settings", &self.json_settings)
            .field("user_agent", &self.user_agent)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("authenticator", &self.authenticator)
            .finish_non_exhaustive()
    }
}

impl Default for RestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RestClient {
    pub fn new() -> Self {
        Self::from_transport(Client::new(), &ClientOptions::default())
    }

    /// Create a client from configuration.
    ///
    /// Fails only if the transport rejects the configuration.
    pub fn with_options(options: ClientOptions) -> Result<Self> {
        let transport: Client = match options.timeout() {
            Some(timeout) => surf::Config::new()
                .set_timeout(Some(timeout))
                .try_into()
                .map_err(|err| Error::Transport {
                    error: surf::Error::from_str(
                        StatusCode::InternalServerError,
                        format!("unable to configure transport: {}", err),
                    ),
                })?,
            None => Client::new(),
        };
        Ok(Self::from_transport(transport, &options))
    }

    fn from_transport(transport: Client, options: &ClientOptions) -> Self {
        let cookies = CookieContainer::new();
        let client = transport.with(cookies.clone()).with(trace);
        Self {
            client,
            base_url: options.base_url.clone(),
            date_format: options.date_format.clone(),
            json_settings: options.json,
            user_agent: options.user_agent.clone(),
            headers: Vec::new(),
            cookies,
            authenticator: None,
            handler: HandlerSettings::default(),
            max_redirects: options.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS),
        }
    }

    /// Add a header sent with every request made by this client.
    ///
    /// Values which change between requests belong on the [RestRequest] instead.
    pub fn add_header(&mut self, key: impl Into<String>, value: impl fmt::Display) {
        self.headers.push((key.into(), value.to_string()));
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Identify the calling application in the User-Agent header, as
    /// `"{display_name} {version} (portable-rest {library version})"`.
    ///
    /// Pass `env!("CARGO_PKG_NAME")` and `env!("CARGO_PKG_VERSION")` to describe your own crate.
    pub fn set_user_agent(&mut self, display_name: &str, version: &str) {
        self.user_agent = Some(format!(
            "{} {} ({} {})",
            display_name,
            version,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ));
    }

    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(|| {
            format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        })
    }

    pub fn set_authenticator(&mut self, authenticator: impl Authenticator + 'static) {
        self.authenticator = Some(Arc::new(authenticator));
    }

    pub fn clear_authenticator(&mut self) {
        self.authenticator = None;
    }

    /// Credentials the transport offers when a server challenges a request.
    pub fn set_credentials(&mut self, credentials: Option<Credentials>) {
        self.handler.credentials = credentials;
    }

    pub fn cookies(&self) -> &CookieContainer {
        &self.cookies
    }

    /// Send `request` and deserialize the body of the response.
    ///
    /// Returns `Ok(None)` for `204 No Content` and empty bodies. Any status outside of the 2xx
    /// range fails with [Error::UnsuccessfulStatus], which carries the text of the response.
    pub async fn execute<T>(&self, request: &RestRequest) -> Result<Option<T>>
    where
        T: DeserializeOwned + 'static,
    {
        let prepared = self.prepare(request)?;
        let mut res = self.transmit(&prepared).await?;
        let status = res.status();
        if !status.is_success() {
            let body = match res.body_string().await {
                Ok(body) => body,
                Err(err) => {
                    event!(Level::DEBUG, "unable to read error response body: {}", err);
                    String::new()
                }
            };
            event!(
                Level::WARN,
                "{} {} failed with status {}",
                prepared.request.method(),
                prepared.url,
                status
            );
            return UnsuccessfulStatusSnafu { status, body }.fail();
        }
        response_content(&prepared.request, &mut res).await
    }

    /// Send `request` and return everything known about the response.
    ///
    /// Problems building the request (an invalid URI, a parameter that cannot be encoded, a
    /// failing authenticator) are returned as errors. Once the request has been handed to the
    /// transport, failures are recorded on the [RestResponse] instead: a request which never got a
    /// response reports `400 Bad Request`, and a body which fails to deserialize leaves the status
    /// and headers of the response intact.
    ///
    /// A `401 Unauthorized` response with a `Basic` challenge is answered once, using the
    /// credentials set with [set_credentials](Self::set_credentials) or by an
    /// [NtlmAuthenticator](crate::NtlmAuthenticator). NTLM and Negotiate challenges need a
    /// connection-oriented handshake the transport does not support, so those responses are
    /// returned as they are.
    pub async fn send<T>(&self, request: &RestRequest) -> Result<RestResponse<T>>
    where
        T: DeserializeOwned + 'static,
    {
        let prepared = self.prepare(request)?;
        let mut res = match self.transmit(&prepared).await {
            Ok(res) => res,
            Err(err) => return Ok(RestResponse::failed(err)),
        };
        let status = res.status();
        let headers = header_list(&res);
        Ok(match response_content(&prepared.request, &mut res).await {
            Ok(content) => RestResponse::new(status, headers, content, None),
            Err(err) => {
                event!(Level::WARN, "unable to read response from {}: {}", prepared.url, err);
                RestResponse::new(status, headers, None, Some(err))
            }
        })
    }

    /// Apply the client's defaults to a request which does not set its own.
    fn inherit<'a>(&self, request: &'a RestRequest) -> Cow<'a, RestRequest> {
        let date_format = request
            .date_format
            .as_deref()
            .filter(|f| !f.trim().is_empty());
        let client_date_format = self
            .date_format
            .as_deref()
            .filter(|f| !f.trim().is_empty());
        let needs_date_format = date_format.is_none() && client_date_format.is_some();
        let needs_json_settings = request.json_settings.is_none() && self.json_settings.is_some();
        if !needs_date_format && !needs_json_settings {
            return Cow::Borrowed(request);
        }

        let mut request = request.clone();
        if needs_date_format {
            request.date_format = client_date_format.map(str::to_string);
        }
        if needs_json_settings {
            request.json_settings = self.json_settings;
        }
        Cow::Owned(request)
    }

    fn prepare<'a>(&self, request: &'a RestRequest) -> Result<Prepared<'a>> {
        let request = self.inherit(request);
        let url = match request.resource_uri(self.base_url.as_deref())? {
            ResourceUri::Absolute(url) => url,
            ResourceUri::Relative(uri) => {
                return Err(Error::InvalidUri {
                    uri,
                    source: url::ParseError::RelativeUrlWithoutBase,
                })
            }
        };

        let mut headers = vec![("User-Agent".to_string(), self.user_agent())];
        headers.extend(self.headers.iter().cloned());
        headers.extend(request.headers().iter().cloned());

        let mut handler = self.handler.clone();
        if let Some(authenticator) = &self.authenticator {
            let mut added = Vec::new();
            authenticator.authenticate(&mut AuthContext::new(&request, &mut added, &mut handler))?;
            headers.extend(added);
        }

        let body = match request.method() {
            Method::Get | Method::Head | Method::Trace => None,
            _ => Some(request.request_body()?),
        };

        event!(Level::DEBUG, "prepared {} {}", request.method(), url);
        Ok(Prepared {
            request,
            url,
            headers,
            body,
            handler,
        })
    }

    fn message(
        &self,
        prepared: &Prepared<'_>,
        hop: &Hop<'_>,
        extra: Option<(&str, &str)>,
    ) -> Request {
        let mut message = Request::new(hop.method, hop.url.clone());
        // Credentials stay with the origin they were meant for.
        let same_origin = hop.url.origin() == prepared.url.origin();
        let headers = prepared
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(extra)
            .filter(|(k, _)| same_origin || !k.eq_ignore_ascii_case(AUTHORIZATION));
        for (key, value) in headers {
            match (HeaderName::from_str(key), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    if name == CONTENT_TYPE || name == USER_AGENT {
                        message.insert_header(name, value);
                    } else {
                        message.append_header(name, value);
                    }
                }
                _ => event!(Level::WARN, "skipping invalid header {:?}", key),
            }
        }
        if let Some(body) = hop.body {
            message.set_body(surf::Body::from_bytes(body.data.clone()));
            // The body's own type wins over a Content-Type header set by hand.
            match HeaderValue::from_str(&body.content_type) {
                Ok(value) => {
                    message.insert_header(CONTENT_TYPE, value);
                }
                Err(_) => event!(Level::WARN, "invalid content type {:?}", body.content_type),
            }
        }
        message
    }

    /// Send the prepared request, following redirects.
    ///
    /// Every hop goes through the full middleware stack, so cookies set by a redirect response
    /// are stored and replayed. `303 See Other`, and `301`/`302` in answer to a `POST`, continue
    /// as a `GET` without a body; other redirects repeat the method and body.
    async fn follow(
        &self,
        prepared: &Prepared<'_>,
        extra: Option<(&str, &str)>,
    ) -> Result<Response> {
        let mut hop = Hop {
            method: prepared.request.method(),
            url: prepared.url.clone(),
            body: prepared.body.as_ref(),
        };
        let mut redirects = 0;
        loop {
            let mut res = self
                .client
                .send(self.message(prepared, &hop, extra))
                .await
                .context(TransportError)?;
            let status = res.status();
            if !is_redirect(status) {
                return Ok(res);
            }
            let location = match res.header(LOCATION) {
                Some(location) => location.as_str().to_string(),
                None => return Ok(res),
            };
            if redirects >= self.max_redirects {
                event!(
                    Level::WARN,
                    "not following redirect from {}: limit of {} reached",
                    hop.url,
                    self.max_redirects
                );
                return Ok(res);
            }
            let next = hop
                .url
                .join(&location)
                .context(InvalidUriSnafu { uri: location.as_str() })?;

            // The connection is reused, so the redirect body has to be consumed first.
            res.body_bytes().await.context(TransportError)?;

            if status == StatusCode::SeeOther
                || (hop.method == Method::Post
                    && matches!(status, StatusCode::MovedPermanently | StatusCode::Found))
            {
                hop.method = Method::Get;
                hop.body = None;
            }
            event!(Level::DEBUG, "following {} redirect {} -> {}", status, hop.url, next);
            hop.url = next;
            redirects += 1;
        }
    }

    async fn transmit(&self, prepared: &Prepared<'_>) -> Result<Response> {
        let mut res = self.follow(prepared, None).await?;
        if res.status() != StatusCode::Unauthorized || prepared.has_authorization() {
            return Ok(res);
        }
        let credentials = match &prepared.handler.credentials {
            Some(credentials) => credentials,
            None => return Ok(res),
        };

        match challenge(&res) {
            Some(Challenge::Basic) => {
                event!(Level::DEBUG, "answering Basic challenge from {}", prepared.url);
                res.body_bytes().await.context(TransportError)?;
                let authorization = credentials.basic_authorization();
                self.follow(prepared, Some((AUTHORIZATION, authorization.as_str())))
                    .await
            }
            Some(Challenge::Unsupported(scheme)) => {
                event!(
                    Level::WARN,
                    "{} challenged with the {} scheme, which this transport cannot answer",
                    prepared.url,
                    scheme
                );
                Ok(res)
            }
            None => Ok(res),
        }
    }
}

/// One request on the way to the final response.
struct Hop<'a> {
    method: Method,
    url: Url,
    body: Option<&'a RequestBody>,
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MovedPermanently
            | StatusCode::Found
            | StatusCode::SeeOther
            | StatusCode::TemporaryRedirect
            | StatusCode::PermanentRedirect
    )
}

#[derive(Debug, PartialEq, Eq)]
enum Challenge {
    Basic,
    Unsupported(String),
}

/// The most useful scheme offered in the `WWW-Authenticate` headers of a response.
fn challenge(res: &Response) -> Option<Challenge> {
    let values = res.header(WWW_AUTHENTICATE)?;
    let schemes = values
        .iter()
        .filter_map(|value| value.as_str().split_whitespace().next().map(str::to_string))
        .collect::<Vec<_>>();
    if schemes.iter().any(|s| s.eq_ignore_ascii_case("basic")) {
        Some(Challenge::Basic)
    } else {
        schemes.into_iter().next().map(Challenge::Unsupported)
    }
}
