// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Portable REST library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

mod common;

use common::{books, client, Book};
use portable_rest::{ClientOptions, Error, RestClient, RestRequest, StatusCode};
use std::net::TcpListener;

#[async_std::test]
async fn successful_response() {
    let client = client();
    let res = client
        .send::<Vec<Book>>(&RestRequest::get("books"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::Ok);
    assert!(res.is_success());
    assert!(res.error().is_none());
    assert_eq!(res.header("content-type"), Some("application/json"));
    assert_eq!(res.into_content(), Some(books()));
}

#[async_std::test]
async fn unsuccessful_status_has_no_content() {
    let client = client();
    let res = client
        .send::<Book>(&RestRequest::get("notfound"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NotFound);
    assert!(!res.is_success());
    assert!(res.content().is_none());
    assert!(res.error().is_none());
}

#[async_std::test]
async fn unsuccessful_responses_do_not_disturb_later_requests() {
    let client = client();
    for _ in 0..3 {
        let res = client
            .send::<Book>(&RestRequest::get("notfound"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NotFound);
        assert!(res.error().is_none());
    }
    let res = client
        .send::<Vec<Book>>(&RestRequest::get("books"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.into_content(), Some(books()));
}

#[async_std::test]
async fn deserialization_errors_are_recorded() {
    let client = client();
    let res = client
        .send::<Book>(&RestRequest::get("malformed"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.header("X-Request-Id"), Some("42"));
    assert!(res.content().is_none());
    assert!(matches!(res.error(), Some(Error::Json { .. })));
}

#[async_std::test]
async fn no_content() {
    let client = client();
    let res = client
        .send::<Book>(&RestRequest::get("nocontent"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NoContent);
    assert!(res.content().is_none());
    assert!(res.into_result().unwrap().is_none());
}

#[async_std::test]
async fn transport_failures_are_recorded() {
    // Bind and drop a listener to find a port nothing is listening on.
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let client = RestClient::with_options(ClientOptions {
        base_url: Some(format!("http://127.0.0.1:{}", port)),
        timeout_secs: Some(5),
        ..Default::default()
    })
    .unwrap();

    let res = client
        .send::<Book>(&RestRequest::get("books"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BadRequest);
    assert!(res.content().is_none());
    assert!(matches!(res.error(), Some(Error::Transport { .. })));

    // `execute` surfaces the same failure as an error.
    assert!(matches!(
        client.execute::<Book>(&RestRequest::get("books")).await,
        Err(Error::Transport { .. })
    ));
}

#[async_std::test]
async fn failures_before_sending_are_errors() {
    let client = RestClient::with_options(ClientOptions {
        base_url: Some("not a url".into()),
        ..Default::default()
    })
    .unwrap();
    assert!(matches!(
        client.send::<Book>(&RestRequest::get("books")).await,
        Err(Error::InvalidUri { .. })
    ));
}
