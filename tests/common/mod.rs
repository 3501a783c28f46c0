// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Portable REST library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! An in-process bookstore API for the integration tests.

#![allow(dead_code)]

use futures::future::BoxFuture;
use portable_rest::{ClientOptions, RestClient};
use serde::{Deserialize, Serialize};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use tide::http::mime;
use tide::{Body, Request, Response, StatusCode};
use tracing::{event, Level};

pub const USERNAME: &str = "reader";
pub const PASSWORD: &str = "open sesame";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Book {
    pub id: u32,
    pub title: String,
    pub author: String,
    pub price: f64,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct Books {
    #[serde(rename = "Book")]
    pub books: Vec<Book>,
}

pub fn books() -> Vec<Book> {
    vec![
        Book {
            id: 1,
            title: "Lover Birds".into(),
            author: "Cynthia Coleman".into(),
            price: 7.99,
        },
        Book {
            id: 2,
            title: "Splish Splash".into(),
            author: "Stefan Knorr".into(),
            price: 6.99,
        },
    ]
}

fn books_xml() -> String {
    let mut xml = String::from(r#"<Books xmlns="http://test.com/books">"#);
    for book in books() {
        xml.push_str(&format!(
            r#"<Book Id="{}"><Title>{}</Title><Author>{}</Author><Price>{}</Price></Book>"#,
            book.id, book.title, book.author, book.price
        ));
    }
    xml.push_str("</Books>");
    xml
}

/// Everything the server saw of a request, sent back as JSON by `/echo`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub user_agent: Option<String>,
    pub authorization: Option<String>,
    pub cookie: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Echo {
    pub fn header(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// A request seen by one of the `/log` routes, listed by `/log/entries`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Logged {
    pub method: String,
    pub path: String,
    pub body: String,
}

type Log = Arc<Mutex<Vec<Logged>>>;

/// Route `path` to an endpoint which records each request before answering with `respond`.
fn logged(app: &mut tide::Server<()>, log: &Log, path: &str, respond: fn() -> tide::Result) {
    let log = log.clone();
    app.at(path).all(move |mut req: Request<()>| {
        let log = log.clone();
        async move {
            let body = req.body_string().await?;
            log.lock().unwrap().push(Logged {
                method: req.method().to_string(),
                path: req.url().path().to_string(),
                body,
            });
            respond()
        }
    });
}

fn header<T>(req: &Request<T>, name: &str) -> Option<String> {
    req.header(name).map(|values| values.as_str().to_string())
}

fn wants_xml<T>(req: &Request<T>) -> bool {
    header(req, "Accept").map_or(false, |accept| accept.contains("xml"))
}

pub fn trace<'a>(req: Request<()>, next: tide::Next<'a, ()>) -> BoxFuture<'a, tide::Result> {
    Box::pin(async {
        event!(
            Level::INFO,
            "<-- received request {{method: {}, url: {}, content-type: {:?}}}",
            req.method(),
            req.url(),
            req.content_type(),
        );
        let res = next.run(req).await;
        event!(Level::INFO, "--> responding with {{status: {}}}", res.status());
        Ok(res)
    })
}

async fn echo(mut req: Request<()>) -> tide::Result {
    let body = req.body_string().await?;
    let mut headers = Vec::new();
    for (name, values) in req.iter() {
        for value in values.iter() {
            headers.push((name.as_str().to_string(), value.as_str().to_string()));
        }
    }
    let echo = Echo {
        method: req.method().to_string(),
        path: req.url().path().to_string(),
        query: req.url().query().map(str::to_string),
        content_type: header(&req, "Content-Type"),
        user_agent: header(&req, "User-Agent"),
        authorization: header(&req, "Authorization"),
        cookie: header(&req, "Cookie"),
        headers,
        body,
    };
    Ok(Response::builder(StatusCode::Ok)
        .body(Body::from_json(&echo)?)
        .build())
}

fn status_with_text(status: StatusCode, text: &'static str) -> tide::Result {
    Ok(Response::builder(status)
        .body(text)
        .content_type(mime::PLAIN)
        .build())
}

fn challenge(scheme: &'static str) -> Response {
    Response::builder(StatusCode::Unauthorized)
        .header("WWW-Authenticate", scheme)
        .build()
}

fn app() -> tide::Server<()> {
    let mut app = tide::new();
    app.with(trace);

    app.at("/books").get(|req: Request<()>| async move {
        if wants_xml(&req) {
            Ok(Response::builder(StatusCode::Ok)
                .body(books_xml())
                .header("Content-Type", "text/xml")
                .build())
        } else {
            Ok(Response::builder(StatusCode::Ok)
                .body(Body::from_json(&books())?)
                .build())
        }
    });
    app.at("/books/:id").get(|req: Request<()>| async move {
        let id: u32 = req.param("id")?.parse()?;
        match books().into_iter().find(|book| book.id == id) {
            Some(book) => Ok(Response::builder(StatusCode::Ok)
                .body(Body::from_json(&book)?)
                .build()),
            None => status_with_text(StatusCode::NotFound, "no such book"),
        }
    });
    app.at("/books/:id/cover").get(|req: Request<()>| async move {
        let id: u32 = req.param("id")?.parse()?;
        let book = books().into_iter().find(|book| book.id == id);
        Ok(Response::builder(StatusCode::Ok)
            .body(Body::from_bytes(bincode::serialize(&book)?))
            .content_type(mime::BYTE_STREAM)
            .build())
    });

    app.at("/calls").get(|_req: Request<()>| async move {
        Ok(Response::builder(StatusCode::Ok)
            .body(
                "<Response><Call Id=\"7\" xmlns:t=\"http://test.com/t\">\
                 <t:StartTime>01/02/2003 04:05</t:StartTime>\
                 <Number>864-5789</Number><Notes></Notes></Call></Response>",
            )
            .header("Content-Type", "application/xml; charset=utf-8")
            .build())
    });

    app.at("/echo").all(echo);
    app.at("/echo/*rest").all(echo);

    app.at("/nocontent")
        .get(|_req: Request<()>| async move { Ok(Response::new(StatusCode::NoContent)) });
    app.at("/empty").get(|_req: Request<()>| async move {
        Ok(Response::builder(StatusCode::Ok)
            .content_type(mime::JSON)
            .build())
    });
    app.at("/page").get(|_req: Request<()>| async move {
        Ok(Response::builder(StatusCode::Ok)
            .body("<html><body>Hello</body></html>")
            .content_type(mime::HTML)
            .build())
    });
    app.at("/malformed").get(|_req: Request<()>| async move {
        Ok(Response::builder(StatusCode::Ok)
            .body("{\"Id\": ")
            .content_type(mime::JSON)
            .header("X-Request-Id", "42")
            .build())
    });

    app.at("/notsuccess")
        .get(|_req: Request<()>| async move { status_with_text(StatusCode::BadRequest, "you asked for it") });
    app.at("/notfound")
        .get(|_req: Request<()>| async move { status_with_text(StatusCode::NotFound, "nothing here") });
    app.at("/internalservererror").get(|_req: Request<()>| async move {
        status_with_text(StatusCode::InternalServerError, "something broke")
    });

    app.at("/moved")
        .get(|_req: Request<()>| async move { Ok(tide::Redirect::new("/books")) });
    app.at("/moved/cookie").get(|_req: Request<()>| async move {
        Ok(Response::builder(StatusCode::Found)
            .header("Location", "/echo")
            .header("Set-Cookie", "hop=1; Path=/")
            .body("moved to /echo")
            .content_type(mime::PLAIN)
            .build())
    });

    let log = Log::default();
    logged(&mut app, &log, "/log", || {
        Ok(Response::builder(StatusCode::Ok)
            .body(Body::from_json(&"ok")?)
            .build())
    });
    logged(&mut app, &log, "/log/temporary", || {
        Ok(tide::Redirect::temporary("/log").into())
    });
    logged(&mut app, &log, "/log/found", || Ok(tide::Redirect::new("/log").into()));
    logged(&mut app, &log, "/log/seeother", || {
        Ok(tide::Redirect::see_other("/log").into())
    });
    logged(&mut app, &log, "/log/loop", || {
        Ok(tide::Redirect::new("/log/loop").into())
    });
    app.at("/log/entries").get(move |_req: Request<()>| {
        let log = log.clone();
        async move {
            let entries = log.lock().unwrap().clone();
            Ok(Response::builder(StatusCode::Ok)
                .body(Body::from_json(&entries)?)
                .build())
        }
    });

    app.at("/cookies/set").get(|_req: Request<()>| async move {
        Ok(Response::builder(StatusCode::Ok)
            .header("Set-Cookie", "session=abc123; Path=/")
            .body(Body::from_json(&"ok")?)
            .build())
    });
    app.at("/cookies/clear").get(|_req: Request<()>| async move {
        Ok(Response::builder(StatusCode::Ok)
            .header("Set-Cookie", "session=; Path=/")
            .body(Body::from_json(&"ok")?)
            .build())
    });

    app.at("/secure/basic").get(|req: Request<()>| async move {
        let expected = portable_rest::Credentials::new(USERNAME, PASSWORD).basic_authorization();
        if header(&req, "Authorization").as_deref() == Some(expected.as_str()) {
            Ok(Response::builder(StatusCode::Ok)
                .body(Body::from_json(&books())?)
                .build())
        } else {
            Ok(challenge("Basic realm=\"books\""))
        }
    });
    app.at("/secure/guarded").get(|req: Request<()>| async move {
        let expected = portable_rest::Credentials::new(USERNAME, PASSWORD).basic_authorization();
        if header(&req, "Authorization").as_deref() == Some(expected.as_str()) {
            Ok(Response::builder(StatusCode::Ok)
                .body(Body::from_json(&books())?)
                .build())
        } else {
            Ok(Response::builder(StatusCode::Unauthorized)
                .header("WWW-Authenticate", "Basic realm=\"books\"")
                .body("access denied: this shelf is for members only")
                .content_type(mime::PLAIN)
                .build())
        }
    });
    app.at("/secure/ntlm")
        .get(|_req: Request<()>| async move { Ok(challenge("NTLM")) });

    app
}

/// Start `app` on a free port and return its base URL.
pub fn serve_app(app: tide::Server<()>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    async_std::task::spawn(app.listen(listener));
    format!("http://127.0.0.1:{}", port)
}

/// Start the bookstore on a free port and return its base URL.
pub fn serve() -> String {
    serve_app(app())
}

/// A client pointed at a fresh test server.
pub fn client() -> RestClient {
    RestClient::with_options(ClientOptions {
        base_url: Some(serve()),
        timeout_secs: Some(10),
        ..Default::default()
    })
    .unwrap()
}
