// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Portable REST library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Client configuration.
//!
//! [ClientOptions] derives [Deserialize], so applications can keep the settings of their API
//! client in whatever configuration format they already use.

use crate::error::{JsonSnafu, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::ResultExt;
use std::time::Duration;

/// Controls how JSON request bodies are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonSettings {
    /// Indent the output.
    pub pretty: bool,
    /// Leave out object members whose value is `null`.
    pub ignore_nulls: bool,
}

impl JsonSettings {
    pub fn to_string(&self, mut value: Value) -> Result<String> {
        if self.ignore_nulls {
            strip_nulls(&mut value);
        }
        if self.pretty {
            serde_json::to_string_pretty(&value).context(JsonSnafu)
        } else {
            serde_json::to_string(&value).context(JsonSnafu)
        }
    }
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Settings for a [RestClient](crate::RestClient).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// The URL every resource is resolved against.
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    /// `chrono` format string for date and time members of XML bodies.
    pub date_format: Option<String>,
    /// Request timeout, in seconds.
    pub timeout_secs: Option<u64>,
    /// The maximum number of redirects followed for a single request.
    pub max_redirects: Option<u8>,
    pub json: Option<JsonSettings>,
}

impl ClientOptions {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
