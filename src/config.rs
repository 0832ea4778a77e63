//! Configuration for the SSI API client.
//!
//! Every environment read happens here, at construction time. The resolved
//! [`Config`] is immutable afterwards and can be shared freely across
//! concurrent calls.

use std::env;

use crate::error::{Error, Result};

/// Environment variable holding the base URL of the API server.
pub const URL_ENV: &str = "SSI_API_URL";
/// Environment variable holding the authentication token.
pub const TOKEN_ENV: &str = "SSI_API_TOKEN";
/// Environment variable holding the project identifier.
pub const PROJECT_ENV: &str = "SSI_API_PROJECT";
/// Environment variable enabling verbose request/response tracing.
/// Any non-empty value is truthy.
pub const TRACE_ENV: &str = "SSI_API_TRACE";

/// Configuration for the SSI API client.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the API server (e.g. "https://api.example.com").
    pub url: String,
    /// Optional authentication token, sent as `X-Paf-Token`.
    pub token: Option<String>,
    /// Optional project identifier, sent as `X-Paf-Project`.
    pub project: Option<String>,
    /// Verbose logging of every call's URL, parameters and response.
    pub trace: bool,
}

impl Config {
    /// Creates a configuration from an explicit URL, with no token or
    /// project and tracing disabled.
    pub fn new<U: Into<String>>(url: U) -> Self {
        Self {
            url: normalize_url(url.into()),
            token: None,
            project: None,
            trace: false,
        }
    }

    /// Sets the authentication token.
    pub fn with_token<T: Into<String>>(mut self, token: T) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the project identifier.
    pub fn with_project<P: Into<String>>(mut self, project: P) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Enables or disables verbose call tracing.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Resolves a configuration from explicit values with environment
    /// fallback.
    ///
    /// Each of `url`, `token` and `project` is resolved independently: an
    /// explicit non-empty value wins, otherwise the corresponding
    /// `SSI_API_*` environment variable is consulted. The URL is mandatory;
    /// token and project are optional and their headers are simply omitted
    /// when unset. The trace flag is always read from [`TRACE_ENV`].
    pub fn resolve(
        url: Option<String>,
        token: Option<String>,
        project: Option<String>,
    ) -> Result<Self> {
        let url = non_empty(url).or_else(|| env_var(URL_ENV)).ok_or_else(|| {
            Error::Configuration(format!(
                "no URL specified and no {} environment variable found",
                URL_ENV
            ))
        })?;
        Ok(Self {
            url: normalize_url(url),
            token: non_empty(token).or_else(|| env_var(TOKEN_ENV)),
            project: non_empty(project).or_else(|| env_var(PROJECT_ENV)),
            trace: env_var(TRACE_ENV).is_some(),
        })
    }

    /// Resolves the whole configuration from the environment.
    pub fn from_env() -> Result<Self> {
        Self::resolve(None, None, None)
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn normalize_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
