//! Exposes the fetcher to a scripting host as a module of JSON-valued
//! functions.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::engine::{Http1Engine, TransferEngine};
use crate::fetcher::{FetchError, Fetcher};

pub const MODULE_NAME: &str = "net.http.client";
pub const FETCH_URL: &str = "fetchURL";

#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("no function named {0} in this module")]
    UnknownFunction(String),

    #[error("{function} expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        function: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("argument {index} of {function} must be a {expected}")]
    ArgumentType {
        function: &'static str,
        index: usize,
        expected: &'static str,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct HostModule<E = Http1Engine> {
    fetcher: Arc<Fetcher<E>>,
}

impl<E: TransferEngine> HostModule<E> {
    pub fn new(fetcher: Arc<Fetcher<E>>) -> Self {
        Self { fetcher }
    }

    pub fn name(&self) -> &'static str {
        MODULE_NAME
    }

    /// Static members registered alongside the callable functions.
    pub fn exports(&self) -> Value {
        json!({
            "VERSION": self.fetcher.engine_version(),
            "functions": [FETCH_URL],
        })
    }

    pub fn call(&self, function: &str, args: &[Value]) -> Result<Value, BindingError> {
        match function {
            FETCH_URL => self.fetch_url(args),
            _ => Err(BindingError::UnknownFunction(function.to_string())),
        }
    }

    fn fetch_url(&self, args: &[Value]) -> Result<Value, BindingError> {
        if args.len() != 1 {
            return Err(BindingError::ArgumentCount {
                function: FETCH_URL,
                expected: 1,
                actual: args.len(),
            });
        }
        let url = args[0].as_str().ok_or(BindingError::ArgumentType {
            function: FETCH_URL,
            index: 0,
            expected: "string",
        })?;

        let result = self.fetcher.fetch(url)?;
        Ok(serde_json::to_value(result)?)
    }
}
