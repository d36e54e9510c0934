//=====================================================
// File: interop/remote.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Remote endpoint invocation
// Objective: Route fit aliases through a host broker and HTTP aliases through
//            a shared ureq agent
//=====================================================

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use ureq::Agent;

use super::util::{host_to_json, json_to_host};
use super::{HostError, HostValue};

/// Host-side dispatcher for genericable (fit) calls.
pub trait FitBroker: Send + Sync {
    fn invoke(&self, genericable_id: &str, args: Vec<HostValue>) -> Result<HostValue, HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        Some(match text.to_ascii_uppercase().as_str() {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "DELETE" => HttpMethod::Delete,
            _ => return None,
        })
    }

    /// Parameters an alias of this method takes: GET none, others a body.
    pub fn arity(self) -> usize {
        match self {
            HttpMethod::Get => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blocking HTTP client shared by every HTTP alias of one runtime.
#[derive(Clone)]
pub struct HttpClient {
    agent: Agent,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    //Function: call
    //Purpose: Issue one request and marshal its response
    //Inputs: url, method, args (first argument is the JSON body for non-GET)
    //Returns: Result<HostValue, HostError>
    pub fn call(&self, url: &str, method: HttpMethod, args: &[HostValue]) -> Result<HostValue, HostError> {
        debug!(target: "ohscript::interop", %method, url, "http call");
        let request = self.agent.request(method.as_str(), url);
        let response = match (method, args.first()) {
            (HttpMethod::Get, _) | (_, None) => request.call(),
            (_, Some(body)) => request.send_json(host_to_json(body)?),
        }
        .map_err(|err| HostError::Failed(format!("{} {} failed: {}", method, url, err)))?;
        value_from_response(response)
    }
}

fn value_from_response(response: ureq::Response) -> Result<HostValue, HostError> {
    let is_json = response.content_type().contains("application/json");
    let body = response
        .into_string()
        .map_err(|err| HostError::Failed(format!("failed to read response body: {}", err)))?;
    if is_json {
        let json = serde_json::from_str(&body)
            .map_err(|err| HostError::Failed(format!("failed to parse JSON response: {}", err)))?;
        return Ok(json_to_host(&json));
    }
    Ok(HostValue::String(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_parse_case_insensitively() {
        assert_eq!(HttpMethod::parse("post"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::parse("PATCH"), None);
        assert_eq!(HttpMethod::Get.arity(), 0);
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
    }

    #[test]
    fn unreachable_host_is_a_failure() {
        let client = HttpClient::new(Duration::from_millis(200));
        let err = client
            .call("http://127.0.0.1:9/nothing", HttpMethod::Get, &[])
            .expect_err("connection refused");
        assert!(matches!(err, HostError::Failed(_)));
    }
}

//=====================================================
// End of file
//=====================================================
