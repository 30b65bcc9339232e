use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;

use super::{strip_termination, Transport};
use crate::protocol::{ScpiRequest, ScpiResponse};
use crate::Error;

/// Replays canned responses and records every request it sees.
/// Running out of responses behaves like an instrument that never answers.
#[derive(Default)]
pub(crate) struct MockTransport {
    pub requests: Vec<ScpiRequest>,
    pub responses: VecDeque<String>,
    pub timeout: Option<Duration>,
}

impl MockTransport {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn writes(&self) -> Vec<&str> {
        self.requests
            .iter()
            .filter_map(|x| match x {
                ScpiRequest::Write(msg) => Some(msg.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn queries(&self) -> Vec<&str> {
        self.requests
            .iter()
            .filter_map(|x| match x {
                ScpiRequest::QueryString(msg) => Some(msg.as_str()),
                _ => None,
            })
            .collect()
    }

    fn next_line(&mut self) -> crate::Result<ScpiResponse> {
        let line = self.responses.pop_front().ok_or_else(Error::protocol_timeout)?;
        Ok(ScpiResponse::String(strip_termination(line)))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&mut self, req: ScpiRequest) -> crate::Result<ScpiResponse> {
        self.requests.push(req.clone());
        match req {
            ScpiRequest::Write(_) => Ok(ScpiResponse::Done),
            ScpiRequest::QueryString(_) | ScpiRequest::ReadLine => self.next_line(),
        }
    }

    async fn set_timeout(&mut self, timeout: Duration) -> crate::Result<()> {
        self.timeout = Some(timeout);
        Ok(())
    }
}
