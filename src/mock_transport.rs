//! A scripted [`Transport`], so that services can be tested without a server
//!
//! Replies are queued beforehand and handed out in order, one per request. Every request that
//! reaches the transport is recorded.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::transport::{Headers, Request, Response, Transport, TransportError};

/// What the mock transport does with one request
#[derive(Clone, Debug)]
pub enum MockReply {
    Respond {
        status: u16,
        headers: Headers,
        body: Vec<u8>,
    },
    /// Fails the exchange
    Fail(TransportError),
    /// Never answers. The request stays in flight until it is cancelled or times out.
    Hang,
}

impl MockReply {
    /// An empty response with this status
    pub fn status(status: u16) -> Self {
        MockReply::Respond { status, headers: Headers::new(), body: Vec::new() }
    }

    /// Adds a header to a response. No effect on other replies.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let MockReply::Respond { headers, .. } = &mut self {
            headers.append(name, value);
        }
        self
    }

    /// Sets the body of a response. No effect on other replies.
    pub fn with_body<B: Into<Vec<u8>>>(mut self, new_body: B) -> Self {
        if let MockReply::Respond { body, .. } = &mut self {
            *body = new_body.into();
        }
        self
    }

    /// A 200 response with a JSON body
    pub fn json<B: Into<Vec<u8>>>(body: B) -> Self {
        Self::status(200).with_header("Content-Type", "application/json; charset=UTF-8").with_body(body)
    }

    /// A 200 response with an Atom body
    pub fn atom<B: Into<Vec<u8>>>(body: B) -> Self {
        Self::status(200).with_header("Content-Type", "application/atom+xml; charset=UTF-8").with_body(body)
    }
}

#[derive(Debug, Default)]
struct State {
    replies: VecDeque<MockReply>,
    requests: Vec<Request>,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<State>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the reply to a future request
    pub fn push(&self, reply: MockReply) {
        self.lock().replies.push_back(reply);
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    /// How many requests reached the transport
    pub fn sent_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// How many queued replies were not used
    pub fn pending_replies(&self) -> usize {
        self.lock().replies.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let reply = {
            let mut state = self.lock();
            state.requests.push(request.clone());
            state.replies.pop_front()
        };

        match reply {
            Some(MockReply::Respond { status, headers, body }) => {
                log::debug!("Mock transport: replying {} to {}", status, request.first_line());
                let mut response = Response::new(status, request.uri.clone());
                response.headers = headers;
                response.body = body;
                Ok(response)
            },
            Some(MockReply::Fail(err)) => {
                log::debug!("Mock transport: failing {} ({})", request.first_line(), err);
                Err(err)
            },
            Some(MockReply::Hang) => {
                log::debug!("Mock transport: holding {}", request.first_line());
                std::future::pending().await
            },
            None => {
                log::warn!("Mock transport: no reply queued for {}", request.first_line());
                Err(TransportError::InvalidRequest("no reply was queued".to_string()))
            },
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Method;
    use url::Url;

    #[tokio::test]
    async fn replies_in_order() {
        let transport = MockTransport::new();
        transport.push(MockReply::status(404));
        transport.push(MockReply::json("{}"));

        let request = Request::new(Method::GET, Url::parse("https://example.com/").unwrap());
        assert_eq!(transport.send(&request).await.unwrap().status, 404);
        let response = transport.send(&request).await.unwrap();
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(response.body, b"{}");
        assert!(transport.send(&request).await.is_err());

        assert_eq!(transport.sent_count(), 3);
        assert_eq!(transport.pending_replies(), 0);
    }
}
