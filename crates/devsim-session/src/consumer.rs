//! Consumer side of the queue bridge: dispatches inbound events without
//! ever touching a socket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use devsim_frame::{resource, Message};
use tracing::{debug, info, warn};

use crate::correlation::CallbackRegistry;
use crate::jsonrpc::RpcResponse;
use crate::multiplexer::InboundEvent;
use crate::queue::Queue;

/// Handler for gateway-initiated requests on one resource.
pub trait RequestHandler: Send {
    fn handle(&mut self, message: &Message);
}

impl<F> RequestHandler for F
where
    F: FnMut(&Message) + Send,
{
    fn handle(&mut self, message: &Message) {
        self(message)
    }
}

/// Outcome of one [`Consumer::poll_once`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Nothing was queued.
    Idle,
    /// One message was dispatched.
    Dispatched,
    /// The link-down notification was delivered.
    LinkDown,
}

type LinkDownCallback = Box<dyn FnMut() + Send>;
type ResponseFallback = Box<dyn FnMut(&Message) + Send>;

/// Drains the inbound queue one event per step.
pub struct Consumer {
    inbound: Queue<InboundEvent>,
    registry: Arc<CallbackRegistry>,
    handlers: HashMap<String, Box<dyn RequestHandler>>,
    on_link_down: Option<LinkDownCallback>,
    on_uncorrelated: Option<ResponseFallback>,
    link_down: bool,
}

impl Consumer {
    pub fn new(inbound: Queue<InboundEvent>, registry: Arc<CallbackRegistry>) -> Self {
        Self {
            inbound,
            registry,
            handlers: HashMap::new(),
            on_link_down: None,
            on_uncorrelated: None,
            link_down: false,
        }
    }

    /// Route requests for `resource` to `handler`, replacing any previous one.
    pub fn handle(&mut self, resource: impl Into<String>, handler: impl RequestHandler + 'static) {
        self.handlers.insert(resource.into(), Box::new(handler));
    }

    /// Called once the multiplexer reports the link down.
    pub fn on_link_down(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_link_down = Some(Box::new(callback));
    }

    /// Receives responses whose body is not a JSON-RPC response.
    pub fn on_uncorrelated_response(&mut self, callback: impl FnMut(&Message) + Send + 'static) {
        self.on_uncorrelated = Some(Box::new(callback));
    }

    /// Evict expired correlations, then dispatch at most one inbound event.
    pub fn poll_once(&mut self) -> Poll {
        let expired = self.registry.evict_expired(Instant::now());
        if expired > 0 {
            debug!(expired, "evicted expired rpc requests");
        }

        match self.inbound.get_nonblocking() {
            None => Poll::Idle,
            Some(InboundEvent::Message(message)) => {
                if message.is_request() {
                    self.dispatch_request(&message);
                } else {
                    self.dispatch_response(&message);
                }
                Poll::Dispatched
            }
            Some(InboundEvent::LinkDown) => {
                info!("gateway link down");
                self.link_down = true;
                if let Some(callback) = self.on_link_down.as_mut() {
                    callback();
                }
                Poll::LinkDown
            }
        }
    }

    /// Run [`poll_once`](Self::poll_once) until the queue is empty. Returns
    /// how many events were handled.
    pub fn drain_pending(&mut self) -> usize {
        let mut handled = 0;
        while self.poll_once() != Poll::Idle {
            handled += 1;
        }
        handled
    }

    /// True once a link-down event has been dispatched.
    pub fn is_link_down(&self) -> bool {
        self.link_down
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    fn dispatch_request(&mut self, message: &Message) {
        match self.handlers.get_mut(&message.resource) {
            Some(handler) => handler.handle(message),
            None => warn!(
                resource = %message.resource,
                builtin = resource::is_builtin(&message.resource),
                "no handler for request, dropped"
            ),
        }
    }

    fn dispatch_response(&mut self, message: &Message) {
        match RpcResponse::from_message(message) {
            Ok(response) => match response.id {
                Some(id) => {
                    self.registry.resolve(id, response);
                }
                None => {
                    warn!(resource = %message.resource, error = ?response.error, "response without id");
                    self.fallback(message);
                }
            },
            Err(err) => {
                debug!(resource = %message.resource, error = %err, "response is not json-rpc");
                self.fallback(message);
            }
        }
    }

    fn fallback(&mut self, message: &Message) {
        if let Some(callback) = self.on_uncorrelated.as_mut() {
            callback(message);
        }
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("queued", &self.inbound.len())
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("link_down", &self.link_down)
            .finish()
    }
}
