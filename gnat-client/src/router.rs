//! Subject routing from decoded deliveries to the consumer sinks

use bytes::Bytes;
use tokio::sync::mpsc;

use gnat_protocol::{MsgHeader, INBOX_PREFIX};

use crate::delivery::{Delivery, Message, Request, Response};

/// Routes one decoded delivery to the correct sink.
///
/// The connection task is the sole caller. Reply-subject presence is
/// checked before the inbox prefix, so a delivery carrying both is routed
/// as a request.
pub(crate) struct Router {
    messages: mpsc::UnboundedSender<Delivery>,
    responses: mpsc::Sender<Response>,
}

impl Router {
    pub(crate) fn new(
        messages: mpsc::UnboundedSender<Delivery>,
        responses: mpsc::Sender<Response>,
    ) -> Self {
        Self {
            messages,
            responses,
        }
    }

    pub(crate) fn dispatch(&self, header: MsgHeader, payload: Bytes) {
        if let Some(reply) = header.reply {
            self.deliver(Delivery::Request(Request {
                subject: header.subject,
                reply,
                payload,
            }));
        } else if header.subject.starts_with(INBOX_PREFIX) {
            match self.responses.try_send(Response { payload }) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Two outstanding requests is a caller-ordering
                    // violation; the slot keeps its first occupant.
                    tracing::warn!(
                        subject = %header.subject,
                        "response slot already occupied, dropping response"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!("response sink dropped, discarding response");
                }
            }
        } else {
            self.deliver(Delivery::Message(Message {
                subject: header.subject,
                payload,
            }));
        }
    }

    fn deliver(&self, delivery: Delivery) {
        if self.messages.send(delivery).is_err() {
            tracing::debug!("message sink dropped, discarding delivery");
        }
    }
}
