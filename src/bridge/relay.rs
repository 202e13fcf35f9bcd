//! Content-script relay.
//!
//! The in-process stand-in for the injected content-script hook: a
//! stateless per-message forwarder between the page bus and one extension's
//! privileged channel. It checks that a message is addressed to its alias,
//! forwards the payload without interpreting it, and pushes the privileged
//! side's callback-style reply back out under the original correlation id.
//! Timeouts are the client's job; the relay never retries or expires
//! anything.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::executor::ExecutorRequest;
use super::protocol::Envelope;
use super::transport::EventSink;

/// Spawns the relay task for one alias.
pub fn spawn(
    alias: String,
    mut inbox: mpsc::UnboundedReceiver<Envelope>,
    page_tx: mpsc::UnboundedSender<Envelope>,
    background_tx: mpsc::UnboundedSender<ExecutorRequest>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(envelope) = inbox.recv().await {
            // The bus already routes by alias; this guards against a
            // misaddressed payload reaching the wrong relay anyway
            if envelope.alias() != Some(alias.as_str()) {
                debug!(
                    "Relay {} ignoring message for {:?}",
                    alias,
                    envelope.alias()
                );
                continue;
            }

            match envelope {
                Envelope::Command { correlation_id, debug: debug_flag, .. } => {
                    if debug_flag {
                        trace!("Relay {} forwarding command {}", alias, correlation_id);
                    }

                    let (reply_tx, reply_rx) = oneshot::channel();
                    if background_tx
                        .send(ExecutorRequest::Command {
                            envelope,
                            reply: reply_tx,
                        })
                        .is_err()
                    {
                        debug!("Relay {} has no privileged side", alias);
                        continue;
                    }

                    // Await each reply on its own task so a slow command
                    // never holds up the next message
                    let page_tx = page_tx.clone();
                    tokio::spawn(async move {
                        if let Ok(outcome) = reply_rx.await {
                            let response = match outcome {
                                Ok(result) => Envelope::response_ok(correlation_id, result),
                                Err(error) => Envelope::response_err(correlation_id, error),
                            };
                            let _ = page_tx.send(response);
                        }
                    });
                }
                Envelope::Subscription {
                    correlation_id,
                    property,
                    ..
                } => {
                    let sink = EventSink::new(correlation_id, page_tx.clone());
                    let _ = background_tx.send(ExecutorRequest::Subscribe {
                        id: correlation_id,
                        property,
                        sink,
                    });
                }
                Envelope::Unsubscription {
                    correlation_id,
                    property,
                    ..
                } => {
                    let _ = background_tx.send(ExecutorRequest::Unsubscribe {
                        id: correlation_id,
                        property,
                    });
                }
                other => debug!("Relay {} ignoring {:?}", alias, other),
            }
        }
        debug!("Relay task for {} finished", alias);
    })
}
