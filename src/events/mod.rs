use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the commerce core. Consumed by the in-process
/// audit loop; notification fan-out hangs off the same channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CartItemAdded {
        user_id: Uuid,
        product_id: Uuid,
    },
    CartItemRemoved {
        user_id: Uuid,
        product_id: Uuid,
    },
    CartCleared(Uuid),

    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: String,
    },

    StockReserved {
        product_id: Uuid,
        base_units: i32,
        reservation_id: Uuid,
    },
    StockReleased {
        product_id: Uuid,
        base_units: i32,
        reservation_id: Uuid,
    },

    PaymentIntentCreated {
        order_id: Uuid,
        external_reference: String,
    },
    PaymentApproved {
        order_id: Uuid,
        transaction_id: String,
    },
    PaymentRejected {
        order_id: Uuid,
        transaction_id: String,
    },
    /// An approved payment must be returned to the customer by a process
    /// outside the core (admin cancelled a paid order).
    RefundDue {
        order_id: Uuid,
        amount_minor: i64,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the receiver is gone.
    /// Service code uses this so event delivery never blocks a transaction
    /// outcome that has already been committed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!(error = %e, ?event, "event dropped");
        }
    }
}

/// Background consumer for the event channel. Audit-logs everything; the
/// refund obligation gets a dedicated log line so operators can act on it.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::RefundDue {
                order_id,
                amount_minor,
            } => {
                warn!(
                    order_id = %order_id,
                    amount_minor = amount_minor,
                    "refund owed for cancelled paid order"
                );
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    from = %old_status,
                    to = %new_status,
                    "order status changed"
                );
            }
            other => {
                info!(event = ?other, "event processed");
            }
        }
    }
    info!("event channel closed; processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_does_not_error_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        sender.send_or_log(Event::CartCleared(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn events_round_trip_through_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();
        sender
            .send(Event::OrderCreated(order_id))
            .await
            .expect("send");
        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
