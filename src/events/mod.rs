use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Events emitted by the services after their transaction commits. Consumed
/// by the in-process event loop; the loop only observes, it never feeds back
/// into transition outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Requisition lifecycle
    RequisitionSubmitted {
        requisition_id: Uuid,
        dispatch_number: String,
    },
    RequisitionConfirmed(Uuid),
    RequisitionApproved(Uuid),
    RequisitionRejected {
        requisition_id: Uuid,
        stage: String,
    },
    RequisitionIssued {
        requisition_id: Uuid,
        shortage_lines: usize,
    },
    RequisitionDelivered(Uuid),
    RequisitionCompleted(Uuid),

    // Stock movements
    StockAdjusted {
        product_id: Uuid,
        delta: i32,
        new_quantity: i32,
        shortage: i32,
    },
    DirectIssueRecorded {
        record_id: Uuid,
        product_id: Uuid,
    },

    // Catalog
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel for the lifetime of the process. Events are an
/// observability surface; losing one never affects a committed transition.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::RequisitionSubmitted {
                requisition_id,
                dispatch_number,
            } => {
                info!(requisition_id = %requisition_id, dispatch_number = %dispatch_number, "Requisition submitted");
            }
            Event::RequisitionRejected {
                requisition_id,
                stage,
            } => {
                info!(requisition_id = %requisition_id, stage = %stage, "Requisition rejected");
            }
            Event::RequisitionIssued {
                requisition_id,
                shortage_lines,
            } => {
                info!(requisition_id = %requisition_id, shortage_lines = shortage_lines, "Requisition issued");
            }
            Event::StockAdjusted {
                product_id,
                delta,
                new_quantity,
                shortage,
            } => {
                info!(product_id = %product_id, delta = delta, new_quantity = new_quantity, shortage = shortage, "Stock adjusted");
            }
            other => debug!(event = ?other, "Event processed"),
        }
    }
    info!("Event processor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_delivers_to_processor() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);

        sender
            .send(Event::RequisitionConfirmed(Uuid::new_v4()))
            .await
            .expect("send should succeed");

        let received = rx.recv().await.expect("event expected");
        assert!(matches!(received, Event::RequisitionConfirmed(_)));
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        let result = sender.send(Event::ProductCreated(Uuid::new_v4())).await;
        assert!(result.is_err());
    }
}
