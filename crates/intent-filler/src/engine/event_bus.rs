//! Broadcast channel connecting the filler's handlers.

use intent_types::FillerEvent;
use tokio::sync::broadcast;

/// Cloneable handle to a broadcast channel of [`FillerEvent`]s.
///
/// Subscribers only see events published after they subscribed, and a slow
/// subscriber that falls more than `capacity` events behind skips ahead.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<FillerEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Receiver for events published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<FillerEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event. Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: FillerEvent,
	) -> Result<(), broadcast::error::SendError<FillerEvent>> {
		self.sender.send(event).map(|_| ())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use intent_types::IntakeEvent;

	#[tokio::test]
	async fn test_subscribers_receive_published_events() {
		let bus = EventBus::new(8);
		let mut first = bus.subscribe();
		let mut second = bus.subscribe();

		bus.publish(FillerEvent::Intake(IntakeEvent::Received {
			fulfillment_id: "0x01".into(),
		}))
		.unwrap();

		for receiver in [&mut first, &mut second] {
			match receiver.recv().await.unwrap() {
				FillerEvent::Intake(IntakeEvent::Received { fulfillment_id }) => {
					assert_eq!(fulfillment_id, "0x01")
				},
				other => panic!("unexpected event {:?}", other),
			}
		}
	}

	#[test]
	fn test_publish_without_subscribers_fails() {
		let bus = EventBus::new(8);
		assert!(bus
			.publish(FillerEvent::Intake(IntakeEvent::Validated {
				fulfillment_id: "0x01".into(),
			}))
			.is_err());
	}
}
