use super::*;
use std::fmt;

/// Internal representation of an event, as handled by the event task.
pub struct EventData {
    pub(crate) event: Event,
    pub(crate) action: Box<dyn EventHandler>,
}

impl EventData {
    /// Create a representation of an event and its associated handler.
    ///
    /// An event handler, `action`, receives an [`EventContext`] and optionally
    /// produces a new [`Event`] type for itself. Returning `None` will
    /// maintain the same event type. Event handlers will be re-added with
    /// their new trigger condition, or removed if [`Cancel`]led.
    ///
    /// [`Cancel`]: Event::Cancel
    pub fn new<F: EventHandler + 'static>(event: Event, action: F) -> Self {
        Self {
            event,
            action: Box::new(action),
        }
    }
}

impl fmt::Debug for EventData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event {{ event: {:?}, action: <fn> }}", self.event)
    }
}
