pub mod controller;
pub mod events;

pub use controller::{CalendarProvider, Orchestrator};
pub use events::{BackgroundEvent, EventEnvelope, EventOutcome, ExtensionMessage, OutcomeData};
