pub mod power;
pub mod projector;

pub use power::{Direction, PowerConfig, PowerIteration, PowerOutcome, StopReason};
pub use projector::{SpectralProjector, SpectralState};
