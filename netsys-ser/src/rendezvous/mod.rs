//! Rendezvous with external accelerator units.
//!
//! Accelerators share DMA rings with the frame engine, so every recovery run
//! asks them to stop before the reset and to resume after it. The
//! [`AcceleratorRegistry`] tracks which units are online and runs a bounded
//! barrier for each [`Phase`]. The transport reports unit events through an
//! [`AcceleratorLink`]; [`run_event_pump`] applies them in order.

mod events;
mod link;
mod registry;
mod responder;

pub use events::{
    AcceleratorEvent, AcceleratorId, Phase, PhaseNotice, PhaseResult, RendezvousError,
};
pub use link::{run_event_pump, AcceleratorLink};
pub use registry::{AcceleratorRegistry, NOTICE_CHANNEL_CAPACITY};
pub use responder::{ResponderBehavior, SimulatedAccelerator};
