//! # Quill Compositor Core
//!
//! The display compositor of the Quill window server. Client applications get
//! a [`Window`] each, draw into its shared-memory buffer and ask for repaints.
//! The [`Registry`] owns the windows and their stacking order, the
//! [`Compositor`] loop paints visible windows into the e-paper framebuffer and
//! issues display updates, and the [`Correlator`] tells waiting clients when
//! their update has reached the panel.
//!
//! Two worker threads run per [`CompositorContext`]: `quill-compositor` and
//! `quill-correlator`. Everything else runs on caller threads.

pub mod channel;
pub mod clock;
pub mod compositor;
pub mod context;
pub mod correlator;
pub mod driver;
pub mod error;
pub mod input;
pub mod protocol;
pub mod registry;
pub mod supervisor;
pub mod waveform;
pub mod window;
mod worker;

pub use channel::{ChannelKind, EventChannel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use compositor::{Compositor, RepaintRequest, WindowStack};
pub use context::CompositorContext;
pub use correlator::{CompletedMarker, Completion, Correlator};
pub use driver::{DisplayDriver, MxcfbDriver, SimulatedDriver, UpdateRequest};
pub use error::CompositorError;
pub use input::HostInputEvent;
pub use protocol::{FrameReader, ProtocolError, WindowEvent};
pub use registry::{DirtyMode, Registry, WindowHost};
pub use supervisor::{ProcessSupervisor, SupervisorEvent, SystemSupervisor};
pub use waveform::{UpdateMode, WaveformMode};
pub use window::{Window, WindowFlags, WindowId, WindowNotification, WindowState};
