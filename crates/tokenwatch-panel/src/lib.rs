//! Token diagnostics panel.
//!
//! The panel observes the token store, a one-second clock and refresh-status
//! notifications, and publishes a [`PanelSnapshot`] after every change. It
//! never writes to the store.

mod clock;
mod panel;
mod snapshot;

pub use clock::{Clock, ManualClock, SystemClock};
pub use panel::{Activation, PanelOptions, TokenDiagnostics};
pub use snapshot::{PanelSnapshot, TokenReport, TokenSnapshot, PLACEHOLDER};
