//! Status polling.
//!
//! A polling loop is a [`PollState`] advanced by [`StatusPoller`]. The
//! interval starts at 2 s, widens to 3 s after 20 s and to 5 s after 60 s of
//! non-terminal polling; each failed status request multiplies it by 1.5 up
//! to 8 s. All waiting goes through an injected [`Clock`].

mod clock;
mod poller;
mod schedule;

pub use clock::{Clock, TokioClock};
pub use poller::{NoOpPollObserver, PollHandle, PollObserver, StatusPoller};
pub use schedule::{PollConfig, PollState, PollTier};
