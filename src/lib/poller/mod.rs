pub mod poller;

pub use poller::{PollPolicy, Poller};
