pub mod controller;
pub mod state;

pub use controller::{FocusController, FocusSnapshot};
pub use state::{apply, FocusEvent, FocusState, TimerAction, Transition};
