//! User-mediated access to the status tree

mod broker;
pub mod picker;

pub use broker::AccessBroker;
pub use picker::{PickerHost, PickerOutcome, PickerRequest, PickerResponder, StaticPicker};
