//! USSD menu definitions and traversal.
//!
//! A menu is a flat map of named screens; each screen has a prompt text and
//! digit-keyed options routing to another screen (`screen:<name>`) or to a
//! terminal message (`end:<text>`). The gateway posts the cumulative input
//! string (`"1*2*1"`) on every keypress, so traversal replays the whole
//! path from the root each time — no session state is kept server-side.

pub mod menu;

#[cfg(test)]
mod tests;

pub use menu::{MenuError, Screen, Traversal, UssdMenu, UssdReply};
