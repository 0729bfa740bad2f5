//! Device wire protocol: newline-delimited, space-separated text frames.
//!
//! | Direction     | Frame                                   |
//! |---------------|-----------------------------------------|
//! | device→server | `HELLO <callsign> [<firmwareHash>]`     |
//! | server→device | `WELCOME <sessionId>`                   |
//! | server→device | `ERROR <text>`                          |
//! | server→device | `OTA <version>`                         |
//! | device→server | `BUTTON`                                |
//! | server→device | `LED <idx> <ON\|OFF> [durMs]`           |
//! | server→device | `BEEP <idx> <repeat> <freq> <dur> ...`  |

pub mod frame;

pub use frame::{DeviceFrame, FrameError, LedState, ServerFrame, ToneStep};
