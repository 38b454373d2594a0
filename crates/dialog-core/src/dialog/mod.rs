//! Core dialog types
//!
//! ```text
//!   18x w/ tag      2xx          BYE / >=300 / terminate()
//! ─────────────▶ Early ──────▶ Confirmed ─────────────▶ Terminated
//!          2xx ───────────────▶
//! ```

pub mod dialog_id;
pub mod dialog_impl;
pub mod dialog_state;
pub mod dialog_utils;

pub use dialog_id::DialogId;
pub use dialog_impl::{Dialog, DialogRequestTemplate};
pub use dialog_state::DialogState;
pub use dialog_utils::*;
