//! Pipeline stages between a parsed request and the renderer's output.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the renderer can be swapped without touching template handling.
//!
//! ## Data Flow
//!
//! ```text
//! template ──▶ absolutize ──▶ input ──▶ options ──▶ invoke
//! (Jinja)      (file:// URLs) (temp     (argv)     (child process)
//!                             file)
//! ```
//!
//! 1. [`template`]  : evaluate the inline template against request data
//! 2. [`absolutize`]: point asset URLs at local directories via `file://`
//! 3. [`input`]     : write inline HTML to a scoped temp file; URLs pass through
//! 4. [`options`]   : merge defaults and overrides, encode as long flags
//! 5. [`invoke`]    : run the renderer once with a timeout and captured pipes
//!
//! Remote-URL requests skip steps 1–3.

pub mod absolutize;
pub mod input;
pub mod invoke;
pub mod options;
pub mod template;
