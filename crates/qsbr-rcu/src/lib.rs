//! Userspace QSBR (Quiescent-State-Based Reclamation) RCU.
//!
//! Readers announce progress explicitly by calling [`quiescent_state`],
//! [`thread_offline`], or [`thread_online`] rather than paying a per-read
//! synchronization cost; [`synchronize_rcu`] blocks until every reader that
//! was online when it was called has announced at least one such state.
//!
//! Every thread that intends to call any reader-facing function must first
//! call [`register_thread`], and should call [`unregister_thread`] before
//! exiting (or before it stops calling RCU functions for good).
//!
//! ```
//! qsbr_rcu::register_thread();
//! qsbr_rcu::read_lock();
//! // ... dereference an RCU-protected pointer ...
//! qsbr_rcu::read_unlock();
//! qsbr_rcu::quiescent_state();
//! qsbr_rcu::unregister_thread();
//! ```

mod config;
mod epoch;
mod error;
mod gp;
mod queue;
mod reader;
mod registry;
mod wait;

pub use config::{disable_distrust_signals_mode, enable_distrust_signals_mode};
pub use gp::synchronize_rcu;
pub use reader::{
    quiescent_state, read_lock, read_ongoing, read_unlock, register_thread, thread_offline,
    thread_online, unregister_thread,
};
