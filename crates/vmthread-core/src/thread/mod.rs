//! Managed threads, exit notifiers and thread naming.

pub mod lifecycle;
#[allow(unsafe_code)]
pub mod naming;
#[allow(unsafe_code)]
pub mod notifier;

pub use lifecycle::{
    ThreadCounters, ThreadHandle, ThreadMode, ThreadPhase, ThreadValue, thread_counters,
    thread_create, thread_exit, thread_get_affinity, thread_is_self, thread_join, thread_self,
    thread_set_affinity,
};
pub use naming::{enable_thread_naming, naming_enabled, naming_supported};
pub use notifier::{
    ExitNotifierId, pending_process_notifiers, register_exit_callback,
    run_process_exit_notifiers, unregister_exit_callback,
};
