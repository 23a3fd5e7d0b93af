//! high-level operations on state branches

mod commit;
mod hook;
mod init;
mod reset;
mod status;

pub use commit::{commit, CommitOptions, CommitOutcome, DEFAULT_MESSAGE};
pub use hook::{git_hook_pre_receive, git_hook_update};
pub use init::{hook_script, init, HOOKS};
pub use reset::{effective_mode, reset, ResetOptions, ResetOutcome};
pub use status::{status, EntryState, StatusEntry, StatusOptions, StatusSummary, FAILED_SIGN};
