//! high-level operations on forester repositories

mod branch;
mod checkout;
mod commit;
mod gc;
mod hooks;
mod log;
mod rebuild;
mod show;
mod stash;
mod status;
mod tag;

pub use branch::{create_branch, delete_branch, list_branches, rename_branch, switch_branch, BranchSummary};
pub use checkout::{checkout, CheckoutOptions};
pub use commit::{commit, CommitOptions};
pub use gc::{gc, is_reachable, GcStats};
pub use hooks::{run_post_hook, run_pre_hook, Hook};
pub use log::{log, LogEntry};
pub use rebuild::{rebuild, RebuildStats};
pub use show::{show, ShowInfo};
pub use stash::{apply_stash, delete_stash, list_stashes, stash_changes};
pub use status::{status, Status};
pub use tag::{create_tag, delete_tag, list_tags, show_tag};
