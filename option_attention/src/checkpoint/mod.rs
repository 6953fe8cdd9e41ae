//! Model checkpointing.
//!
//! - [`Checkpointer`] saves network records as `model-<episode>.bin`
//! - [`CheckpointState`] reads and writes the `checkpoint` state file that
//!   names the latest record
//!
//! ## Example
//!
//! ```rust,ignore
//! use option_attention::checkpoint::{Checkpointer, CheckpointerConfig};
//!
//! let mut checkpointer = Checkpointer::new(CheckpointerConfig::for_logdir("./logs"))?;
//!
//! // In training loop:
//! if checkpointer.should_save(episode) {
//!     checkpointer.save(replica.network(), episode)?;
//!     clusters.write().persist("./logs", &episode.to_string())?;
//! }
//! ```

pub mod checkpointer;
pub mod state;

pub use checkpointer::{CheckpointError, CheckpointInfo, Checkpointer, CheckpointerConfig};
pub use state::{episode_token, latest_checkpoint, CheckpointState, STATE_FILE};
