//! Configuration types for the frame tap.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TapConfig {
    /// Frames shorter than this many characters are ignored outright
    pub min_frame_len: usize,
    /// Substring every frame of interest carries
    pub discriminator: String,
    /// Streams whose URL contains this keyword are announced in the log
    pub stream_keyword: String,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            min_frame_len: 100,
            discriminator: "icefishing.spinHistory".to_string(),
            stream_keyword: "icefishing".to_string(),
        }
    }
}
