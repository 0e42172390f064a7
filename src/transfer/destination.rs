//! Destination path composition: `{base}/{subfolder}/{user}_{stamp}-p{seq}.{ext}`.

use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;

/// ASCII word characters, CJK unified ideographs, and hyphen.
static SUBFOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\x{4e00}-\x{9fa5}-]+$").expect("subfolder pattern is valid"));

/// Returns the subfolder if every character is allowed, otherwise empty.
pub fn sanitize_subfolder(raw: &str) -> &str {
    if SUBFOLDER.is_match(raw) { raw } else { "" }
}

/// Timestamp shared by every file of one invocation.
pub fn invocation_stamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// Hands out destination paths with a strictly increasing sequence suffix.
#[derive(Debug)]
pub struct DestinationPlan {
    prefix: String,
    user_id: String,
    stamp: String,
    ext: &'static str,
    next_seq: u32,
}

impl DestinationPlan {
    pub fn new(base_path: &str, subfolder: Option<&str>, user_id: &str, stamp: &str, gif: bool) -> Self {
        let mut prefix = base_path.trim_end_matches('/').to_string();
        prefix.push('/');
        let folder = subfolder.map(sanitize_subfolder).unwrap_or("");
        if !folder.is_empty() {
            prefix.push_str(folder);
            prefix.push('/');
        }

        Self {
            prefix,
            user_id: user_id.to_string(),
            stamp: stamp.to_string(),
            ext: if gif { "gif" } else { "png" },
            next_seq: 0,
        }
    }

    pub fn next_path(&mut self) -> String {
        let seq = self.next_seq;
        self.next_seq += 1;
        format!("{}{}_{}-p{}.{}", self.prefix, self.user_id, self.stamp, seq, self.ext)
    }

    /// Number of paths handed out so far.
    #[cfg(test)]
    fn issued(&self) -> u32 {
        self.next_seq
    }
}
