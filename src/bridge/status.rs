//! Channel name/topic computation from live server state.

use fancy_regex::Regex;

use crate::common::types::{ChannelStatus, ServerSnapshot};

/// Computes the desired channel name/topic for a server.
#[derive(Debug, Clone)]
pub struct ChannelStatusProvider {
    /// Bracket tags such as `[EU]` or `[PvE]` in server names.
    bracket_tag: Regex,
    max_topic_length: usize,
}

impl ChannelStatusProvider {
    pub fn new(max_topic_length: usize) -> Self {
        Self {
            bracket_tag: Regex::new(r"\[.*?\]").unwrap(),
            max_topic_length,
        }
    }

    /// Compute the channel status for a server snapshot.
    ///
    /// Fields whose sync flag is off stay `None`.
    pub fn status(&self, snapshot: &ServerSnapshot) -> ChannelStatus {
        let mut status = ChannelStatus::default();

        if snapshot.running {
            if snapshot.name_sync {
                status.name = Some(format!(
                    "s{}-{}-{}",
                    snapshot.server_id,
                    self.strip_bracket_tags(&snapshot.name),
                    snapshot.version.replace('.', "_")
                ));
            }
            if snapshot.topic_sync {
                status.topic = Some(roster_summary(snapshot, self.max_topic_length));
            }
        } else {
            if snapshot.name_sync {
                status.name = Some(format!("s{}-offline", snapshot.server_id));
            }
            if snapshot.topic_sync {
                status.topic = Some("Server offline".to_string());
            }
        }

        status
    }

    /// Remove every `[...]` tag from a server name.
    pub fn strip_bracket_tags(&self, name: &str) -> String {
        self.bracket_tag.replace_all(name, "").trim().to_string()
    }
}

/// Summarize the online roster, truncated to `max_length` characters.
pub fn roster_summary(snapshot: &ServerSnapshot, max_length: usize) -> String {
    let count = snapshot.online_count();
    if count == 0 {
        return "Players online 0".to_string();
    }

    let mut summary = format!("Players online {} - ", count);
    for (name, sessions) in &snapshot.players {
        for _ in 0..*sessions {
            summary.push_str(name);
            summary.push_str(", ");

            if summary.chars().count() > max_length {
                let mut truncated: String =
                    summary.chars().take(max_length.saturating_sub(3)).collect();
                truncated.push_str("...");
                return truncated;
            }
        }
    }

    if let Some(stripped) = summary.strip_suffix(", ") {
        summary.truncate(stripped.len());
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(server_id: &str, running: bool) -> ServerSnapshot {
        ServerSnapshot {
            server_id: server_id.to_string(),
            name: "[EU] My Server".to_string(),
            version: "1.1.80".to_string(),
            running,
            name_sync: true,
            topic_sync: true,
            players: Default::default(),
        }
    }

    fn provider() -> ChannelStatusProvider {
        ChannelStatusProvider::new(1024)
    }

    #[test]
    fn test_running_name() {
        let status = provider().status(&snapshot("7", true));
        assert_eq!(status.name.as_deref(), Some("s7-My Server-1_1_80"));
    }

    #[test]
    fn test_offline_status() {
        let status = provider().status(&snapshot("3", false));
        assert_eq!(status.name.as_deref(), Some("s3-offline"));
        assert_eq!(status.topic.as_deref(), Some("Server offline"));
    }

    #[test]
    fn test_sync_flags_off() {
        let mut snap = snapshot("3", true);
        snap.name_sync = false;
        snap.topic_sync = false;
        assert!(provider().status(&snap).is_empty());

        snap.running = false;
        assert!(provider().status(&snap).is_empty());
    }

    #[test]
    fn test_only_topic_sync() {
        let mut snap = snapshot("3", true);
        snap.name_sync = false;
        let status = provider().status(&snap);
        assert_eq!(status.name, None);
        assert_eq!(status.topic.as_deref(), Some("Players online 0"));
    }

    #[test]
    fn test_strip_multiple_tags_non_greedy() {
        let provider = provider();
        assert_eq!(provider.strip_bracket_tags("[EU] Island [PvE]"), "Island");
        assert_eq!(provider.strip_bracket_tags("[a]b[c]"), "b");
        assert_eq!(provider.strip_bracket_tags("No tags"), "No tags");
    }

    #[test]
    fn test_empty_roster() {
        assert_eq!(roster_summary(&snapshot("1", true), 20), "Players online 0");
    }

    #[test]
    fn test_roster_lists_sorted_names() {
        let mut snap = snapshot("1", true);
        snap.players.insert("bob".to_string(), 1);
        snap.players.insert("alice".to_string(), 2);
        assert_eq!(
            roster_summary(&snap, 1024),
            "Players online 3 - alice, alice, bob"
        );
    }

    #[test]
    fn test_roster_truncation() {
        let mut snap = snapshot("1", true);
        snap.players.insert("alice".to_string(), 1);
        snap.players.insert("bob".to_string(), 1);
        snap.players.insert("carlos".to_string(), 1);

        let summary = roster_summary(&snap, 20);
        assert!(summary.chars().count() <= 20);
        assert!(summary.ends_with("..."));
        assert_eq!(summary, "Players online 3 ...");
    }

    #[test]
    fn test_roster_exact_fit_is_not_truncated() {
        let mut snap = snapshot("1", true);
        snap.players.insert("al".to_string(), 1);
        // "Players online 1 - al, " is 23 characters
        assert_eq!(roster_summary(&snap, 23), "Players online 1 - al");
    }
}
