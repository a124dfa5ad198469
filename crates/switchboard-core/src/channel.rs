//! Channel resolution for Switchboard.
//!
//! Every connection is pinned to one channel, named by the path it was
//! opened on: `/game42` joins `game42`, `/` joins `default`.

/// A channel identifier.
pub type ChannelId = String;

/// Channel used when the request path has nothing beyond the root.
pub const DEFAULT_CHANNEL: &str = "default";

/// Resolve the channel a connection belongs to from its request target.
///
/// The target may be origin-form (`/room?x=1`) or absolute-form
/// (`ws://host/room`); only the path component is considered. No
/// validation or normalization is applied.
#[must_use]
pub fn resolve_channel(target: &str) -> ChannelId {
    let path = path_component(target);

    if path.len() <= 1 {
        return DEFAULT_CHANNEL.to_string();
    }

    path.strip_prefix('/').unwrap_or(path).to_string()
}

/// Extract the path of a request target, dropping scheme, authority,
/// query and fragment.
fn path_component(target: &str) -> &str {
    let rest = if target.starts_with('/') {
        target
    } else {
        match target.find("://") {
            Some(idx) => {
                let after_scheme = &target[idx + 3..];
                match after_scheme.find('/') {
                    Some(slash) => &after_scheme[slash..],
                    None => "",
                }
            }
            None => target,
        }
    };

    let end = rest.find(|c| c == '?' || c == '#').unwrap_or(rest.len());
    &rest[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_and_empty_are_default() {
        assert_eq!(resolve_channel("/"), "default");
        assert_eq!(resolve_channel(""), "default");
        assert_eq!(resolve_channel("/?token=abc"), "default");
        assert_eq!(resolve_channel("ws://example.com"), "default");
    }

    #[test]
    fn test_single_leading_separator_removed() {
        assert_eq!(resolve_channel("/game42"), "game42");
        assert_eq!(resolve_channel("/rooms/lobby"), "rooms/lobby");
        assert_eq!(resolve_channel("//double"), "/double");
        assert_eq!(resolve_channel("/trailing/"), "trailing/");
    }

    #[test]
    fn test_query_and_fragment_ignored() {
        assert_eq!(resolve_channel("/chat?user=1"), "chat");
        assert_eq!(resolve_channel("/chat#top"), "chat");
    }

    #[test]
    fn test_absolute_form() {
        assert_eq!(resolve_channel("ws://example.com:8080/game42"), "game42");
        assert_eq!(resolve_channel("wss://example.com/"), "default");
    }

    #[test]
    fn test_no_normalization() {
        assert_eq!(resolve_channel("/Room"), "Room");
        assert_eq!(resolve_channel("/$system"), "$system");
        assert_eq!(resolve_channel("/a%20b"), "a%20b");
    }
}
