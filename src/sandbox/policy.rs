// Safety policy for shell execution
//
// A cooperative filter against obviously destructive commands, checked
// before any subprocess is spawned. It is not a security boundary against
// a hostile model; it exists to stop the common catastrophic mistakes.

use once_cell::sync::Lazy;
use regex::Regex;

static BLOCKED_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (
            r"(?i)\brm\s+(--?[a-z]*[rf][a-z]*\s+)+/",
            "recursive deletion outside the workspace",
        ),
        (r"(?i)\bmkfs", "filesystem formatting"),
        (r"(?i)\bdd\s+if=", "raw device copy"),
        (r":\(\)\s*\{.*\}", "fork bomb"),
        (r"(?i)\bshutdown\b", "system shutdown"),
        (r"(?i)\breboot\b", "system reboot"),
        (r"(?i)\bchmod\s+777\s+/", "permission change on a system path"),
        (r"(?i)\bchown\s+[^|;]*\s+/", "ownership change on a system path"),
        (r">\s*/etc/", "redirection into /etc"),
        (r">\s*/sys/", "redirection into /sys"),
        (r">\s*/proc/", "redirection into /proc"),
        (
            r"(?i)\bcurl\b.*\|\s*(ba|z)?sh",
            "piping a remote download into a shell",
        ),
        (
            r"(?i)\bwget\b.*\|\s*(ba|z)?sh",
            "piping a remote download into a shell",
        ),
    ]
    .iter()
    .map(|(pattern, reason)| (Regex::new(pattern).expect("static pattern"), *reason))
    .collect()
});

/// Returns the block reason if the command matches the blocklist.
pub fn check_command(command: &str) -> Option<&'static str> {
    for (pattern, reason) in BLOCKED_PATTERNS.iter() {
        if pattern.is_match(command) {
            tracing::warn!(command, reason, "Blocked dangerous command");
            return Some(reason);
        }
    }
    None
}
