//! Plain-text rendering for single-prompt completion endpoints.

use crate::conversation::core::entry::Role;
use crate::conversation::prompt::assembler::Turn;

/// Split a leading system turn off the turn list.
#[must_use]
pub fn split_system(turns: &[Turn]) -> (Option<&str>, &[Turn]) {
    match turns.split_first() {
        Some((first, rest)) if first.role == Role::System => (Some(first.text.as_str()), rest),
        _ => (None, turns),
    }
}

/// Render the dialogue as `User:`/`Assistant:` lines ending in an
/// `Assistant:` cue. The system turn is left out; backends carry it
/// separately.
#[must_use]
pub fn render_dialogue_only(turns: &[Turn]) -> String {
    let (_, dialogue) = split_system(turns);
    let capacity = dialogue.iter().map(|t| t.text.len() + 12).sum::<usize>() + 10;
    let mut out = String::with_capacity(capacity);
    for turn in dialogue {
        let label = match turn.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        out.push_str(label);
        out.push_str(": ");
        out.push_str(&turn.text);
        out.push('\n');
    }
    out.push_str("Assistant:");
    out
}
