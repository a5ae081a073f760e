//! Emitter and poster election.
//!
//! N clients observe every state change; without a deterministic rule all N
//! would emit. These are pure functions over a roster snapshot so the same
//! inputs elect the same single session on every client. Ties break to the
//! lexicographically smallest user id — arbitrary, but stable, and kept that
//! way deliberately.

use aurawatch_types::UserId;

use crate::host::SessionInfo;

/// The elected privileged session: smallest-id active GM.
pub fn primary_gm(sessions: &[SessionInfo]) -> Option<&UserId> {
    sessions
        .iter()
        .filter(|s| s.active && s.is_gm)
        .map(|s| &s.user)
        .min()
}

/// Whether `local` is the primary GM session.
pub fn is_primary_gm(sessions: &[SessionInfo], local: &UserId) -> bool {
    primary_gm(sessions) == Some(local)
}

/// The session responsible for rendering chat output for a received event.
/// Mirrors the primary-GM election; when no GM is connected the smallest-id
/// active session posts, so a GM-less table still gets its reminders without
/// reintroducing duplicate posts.
pub fn is_responsible_poster(sessions: &[SessionInfo], local: &UserId) -> bool {
    if primary_gm(sessions).is_some() {
        return is_primary_gm(sessions, local);
    }
    sessions
        .iter()
        .filter(|s| s.active)
        .map(|s| &s.user)
        .min()
        == Some(local)
}

/// The session allowed to emit events for a token change.
///
/// When the notification names the acting user, that user is the emitter.
/// Otherwise: smallest-id active non-GM session with owner permission over
/// the token's actor; if none is connected, the primary GM acts.
pub fn is_elected_emitter(
    sessions: &[SessionInfo],
    owners: &[UserId],
    acting_user: Option<&UserId>,
    local: &UserId,
) -> bool {
    if let Some(user) = acting_user {
        return user == local;
    }

    let elected_owner = sessions
        .iter()
        .filter(|s| s.active && !s.is_gm && owners.contains(&s.user))
        .map(|s| &s.user)
        .min();

    match elected_owner {
        Some(user) => user == local,
        None => is_primary_gm(sessions, local),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user: &str, is_gm: bool, active: bool) -> SessionInfo {
        SessionInfo {
            user: user.into(),
            is_gm,
            active,
        }
    }

    #[test]
    fn primary_gm_is_smallest_active_gm() {
        let roster = vec![
            session("gm-b", true, true),
            session("gm-a", true, true),
            session("gm-0", true, false),
            session("player-1", false, true),
        ];
        assert_eq!(primary_gm(&roster), Some(&"gm-a".into()));
    }

    #[test]
    fn election_is_deterministic_and_exclusive() {
        let roster = vec![
            session("gm-b", true, true),
            session("gm-a", true, true),
            session("player-1", false, true),
        ];
        let elected: Vec<_> = roster
            .iter()
            .filter(|s| is_primary_gm(&roster, &s.user))
            .collect();
        assert_eq!(elected.len(), 1);
        assert_eq!(elected[0].user, "gm-a".into());
    }

    #[test]
    fn poster_falls_back_when_no_gm_connected() {
        let roster = vec![
            session("player-b", false, true),
            session("player-a", false, true),
        ];
        assert!(is_responsible_poster(&roster, &"player-a".into()));
        assert!(!is_responsible_poster(&roster, &"player-b".into()));
    }

    #[test]
    fn acting_user_wins_emitter_election() {
        let roster = vec![
            session("gm-a", true, true),
            session("player-a", false, true),
            session("player-b", false, true),
        ];
        let owners: Vec<UserId> = vec!["player-a".into(), "player-b".into()];
        let acting: UserId = "player-b".into();
        assert!(is_elected_emitter(
            &roster,
            &owners,
            Some(&acting),
            &"player-b".into()
        ));
        assert!(!is_elected_emitter(
            &roster,
            &owners,
            Some(&acting),
            &"player-a".into()
        ));
    }

    #[test]
    fn ambiguous_authorship_elects_smallest_owner() {
        let roster = vec![
            session("gm-a", true, true),
            session("player-a", false, true),
            session("player-b", false, true),
        ];
        let owners: Vec<UserId> = vec!["player-a".into(), "player-b".into()];
        assert!(is_elected_emitter(&roster, &owners, None, &"player-a".into()));
        assert!(!is_elected_emitter(&roster, &owners, None, &"player-b".into()));
        assert!(!is_elected_emitter(&roster, &owners, None, &"gm-a".into()));
    }

    #[test]
    fn gm_acts_when_no_owner_connected() {
        let roster = vec![session("gm-a", true, true), session("player-x", false, true)];
        let owners: Vec<UserId> = vec!["player-offline".into()];
        assert!(is_elected_emitter(&roster, &owners, None, &"gm-a".into()));
        assert!(!is_elected_emitter(&roster, &owners, None, &"player-x".into()));
    }

    #[test]
    fn no_eligible_session_elects_nobody() {
        let roster = vec![session("player-x", false, true)];
        let owners: Vec<UserId> = vec!["player-offline".into()];
        // No owner connected and no GM: silence is the accepted degraded mode.
        assert!(!is_elected_emitter(&roster, &owners, None, &"player-x".into()));
    }
}
