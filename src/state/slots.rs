//! Player seats of a round and the ownership rules protecting them.

use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::{
        ids::{SessionId, SessionToken, SlotId},
        message::LogicalKey,
    },
    state::game::PlayMode,
};

/// Seat of the co-located player.
pub const FIRST_SLOT: SlotId = 1;
/// Seat of the second phone in two-player mode.
pub const SECOND_SLOT: SlotId = 2;
/// Seat of the CPU opponent.
pub const BOT_SLOT: SlotId = 99;

/// Who drives a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Human,
    Bot,
}

/// One seat of the current round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSlot {
    pub id: SlotId,
    pub label: String,
    pub kind: SlotKind,
    pub connected: bool,
    /// Session that claimed the seat; `None` until the first claim.
    pub owner: Option<SessionId>,
    pub progress: u32,
    /// Last key accepted for this seat in key-driven games.
    pub last_key: Option<LogicalKey>,
}

impl PlayerSlot {
    fn human(id: SlotId, label: &str, connected: bool) -> Self {
        Self {
            id,
            label: label.to_string(),
            kind: SlotKind::Human,
            connected,
            owner: None,
            progress: 0,
            last_key: None,
        }
    }

    fn bot() -> Self {
        Self {
            id: BOT_SLOT,
            label: "CPU".to_string(),
            kind: SlotKind::Bot,
            connected: true,
            owner: None,
            progress: 0,
            last_key: None,
        }
    }

    /// Whether a phone may ever control this seat.
    pub fn is_human(&self) -> bool {
        self.kind == SlotKind::Human
    }
}

/// Outcome of a `JOIN` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The seat was free and now belongs to the requester.
    Claimed,
    /// The requester already owned the seat.
    Rejoined,
    /// The seat belongs to another session.
    Busy,
    /// No joinable seat with that number exists.
    NoSuchSlot,
}

/// Verdict of the ownership check applied to remote input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputVerdict {
    /// The sender owns the seat (or the seat is unowned).
    Accepted,
    /// The seat belongs to another session; input must be discarded.
    Unauthorized,
    /// No seat accepts remote input under that number.
    NoSuchSlot,
}

/// Ordered seats of a round, exclusively mutated by the kiosk host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotRoster {
    slots: IndexMap<SlotId, PlayerSlot>,
}

impl SlotRoster {
    /// Seed the seats for `mode`: player one is local and pre-connected, player two waits for a
    /// phone, and the CPU opponent is always present.
    pub fn seed(mode: PlayMode) -> Self {
        let mut slots = IndexMap::new();
        slots.insert(FIRST_SLOT, PlayerSlot::human(FIRST_SLOT, "Player 1", true));
        if mode == PlayMode::TwoPlayers {
            slots.insert(
                SECOND_SLOT,
                PlayerSlot::human(SECOND_SLOT, "Player 2", false),
            );
        }
        slots.insert(BOT_SLOT, PlayerSlot::bot());
        Self { slots }
    }

    pub fn get(&self, id: SlotId) -> Option<&PlayerSlot> {
        self.slots.get(&id)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut PlayerSlot> {
        self.slots.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerSlot> {
        self.slots.values()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Apply a `JOIN` for seat `id` presented by `session`.
    ///
    /// A free seat (disconnected or never claimed) is taken by the requester; the owner may rejoin
    /// any number of times; everybody else is told the seat is busy. Ownership never changes
    /// outside of a claim of a free seat.
    pub fn join(&mut self, id: SlotId, session: &SessionToken) -> JoinOutcome {
        let Some(slot) = self.slots.get_mut(&id).filter(|slot| slot.is_human()) else {
            return JoinOutcome::NoSuchSlot;
        };

        if !slot.connected || slot.owner.is_none() {
            slot.connected = true;
            slot.owner = session.session().cloned();
            JoinOutcome::Claimed
        } else if slot.owner.as_ref().is_some_and(|owner| session.is(owner)) {
            JoinOutcome::Rejoined
        } else {
            JoinOutcome::Busy
        }
    }

    /// Check that `session` may drive seat `id`.
    ///
    /// An unowned seat accepts the input and, when a concrete session is presented, becomes bound
    /// to it from then on.
    pub fn authorize(&mut self, id: SlotId, session: &SessionToken) -> InputVerdict {
        let Some(slot) = self.slots.get_mut(&id).filter(|slot| slot.is_human()) else {
            return InputVerdict::NoSuchSlot;
        };

        match &slot.owner {
            Some(owner) if !session.is(owner) => InputVerdict::Unauthorized,
            Some(_) => InputVerdict::Accepted,
            None => {
                if let Some(claimant) = session.session() {
                    slot.owner = Some(claimant.clone());
                    slot.connected = true;
                }
                InputVerdict::Accepted
            }
        }
    }

    /// Whether `session` owns a connected human seat.
    pub fn owns_connected_seat(&self, session: &SessionToken) -> bool {
        self.slots.values().any(|slot| {
            slot.is_human()
                && slot.connected
                && slot.owner.as_ref().is_some_and(|owner| session.is(owner))
        })
    }

    /// Add `amount` to the progress of seat `id`, returning the new value.
    pub fn advance(&mut self, id: SlotId, amount: u32) -> Option<u32> {
        let slot = self.slots.get_mut(&id)?;
        slot.progress = slot.progress.saturating_add(amount);
        Some(slot.progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(raw: &str) -> SessionToken {
        SessionId::new(raw).into()
    }

    #[test]
    fn single_player_seeds_local_player_and_bot() {
        let roster = SlotRoster::seed(PlayMode::SinglePlayer);
        let ids: Vec<_> = roster.iter().map(|slot| slot.id).collect();
        assert_eq!(ids, vec![FIRST_SLOT, BOT_SLOT]);
        assert!(roster.get(FIRST_SLOT).unwrap().connected);
        assert_eq!(roster.get(BOT_SLOT).unwrap().kind, SlotKind::Bot);
    }

    #[test]
    fn two_players_seeds_disconnected_second_seat() {
        let roster = SlotRoster::seed(PlayMode::TwoPlayers);
        let second = roster.get(SECOND_SLOT).unwrap();
        assert!(!second.connected);
        assert_eq!(second.owner, None);
    }

    #[test]
    fn join_is_idempotent_for_the_owner() {
        let mut roster = SlotRoster::seed(PlayMode::TwoPlayers);
        assert_eq!(roster.join(2, &session("x")), JoinOutcome::Claimed);
        assert_eq!(roster.join(2, &session("x")), JoinOutcome::Rejoined);
        assert_eq!(roster.get(2).unwrap().owner, Some(SessionId::new("x")));
        assert_eq!(roster.iter().filter(|slot| slot.id == 2).count(), 1);
    }

    #[test]
    fn join_from_another_session_is_busy() {
        let mut roster = SlotRoster::seed(PlayMode::SinglePlayer);
        roster.join(1, &session("x"));
        assert_eq!(roster.join(1, &session("y")), JoinOutcome::Busy);
        assert_eq!(roster.join(1, &SessionToken::Anonymous), JoinOutcome::Busy);
        assert_eq!(roster.get(1).unwrap().owner, Some(SessionId::new("x")));
    }

    #[test]
    fn pre_connected_unowned_seat_can_be_claimed() {
        let mut roster = SlotRoster::seed(PlayMode::SinglePlayer);
        assert_eq!(roster.join(1, &session("x")), JoinOutcome::Claimed);
    }

    #[test]
    fn bot_and_missing_seats_are_not_joinable() {
        let mut roster = SlotRoster::seed(PlayMode::SinglePlayer);
        assert_eq!(roster.join(BOT_SLOT, &session("x")), JoinOutcome::NoSuchSlot);
        assert_eq!(roster.join(2, &session("x")), JoinOutcome::NoSuchSlot);
        assert_eq!(roster.get(BOT_SLOT).unwrap().owner, None);
    }

    #[test]
    fn anonymous_join_does_not_bind_the_seat() {
        let mut roster = SlotRoster::seed(PlayMode::TwoPlayers);
        assert_eq!(roster.join(2, &SessionToken::Anonymous), JoinOutcome::Claimed);
        assert_eq!(roster.get(2).unwrap().owner, None);
        assert_eq!(roster.join(2, &session("x")), JoinOutcome::Claimed);
    }

    #[test]
    fn input_from_a_foreign_session_is_unauthorized() {
        let mut roster = SlotRoster::seed(PlayMode::SinglePlayer);
        roster.join(1, &session("x"));
        assert_eq!(roster.authorize(1, &session("y")), InputVerdict::Unauthorized);
        assert_eq!(
            roster.authorize(1, &SessionToken::Anonymous),
            InputVerdict::Unauthorized
        );
        assert_eq!(roster.authorize(1, &session("x")), InputVerdict::Accepted);
    }

    #[test]
    fn first_input_binds_an_unowned_seat() {
        let mut roster = SlotRoster::seed(PlayMode::TwoPlayers);
        assert_eq!(roster.authorize(2, &session("y")), InputVerdict::Accepted);
        let second = roster.get(2).unwrap();
        assert_eq!(second.owner, Some(SessionId::new("y")));
        assert!(second.connected);
        assert_eq!(roster.authorize(2, &session("z")), InputVerdict::Unauthorized);
    }

    #[test]
    fn anonymous_input_on_unowned_seat_is_accepted_without_binding() {
        let mut roster = SlotRoster::seed(PlayMode::SinglePlayer);
        assert_eq!(
            roster.authorize(1, &SessionToken::Anonymous),
            InputVerdict::Accepted
        );
        assert_eq!(roster.get(1).unwrap().owner, None);
    }

    #[test]
    fn advance_accumulates_progress() {
        let mut roster = SlotRoster::seed(PlayMode::SinglePlayer);
        assert_eq!(roster.advance(1, 2), Some(2));
        assert_eq!(roster.advance(1, 2), Some(4));
        assert_eq!(roster.advance(7, 2), None);
    }
}
