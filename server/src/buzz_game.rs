//! The buzzer quiz session
//!
//! One lock guards the roster and the current buzzer. Every operation mutates
//! under that lock, builds the snapshots for all active players, releases the
//! lock and only then publishes to the outbound queues.

use crate::game::{ConnectionHandle, Dispatch, Game};
use crate::outbox::{Outbox, DEFAULT_CAPACITY};
use crate::roster::{Player, Roster};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{AdminCommand, ClientMessage, PlayerEntry, PlayerId, ServerMessage};
use std::sync::Arc;

pub struct BuzzGame {
    admin_id: String,
    queue_capacity: usize,
    state: Mutex<BuzzState>,
}

struct BuzzState {
    roster: Roster,
    current_buzzer: Option<PlayerId>,
    epoch: u64,
    rng: StdRng,
}

/// Snapshots built under the lock, delivered after it is released.
struct Broadcast {
    epoch: u64,
    deliveries: Vec<(Arc<Outbox>, [ServerMessage; 2])>,
}

impl Broadcast {
    fn deliver(self) {
        for (outbox, messages) in self.deliveries {
            outbox.publish(self.epoch, messages);
        }
    }
}

impl BuzzGame {
    pub fn new(admin_id: impl Into<String>) -> Self {
        Self::with_rng(admin_id, DEFAULT_CAPACITY, StdRng::from_entropy())
    }

    pub fn with_capacity(admin_id: impl Into<String>, queue_capacity: usize) -> Self {
        Self::with_rng(admin_id, queue_capacity, StdRng::from_entropy())
    }

    /// Builds a session drawing player ids from `rng`.
    pub fn with_rng(admin_id: impl Into<String>, queue_capacity: usize, rng: StdRng) -> Self {
        Self {
            admin_id: admin_id.into(),
            queue_capacity,
            state: Mutex::new(BuzzState {
                roster: Roster::new(),
                current_buzzer: None,
                epoch: 0,
                rng,
            }),
        }
    }

    /// Runs `mutation` under the lock, then broadcasts the resulting state.
    fn mutate<R>(&self, mutation: impl FnOnce(&mut BuzzState) -> R) -> R {
        let (result, broadcast) = {
            let mut state = self.state.lock();
            let result = mutation(&mut *state);
            (result, state.broadcast())
        };
        broadcast.deliver();
        result
    }

    fn is_admin(&self, admin_id: &str) -> bool {
        admin_id == self.admin_id
    }

    /// Requests the buzz for `player_id`.
    ///
    /// Only a buzz-in is honoured; `buzzing == false` is acknowledged with a
    /// broadcast but changes nothing.
    pub fn process_action(&self, player_id: PlayerId, buzzing: bool) {
        self.mutate(|state| {
            if buzzing {
                state.buzz(player_id);
            }
        });
    }

    pub fn process_admin(&self, admin_id: &str, command: i32) {
        if !self.is_admin(admin_id) {
            warn!("Rejected admin command {} with wrong admin id", command);
            return;
        }

        self.mutate(|state| match AdminCommand::try_from(command) {
            Ok(command) => state.apply(command),
            Err(code) => debug!("Ignoring unknown admin command {}", code),
        });
    }

    pub fn process_kick(&self, admin_id: &str, target: PlayerId) {
        if !self.is_admin(admin_id) {
            warn!("Rejected kick of {} with wrong admin id", target);
            return;
        }
        self.remove(target);
    }

    pub fn current_buzzer(&self) -> Option<PlayerId> {
        self.state.lock().current_buzzer
    }

    /// The roster as it would be broadcast right now.
    pub fn snapshot(&self) -> Vec<PlayerEntry> {
        self.state.lock().roster.entries()
    }

    pub fn player(&self, player_id: PlayerId) -> Option<PlayerEntry> {
        self.state.lock().roster.find(player_id).map(Player::entry)
    }
}

impl Game for BuzzGame {
    fn join(
        &self,
        requested_id: Option<PlayerId>,
        player_name: &str,
        connection: ConnectionHandle,
    ) -> PlayerId {
        let capacity = self.queue_capacity;
        self.mutate(move |state| {
            if let Some(id) = requested_id {
                if let Some(player) = state.roster.find_mut(id) {
                    player.reattach(player_name, connection, capacity);
                    info!("Re-enabled player {} ({})", player_name, id);
                    if state.current_buzzer == Some(id) {
                        state.current_buzzer = None;
                    }
                    return id;
                }
            }

            let id = state.roster.allocate_id(&mut state.rng);
            state
                .roster
                .insert(Player::new(id, player_name, connection, capacity));
            id
        })
    }

    fn disable(&self, player_id: PlayerId) {
        self.mutate(|state| {
            if let Some(player) = state.roster.find_mut(player_id) {
                player.active = false;
                info!("Disabled player {} ({})", player.name, player_id);
            }
        });
    }

    fn remove(&self, player_id: PlayerId) {
        self.mutate(|state| {
            if let Some(player) = state.roster.remove(player_id) {
                player.close_connection();
                if state.current_buzzer == Some(player_id) {
                    state.current_buzzer = None;
                }
            }
        });
    }

    fn process_message(&self, raw: &str) -> Dispatch {
        match ClientMessage::parse(raw) {
            Ok(ClientMessage::BuzzAction(action)) => {
                self.process_action(action.user_id, action.buzzing);
                Dispatch::Handled
            }
            Ok(ClientMessage::Admin(admin)) => {
                self.process_admin(&admin.admin_id, admin.command);
                Dispatch::Handled
            }
            Ok(ClientMessage::KickPlayer(kick)) => {
                self.process_kick(&kick.admin_id, kick.user_id);
                Dispatch::Handled
            }
            Ok(ClientMessage::Quit(quit)) => {
                self.remove(quit.user_id);
                Dispatch::Quit(quit.user_id)
            }
            Ok(ClientMessage::Init(_)) => {
                debug!("Ignoring Init after handshake");
                Dispatch::Ignored
            }
            Err(e) => {
                debug!("Ignoring undecodable message: {}", e);
                Dispatch::Ignored
            }
        }
    }

    fn outbound_queue(&self, player_id: PlayerId) -> Option<Arc<Outbox>> {
        self.state
            .lock()
            .roster
            .find(player_id)
            .map(|player| Arc::clone(player.outbox()))
    }
}

impl BuzzState {
    fn buzz(&mut self, player_id: PlayerId) {
        if self.current_buzzer.is_some() {
            return;
        }
        if let Some(player) = self.roster.find_mut(player_id) {
            if !player.status.locked_out {
                player.status.buzzing = true;
                self.current_buzzer = Some(player_id);
                debug!("Player {} buzzed in", player_id);
            }
        }
    }

    fn apply(&mut self, command: AdminCommand) {
        match command {
            AdminCommand::Award => {
                if let Some(player) = self.buzzing_player() {
                    player.status.score += 1;
                    self.next_round();
                }
            }
            AdminCommand::LockOut => {
                if let Some(player) = self.buzzing_player() {
                    player.status.locked_out = true;
                    self.clear_buzz();
                }
            }
            AdminCommand::NextRound => self.next_round(),
            AdminCommand::Reset => {
                self.next_round();
                for player in self.roster.iter_mut() {
                    player.status.score = 0;
                }
            }
            AdminCommand::ClearBuzz => self.clear_buzz(),
        }
    }

    fn buzzing_player(&mut self) -> Option<&mut Player> {
        let id = self.current_buzzer?;
        self.roster.find_mut(id)
    }

    fn clear_buzz(&mut self) {
        if let Some(player) = self.buzzing_player() {
            player.status.buzzing = false;
        }
        self.current_buzzer = None;
    }

    fn next_round(&mut self) {
        for player in self.roster.iter_mut() {
            player.status.buzzing = false;
            player.status.locked_out = false;
        }
        self.current_buzzer = None;
    }

    fn broadcast(&mut self) -> Broadcast {
        self.epoch += 1;
        let entries = self.roster.entries();
        let deliveries = self
            .roster
            .iter()
            .filter(|player| player.active)
            .map(|player| {
                (
                    Arc::clone(player.outbox()),
                    [
                        ServerMessage::game_status(entries.clone()),
                        ServerMessage::player_status(player.status.clone()),
                    ],
                )
            })
            .collect();

        Broadcast {
            epoch: self.epoch,
            deliveries,
        }
    }
}
