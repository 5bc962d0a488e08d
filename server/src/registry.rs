//! Maps the game type a client asks for to the running session.

use crate::buzz_game::BuzzGame;
use crate::game::Game;
use shared::GameType;
use std::collections::HashMap;
use std::sync::Arc;

/// Built once at startup and shared by every connection task.
pub struct SessionRegistry {
    server_id: String,
    games: HashMap<GameType, Arc<dyn Game>>,
}

impl SessionRegistry {
    /// Creates the registry with the buzzer session installed.
    pub fn new(server_id: impl Into<String>, admin_id: impl Into<String>, queue_capacity: usize) -> Self {
        let mut registry = Self::empty(server_id);
        registry.register(
            GameType::Buzzer,
            Arc::new(BuzzGame::with_capacity(admin_id, queue_capacity)),
        );
        registry
    }

    pub fn empty(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            games: HashMap::new(),
        }
    }

    pub fn register(&mut self, game_type: GameType, game: Arc<dyn Game>) {
        self.games.insert(game_type, game);
    }

    /// Identifier clients must echo in their Init message.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Looks up the session for a wire game-type code.
    pub fn select(&self, game_type: i32) -> Option<Arc<dyn Game>> {
        let game_type = GameType::try_from(game_type).ok()?;
        self.games.get(&game_type).cloned()
    }
}
