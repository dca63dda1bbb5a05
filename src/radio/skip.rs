use parking_lot::RwLock;
use serenity::model::id::{GuildId, UserId};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct SkipVote {
    voters: HashSet<UserId>,
    total_members: usize,
}

/// Resultado de registrar un voto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipTally {
    pub votes_needed: usize,
    pub current_votes: usize,
    pub should_skip: bool,
}

/// Votaciones de salto por guild (mayoría estricta de humanos presentes)
#[derive(Debug, Default)]
pub struct SkipVoteCoordinator {
    votes: RwLock<HashMap<GuildId, SkipVote>>,
}

impl SkipVoteCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra el voto de `user_id`. Votar dos veces no suma.
    ///
    /// `total_members` es el recuento de humanos en el canal en este momento;
    /// siempre se guarda el último.
    pub fn add_vote(&self, guild_id: GuildId, user_id: UserId, total_members: usize) -> SkipTally {
        let mut votes = self.votes.write();
        let vote = votes.entry(guild_id).or_default();
        vote.voters.insert(user_id);
        vote.total_members = total_members;

        let current_votes = vote.voters.len();
        SkipTally {
            votes_needed: total_members / 2 + 1,
            current_votes,
            should_skip: current_votes * 2 > total_members,
        }
    }

    pub fn reset_votes(&self, guild_id: GuildId) {
        self.votes.write().remove(&guild_id);
    }

    pub fn current_votes(&self, guild_id: GuildId) -> usize {
        self.votes
            .read()
            .get(&guild_id)
            .map_or(0, |vote| vote.voters.len())
    }
}
