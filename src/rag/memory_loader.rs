//! Conversational memory loading with per-request degradation.

use std::sync::Arc;

use crate::memory::{ConversationTurn, MemoryStore};

/// Memory as loaded for one request.
#[derive(Debug, Default)]
pub struct LoadedMemory {
    /// Recent turns ordered oldest to newest.
    pub turns: Vec<ConversationTurn>,
    /// Whether memory was effectively enabled (caller flag AND preference
    /// AND the store was reachable).
    pub enabled: bool,
}

impl LoadedMemory {
    fn disabled() -> Self {
        Self::default()
    }
}

pub struct MemoryLoader {
    memory: Arc<dyn MemoryStore>,
    /// Configured upper bound on the per-user context window.
    context_window: usize,
}

impl MemoryLoader {
    pub fn new(memory: Arc<dyn MemoryStore>, context_window: usize) -> Self {
        Self {
            memory,
            context_window,
        }
    }

    /// Load recent turns for `owner_id` when the caller asked for memory
    /// and the owner's preference allows it.
    ///
    /// A store failure disables memory for this request only; it never
    /// aborts the pipeline.
    pub async fn load(&self, owner_id: &str, enabled_by_caller: bool) -> LoadedMemory {
        if !enabled_by_caller {
            return LoadedMemory::disabled();
        }

        let preferences = match self.memory.get_preferences(owner_id).await {
            Ok(preferences) => preferences,
            Err(err) => {
                tracing::warn!("preferences unavailable, memory disabled: {}", err);
                return LoadedMemory::disabled();
            }
        };

        if !preferences.memory_enabled {
            return LoadedMemory::disabled();
        }

        let window = (preferences.max_context_turns.max(0) as usize).min(self.context_window);
        let turns = match self.memory.get_recent_turns(owner_id, window).await {
            Ok(turns) => turns,
            Err(err) => {
                tracing::warn!("recent turns unavailable, memory disabled: {}", err);
                return LoadedMemory::disabled();
            }
        };

        LoadedMemory {
            turns,
            enabled: true,
        }
    }
}
