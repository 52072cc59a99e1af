// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Conversation memory for the lavis cognitive core.
//!
//! Layers, innermost first: [`TurnContext`] scopes one unit of work;
//! [`ConversationMemory`] is the bounded prompt window; [`VisualCompactor`]
//! shrinks a turn's visual footprint on close; [`ColdStorage`] keeps the
//! offloaded bytes; [`PersistentStore`] holds the durable rows; and
//! [`MemoryManager`] is the seam that coordinates all of them.

mod cold;
mod compactor;
mod manager;
mod message;
mod store;
mod turn;
mod window;

pub use cold::ColdStorage;
pub use compactor::{CompactionOutcome, VisualCompactor};
pub use manager::MemoryManager;
pub use message::{placeholder, MessageBody, StoredMessage, ToolRequestRecord};
pub use store::{MessageRow, PersistentStore};
pub use turn::{Turn, TurnContext};
pub use window::ConversationMemory;
