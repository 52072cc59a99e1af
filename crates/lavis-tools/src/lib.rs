// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: Apache-2.0
pub mod actuator;
pub mod builtin;
pub mod command;
pub mod registry;
pub mod tool;

pub use actuator::{CommandActuator, InputActuator, KeyChord, MockActuator, MouseButton};
pub use builtin::builtin_registry;
pub use builtin::util::{TERMINATOR_MARKER, TERMINATOR_NAME};
pub use command::{run_shell, Command, GoalRunner};
pub use registry::{ToolRegistry, ToolSpec};
pub use tool::{Tool, ToolCall, ToolOutput, FAILURE_MARKER};
