// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
pub mod keyboard;
pub mod mouse;
pub mod os;
pub mod util;

use std::collections::HashMap;
use std::sync::Arc;

use crate::actuator::InputActuator;
use crate::registry::ToolRegistry;

/// Assemble the full built-in tool set around one actuator.
///
/// `shell_timeout_secs` bounds `execute_shell` / `execute_applescript`;
/// `wait_overrides` lets configuration replace any tool's post-action wait.
pub fn builtin_registry(
    actuator: Arc<dyn InputActuator>,
    shell_timeout_secs: u64,
    wait_overrides: HashMap<String, u64>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // Mouse
    registry.register(mouse::MoveMouseTool::new(Arc::clone(&actuator)));
    registry.register(mouse::ClickTool::single(Arc::clone(&actuator)));
    registry.register(mouse::ClickTool::double(Arc::clone(&actuator)));
    registry.register(mouse::ClickTool::right(Arc::clone(&actuator)));
    registry.register(mouse::DragTool::new(Arc::clone(&actuator)));
    registry.register(mouse::ScrollTool::new(Arc::clone(&actuator)));

    // Keyboard
    registry.register(keyboard::TypeTextTool::new(Arc::clone(&actuator)));
    for chord in keyboard::KeyChordTool::all(&actuator) {
        registry.register(chord);
    }

    // OS
    registry.register(os::OsActionTool::open_app(Arc::clone(&actuator)));
    registry.register(os::OsActionTool::open_url(Arc::clone(&actuator)));
    registry.register(os::OsActionTool::open_file(Arc::clone(&actuator)));
    registry.register(os::OsActionTool::quit_app(Arc::clone(&actuator)));
    registry.register(os::ListAppsTool::new(Arc::clone(&actuator)));
    registry.register(os::ShowNotificationTool::new(Arc::clone(&actuator)));
    registry.register(os::ExecuteShellTool {
        timeout_secs: shell_timeout_secs,
    });
    registry.register(os::ExecuteAppleScriptTool {
        timeout_secs: shell_timeout_secs,
    });

    // Perception + utility + terminator
    registry.register(util::CaptureScreenTool);
    registry.register(util::WaitTool);
    registry.register(util::GetMouseInfoTool::new(Arc::clone(&actuator)));
    registry.register(util::VerifyCoordinateTool);
    registry.register(util::CompleteTool);

    registry.with_wait_overrides(wait_overrides)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
