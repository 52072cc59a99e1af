// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! Coordinate-addressed mouse tools.
//!
//! All coordinates are normalized integers in [0, 1000]×[0, 1000]; the
//! actuator maps them to the screen's logical coordinate space.  Validation
//! happens here — a malformed or out-of-range coordinate never reaches the
//! actuator.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actuator::{InputActuator, MouseButton};
use crate::tool::{arg_coordinate, Tool, ToolCall, ToolOutput};

fn coordinate_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "coordinate": {
                "type": "array",
                "items": { "type": "integer", "minimum": 0, "maximum": 1000 },
                "minItems": 2,
                "maxItems": 2,
                "description": description,
            }
        },
        "required": ["coordinate"],
        "additionalProperties": false
    })
}

// ─── move_mouse ───────────────────────────────────────────────────────────────

pub struct MoveMouseTool {
    actuator: Arc<dyn InputActuator>,
}

impl MoveMouseTool {
    pub fn new(actuator: Arc<dyn InputActuator>) -> Self {
        Self { actuator }
    }
}

#[async_trait]
impl Tool for MoveMouseTool {
    fn name(&self) -> &str {
        "move_mouse"
    }
    fn description(&self) -> &str {
        "Move the mouse pointer to a normalized [x, y] coordinate without clicking. \
         Both axes run 0..1000 across the full screen."
    }
    fn parameters_schema(&self) -> Value {
        coordinate_schema("Target position as normalized [x, y], each 0..1000")
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (x, y) = match arg_coordinate(call, "coordinate") {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        match self.actuator.move_mouse(x, y).await {
            Ok(msg) => ToolOutput::ok(&call.id, msg),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── click family ─────────────────────────────────────────────────────────────

/// One struct covers single/double/right click; the variant fixes the name,
/// wait, and actuator arguments.
pub struct ClickTool {
    actuator: Arc<dyn InputActuator>,
    button: MouseButton,
    double: bool,
}

impl ClickTool {
    pub fn single(actuator: Arc<dyn InputActuator>) -> Self {
        Self {
            actuator,
            button: MouseButton::Left,
            double: false,
        }
    }
    pub fn double(actuator: Arc<dyn InputActuator>) -> Self {
        Self {
            actuator,
            button: MouseButton::Left,
            double: true,
        }
    }
    pub fn right(actuator: Arc<dyn InputActuator>) -> Self {
        Self {
            actuator,
            button: MouseButton::Right,
            double: false,
        }
    }
}

#[async_trait]
impl Tool for ClickTool {
    fn name(&self) -> &str {
        match (self.button, self.double) {
            (MouseButton::Left, false) => "click",
            (MouseButton::Left, true) => "double_click",
            (MouseButton::Right, _) => "right_click",
        }
    }
    fn description(&self) -> &str {
        match (self.button, self.double) {
            (MouseButton::Left, false) => {
                "Left-click at a normalized [x, y] coordinate (0..1000 on both axes)."
            }
            (MouseButton::Left, true) => {
                "Double-click at a normalized [x, y] coordinate (0..1000 on both axes)."
            }
            (MouseButton::Right, _) => {
                "Right-click at a normalized [x, y] coordinate (0..1000 on both axes)."
            }
        }
    }
    fn parameters_schema(&self) -> Value {
        coordinate_schema("Click position as normalized [x, y], each 0..1000")
    }
    fn visual_impact(&self) -> bool {
        true
    }
    fn post_action_wait_ms(&self) -> u64 {
        800
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (x, y) = match arg_coordinate(call, "coordinate") {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        match self.actuator.click(x, y, self.button, self.double).await {
            Ok(msg) => ToolOutput::ok(&call.id, msg),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── drag ─────────────────────────────────────────────────────────────────────

pub struct DragTool {
    actuator: Arc<dyn InputActuator>,
}

impl DragTool {
    pub fn new(actuator: Arc<dyn InputActuator>) -> Self {
        Self { actuator }
    }
}

#[async_trait]
impl Tool for DragTool {
    fn name(&self) -> &str {
        "drag"
    }
    fn description(&self) -> &str {
        "Press at 'from', drag to 'to', and release. Coordinates are normalized \
         [x, y] pairs, each axis 0..1000."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from": {
                    "type": "array",
                    "items": { "type": "integer", "minimum": 0, "maximum": 1000 },
                    "minItems": 2, "maxItems": 2,
                    "description": "Drag start as normalized [x, y]"
                },
                "to": {
                    "type": "array",
                    "items": { "type": "integer", "minimum": 0, "maximum": 1000 },
                    "minItems": 2, "maxItems": 2,
                    "description": "Drag end as normalized [x, y]"
                }
            },
            "required": ["from", "to"],
            "additionalProperties": false
        })
    }
    fn visual_impact(&self) -> bool {
        true
    }
    fn post_action_wait_ms(&self) -> u64 {
        1000
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let from = match arg_coordinate(call, "from") {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let to = match arg_coordinate(call, "to") {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        match self.actuator.drag(from, to).await {
            Ok(msg) => ToolOutput::ok(&call.id, msg),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── scroll ───────────────────────────────────────────────────────────────────

pub struct ScrollTool {
    actuator: Arc<dyn InputActuator>,
}

impl ScrollTool {
    pub fn new(actuator: Arc<dyn InputActuator>) -> Self {
        Self { actuator }
    }
}

#[async_trait]
impl Tool for ScrollTool {
    fn name(&self) -> &str {
        "scroll"
    }
    fn description(&self) -> &str {
        "Scroll at a normalized [x, y] coordinate. 'direction' is one of \
         up/down/left/right and 'amount' is the number of scroll steps (default 3)."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "coordinate": {
                    "type": "array",
                    "items": { "type": "integer", "minimum": 0, "maximum": 1000 },
                    "minItems": 2, "maxItems": 2,
                    "description": "Scroll position as normalized [x, y]"
                },
                "direction": {
                    "type": "string",
                    "enum": ["up", "down", "left", "right"]
                },
                "amount": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 50,
                    "description": "Scroll steps (default 3)"
                }
            },
            "required": ["coordinate", "direction"],
            "additionalProperties": false
        })
    }
    fn visual_impact(&self) -> bool {
        true
    }
    fn post_action_wait_ms(&self) -> u64 {
        600
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (x, y) = match arg_coordinate(call, "coordinate") {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let direction = call
            .args
            .get("direction")
            .and_then(|v| v.as_str())
            .unwrap_or("down");
        let amount = call
            .args
            .get("amount")
            .and_then(|v| v.as_i64())
            .unwrap_or(3)
            .clamp(1, 50);
        let (dx, dy) = match direction {
            "up" => (0, -amount),
            "down" => (0, amount),
            "left" => (-amount, 0),
            "right" => (amount, 0),
            other => {
                return ToolOutput::err(
                    &call.id,
                    format!("unknown scroll direction '{other}'; use up/down/left/right"),
                )
            }
        };
        match self.actuator.scroll(x, y, dx, dy).await {
            Ok(msg) => ToolOutput::ok(&call.id, msg),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::actuator::MockActuator;

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: name.into(),
            args,
        }
    }

    #[tokio::test]
    async fn click_dispatches_to_actuator() {
        let actuator = Arc::new(MockActuator::new());
        let tool = ClickTool::single(actuator.clone());
        let out = tool
            .execute(&call("click", json!({ "coordinate": [500, 400] })))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(actuator.recorded(), vec!["click(500,400,left,single)"]);
    }

    #[tokio::test]
    async fn click_out_of_range_never_reaches_actuator() {
        let actuator = Arc::new(MockActuator::new());
        let tool = ClickTool::single(actuator.clone());
        let out = tool
            .execute(&call("click", json!({ "coordinate": [5000, 400] })))
            .await;
        assert!(out.is_error);
        assert!(actuator.recorded().is_empty());
    }

    #[tokio::test]
    async fn click_variants_have_distinct_names_and_waits() {
        let actuator: Arc<dyn InputActuator> = Arc::new(MockActuator::new());
        assert_eq!(ClickTool::single(actuator.clone()).name(), "click");
        assert_eq!(ClickTool::double(actuator.clone()).name(), "double_click");
        assert_eq!(ClickTool::right(actuator.clone()).name(), "right_click");
        assert_eq!(ClickTool::single(actuator).post_action_wait_ms(), 800);
    }

    #[tokio::test]
    async fn drag_requires_both_endpoints() {
        let actuator = Arc::new(MockActuator::new());
        let tool = DragTool::new(actuator.clone());
        let out = tool
            .execute(&call("drag", json!({ "from": [1, 2] })))
            .await;
        assert!(out.is_error);
        let out = tool
            .execute(&call("drag", json!({ "from": [1, 2], "to": [30, 40] })))
            .await;
        assert!(!out.is_error);
        assert_eq!(actuator.recorded(), vec!["drag(1,2)->(30,40)"]);
    }

    #[tokio::test]
    async fn scroll_maps_direction_to_deltas() {
        let actuator = Arc::new(MockActuator::new());
        let tool = ScrollTool::new(actuator.clone());
        let out = tool
            .execute(&call(
                "scroll",
                json!({ "coordinate": [100, 100], "direction": "up", "amount": 5 }),
            ))
            .await;
        assert!(!out.is_error);
        assert_eq!(actuator.recorded(), vec!["scroll(100,100,0,-5)"]);
    }

    #[tokio::test]
    async fn scroll_rejects_unknown_direction() {
        let tool = ScrollTool::new(Arc::new(MockActuator::new()));
        let out = tool
            .execute(&call(
                "scroll",
                json!({ "coordinate": [100, 100], "direction": "sideways" }),
            ))
            .await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn actuator_failure_becomes_failure_string() {
        let actuator = Arc::new(MockActuator::failing_on("move_mouse"));
        let tool = MoveMouseTool::new(actuator);
        let out = tool
            .execute(&call("move_mouse", json!({ "coordinate": [1, 1] })))
            .await;
        assert!(out.is_error);
        assert!(out.content.starts_with(crate::tool::FAILURE_MARKER));
    }

    #[test]
    fn mouse_tools_are_visual_impact_except_move() {
        let a: Arc<dyn InputActuator> = Arc::new(MockActuator::new());
        assert!(!MoveMouseTool::new(a.clone()).visual_impact());
        assert!(ClickTool::single(a.clone()).visual_impact());
        assert!(DragTool::new(a.clone()).visual_impact());
        assert!(ScrollTool::new(a).visual_impact());
    }
}
