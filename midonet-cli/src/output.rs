//! Renders a [`SimulationResult`] for a human or for a downstream script
//! (§3). `SimulationResult` and its `DpAction`/`FlowRemovedCallback`
//! payloads deliberately don't derive `Serialize` (see DESIGN.md), so JSON
//! output is hand-assembled here rather than delegated to serde.

use comfy_table::{presets::UTF8_FULL, Table};
use midonet_core::result::SimulationResult;

use crate::cli::OutputFormat;

pub fn render(result: &SimulationResult, format: OutputFormat) {
    match format {
        OutputFormat::Table => render_table(result),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&to_json(result)).unwrap()),
    }
}

fn render_table(result: &SimulationResult) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["field", "value"]);

    match result {
        SimulationResult::NoOp => {
            table.add_row(vec!["outcome", "no-op (drop, no flow installed)"]);
        }
        SimulationResult::SendPacket { actions } => {
            table.add_row(vec!["outcome", "send-packet (one-shot, no flow installed)"]);
            table.add_row(vec!["actions", &format_actions(actions)]);
        }
        SimulationResult::AddVirtualWildcardFlow { flow, callbacks, tags } => {
            table.add_row(vec!["outcome", "add-virtual-wildcard-flow"]);
            table.add_row(vec!["actions", &format_actions(&flow.actions)]);
            table.add_row(vec!["idle_expiration", &format!("{:?}", flow.idle_expiration)]);
            table.add_row(vec!["hard_expiration", &format!("{:?}", flow.hard_expiration)]);
            table.add_row(vec!["flow_removed_callbacks", &format!("{}", callbacks.len())]);
            table.add_row(vec!["tags", &format!("{}", tags.len())]);
        }
    }

    println!("{table}");
}

fn format_actions(actions: &[midonet_core::dp_action::DpAction]) -> String {
    if actions.is_empty() {
        return "(none)".to_string();
    }
    actions.iter().map(|a| format!("{a:?}")).collect::<Vec<_>>().join(", ")
}

fn to_json(result: &SimulationResult) -> serde_json::Value {
    match result {
        SimulationResult::NoOp => serde_json::json!({ "outcome": "no_op" }),
        SimulationResult::SendPacket { actions } => serde_json::json!({
            "outcome": "send_packet",
            "actions": actions.iter().map(|a| format!("{a:?}")).collect::<Vec<_>>(),
        }),
        SimulationResult::AddVirtualWildcardFlow { flow, callbacks, tags } => serde_json::json!({
            "outcome": "add_virtual_wildcard_flow",
            "actions": flow.actions.iter().map(|a| format!("{a:?}")).collect::<Vec<_>>(),
            "idle_expiration_millis": flow.idle_expiration.as_millis() as u64,
            "hard_expiration_millis": flow.hard_expiration.as_millis() as u64,
            "flow_removed_callbacks": callbacks.iter().map(|c| format!("{c:?}")).collect::<Vec<_>>(),
            "tags": tags.iter().map(|t| t.0.clone()).collect::<Vec<_>>(),
        }),
    }
}
