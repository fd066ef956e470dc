//! Ordering rules for the Kanban board.
//!
//! Positions only order cards inside one stage. A card moved to another stage
//! lands at the end of it; an explicit reorder rewrites the stage as `0..n`.

use std::collections::HashSet;
use uuid::Uuid;

use super::types::{KanbanBoard, Ticket};
use crate::core::shared::enums::TicketStage;

/// Position for a card appended to a stage whose highest position is `max`.
pub fn next_position(max: Option<i32>) -> i32 {
    max.map_or(0, |m| m.saturating_add(1))
}

/// Rejects empty or duplicated id lists.
pub fn validate_reorder(ids: &[Uuid]) -> Result<(), String> {
    if ids.is_empty() {
        return Err("ticket_ids cannot be empty".into());
    }
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id) {
            return Err(format!("ticket {id} appears more than once"));
        }
    }
    Ok(())
}

/// A reorder must name every card of the stage and nothing else.
///
/// `matched` is how many requested ids sit in the stage, `stage_total` how many
/// cards the stage holds.
pub fn check_reorder_coverage(
    requested: usize,
    matched: i64,
    stage_total: i64,
    stage: TicketStage,
) -> Result<(), String> {
    if matched != requested as i64 {
        return Err(format!("every ticket must exist and belong to stage {stage}"));
    }
    if stage_total != requested as i64 {
        return Err(format!(
            "reorder must list all {stage_total} tickets in stage {stage}, got {requested}"
        ));
    }
    Ok(())
}

/// `(id, position)` pairs in request order.
pub fn assign_positions(ids: &[Uuid]) -> Vec<(Uuid, i32)> {
    ids.iter()
        .enumerate()
        .map(|(index, id)| (*id, index as i32))
        .collect()
}

/// Splits tickets into columns, each ordered by position then creation time.
pub fn group_by_stage(tickets: Vec<Ticket>) -> KanbanBoard {
    let mut board = KanbanBoard::default();
    for ticket in tickets {
        let column = match ticket.stage {
            TicketStage::Backlog => &mut board.backlog,
            TicketStage::Dev => &mut board.dev,
            TicketStage::Homolog => &mut board.homolog,
            TicketStage::Prod => &mut board.prod,
        };
        column.push(ticket);
    }
    for column in [
        &mut board.backlog,
        &mut board.dev,
        &mut board.homolog,
        &mut board.prod,
    ] {
        column.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
    }
    board
}
